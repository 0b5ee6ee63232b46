use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Datelike, Utc};
use tempfile::Builder;

use crate::domain::IdentifierTuple;
use crate::error::PipelineError;

/// Date-partitioned data tree: `{root}/{year}/{month}/{day}/{id}.{timestamp}.{ext}`.
#[derive(Debug, Clone)]
pub struct Store {
    data_root: Utf8PathBuf,
}

impl Store {
    pub fn new(data_root: Utf8PathBuf) -> Self {
        Self { data_root }
    }

    pub fn data_root(&self) -> &Utf8Path {
        &self.data_root
    }

    pub fn day_dir(&self, instant: DateTime<Utc>) -> Utf8PathBuf {
        self.data_root
            .join(instant.year().to_string())
            .join(format!("{:02}", instant.month()))
            .join(format!("{:02}", instant.day()))
    }

    /// Path of the file whose data starts at `start`. Chunk files and
    /// consolidated files share this convention.
    pub fn waveform_path(&self, id: &IdentifierTuple, start: DateTime<Utc>, ext: &str) -> Utf8PathBuf {
        self.day_dir(start)
            .join(format!("{id}.{}.{ext}", file_timestamp(start)))
    }

    pub fn gap_log_path(&self, id: &IdentifierTuple, bucket_start: DateTime<Utc>) -> Utf8PathBuf {
        self.day_dir(bucket_start)
            .join(format!("gaps_in_{id}.{}_data.log", file_timestamp(bucket_start)))
    }

    pub fn exists(&self, path: &Utf8Path) -> bool {
        path.as_std_path().is_file()
    }

    pub fn ensure_data_root(&self) -> Result<(), PipelineError> {
        if self.data_root.as_std_path().is_dir() {
            return Ok(());
        }
        Err(PipelineError::MissingDataDir(self.data_root.to_string()))
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), PipelineError> {
        let parent = path
            .parent()
            .ok_or_else(|| PipelineError::Filesystem(format!("no parent directory for {path}")))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| PipelineError::Filesystem(format!("create {parent}: {err}")))?;
        let mut temp = Builder::new()
            .prefix(".seismo-pipeline")
            .suffix(".part")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        std::io::Write::write_all(&mut temp, content)
            .map_err(|err| PipelineError::Filesystem(format!("write {path}: {err}")))?;
        temp.persist(path.as_std_path())
            .map_err(|err| PipelineError::Filesystem(format!("persist {path}: {}", err.error)))?;
        Ok(())
    }

    pub fn read_bytes(path: &Utf8Path) -> Result<Vec<u8>, PipelineError> {
        fs::read(path.as_std_path())
            .map_err(|err| PipelineError::Filesystem(format!("read {path}: {err}")))
    }

    pub fn remove_file(path: &Utf8Path) -> Result<(), PipelineError> {
        match fs::remove_file(path.as_std_path()) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(PipelineError::Filesystem(format!("remove {path}: {err}"))),
        }
    }
}

/// Fixed-width `YYYYMMDDThhmmss` stamp used in every file name.
pub fn file_timestamp(instant: DateTime<Utc>) -> String {
    instant.format("%Y%m%dT%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn layout_paths() {
        let store = Store::new(Utf8PathBuf::from("/data/raw"));
        let id: IdentifierTuple = "OX.NYM1.00.HHZ".parse().unwrap();
        let start = Utc.with_ymd_and_hms(2024, 7, 3, 5, 0, 0).unwrap();

        let path = store.waveform_path(&id, start, "json");
        assert_eq!(
            path.as_str(),
            "/data/raw/2024/07/03/OX.NYM1.00.HHZ.20240703T050000.json"
        );

        let gap_log = store.gap_log_path(&id, start);
        assert!(gap_log.ends_with("2024/07/03/gaps_in_OX.NYM1.00.HHZ.20240703T050000_data.log"));
    }

    #[test]
    fn atomic_write_creates_parents() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let path = root.join("2024/01/01/file.bin");

        Store::write_bytes_atomic(&path, b"payload").unwrap();
        assert_eq!(Store::read_bytes(&path).unwrap(), b"payload");

        Store::remove_file(&path).unwrap();
        Store::remove_file(&path).unwrap();
        assert!(!path.as_std_path().exists());
    }
}
