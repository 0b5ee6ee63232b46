use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::chunk::{ChunkDuration, chunks};
use crate::codec::WaveformCodec;
use crate::config::PipelineConfig;
use crate::domain::{FillPolicy, GatherSize, IdentifierTuple};
use crate::error::PipelineError;
use crate::store::Store;
use crate::waveform::{Stream, detect_gaps, merge, trim};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GatherOutcome {
    NoData,
    Written {
        path: Utf8PathBuf,
        sources: usize,
        gaps: usize,
        traces: usize,
        samples: usize,
    },
}

/// Consolidates the chunk files of one identifier and bucket into a single file.
pub struct Gatherer {
    store: Store,
    chunk_size: ChunkDuration,
    reader: Box<dyn WaveformCodec>,
    writer: Box<dyn WaveformCodec>,
}

impl Gatherer {
    pub fn new(
        store: Store,
        chunk_size: ChunkDuration,
        reader: Box<dyn WaveformCodec>,
        writer: Box<dyn WaveformCodec>,
    ) -> Self {
        Self {
            store,
            chunk_size,
            reader,
            writer,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            Store::new(config.data_dir.clone()),
            config.chunk_size,
            config.chunk_format.codec(),
            config.output_format.codec(),
        )
    }

    /// Chunk files whose start falls inside the bucket and that exist on disk,
    /// keyed by chunk start.
    fn sources(
        &self,
        id: &IdentifierTuple,
        bucket_start: DateTime<Utc>,
        bucket_end: DateTime<Utc>,
    ) -> Vec<(DateTime<Utc>, Utf8PathBuf)> {
        chunks(bucket_start, bucket_end, self.chunk_size)
            .map(|start| (start, self.store.waveform_path(id, start, self.reader.extension())))
            .filter(|(_, path)| self.store.exists(path))
            .collect()
    }

    /// Sources are deleted only after the consolidated file is in place, and
    /// only when the chunk lies wholly inside the bucket. A chunk longer than
    /// the bucket is refused before any file is touched.
    pub fn gather(
        &self,
        id: &IdentifierTuple,
        instant: DateTime<Utc>,
        size: GatherSize,
        fill: FillPolicy,
    ) -> Result<GatherOutcome, PipelineError> {
        let bucket_start = size.align(instant);
        let bucket_end = bucket_start + size.duration();
        let failure = |message: String| PipelineError::Gather {
            bucket: format!("{id} {size} {}", bucket_start.to_rfc3339()),
            message,
        };
        if self.chunk_size.as_delta() > size.duration() {
            return Err(failure(format!(
                "chunk of {}s does not fit in a {size} bucket",
                self.chunk_size.as_delta().num_seconds()
            )));
        }

        let sources = self.sources(id, bucket_start, bucket_end);
        if sources.is_empty() {
            info!(%id, bucket = %bucket_start, "no chunk files for bucket");
            return Ok(GatherOutcome::NoData);
        }

        let mut stream = Stream::new();
        for (_, path) in &sources {
            let bytes = Store::read_bytes(path).map_err(|err| failure(err.to_string()))?;
            let decoded = self
                .reader
                .decode(&bytes)
                .map_err(|err| failure(format!("{path}: {err}")))?;
            stream.extend(decoded);
        }

        let stream = trim(stream, bucket_start, bucket_end);
        if stream.is_empty() {
            warn!(%id, bucket = %bucket_start, "chunks hold no samples inside the bucket");
            return Ok(GatherOutcome::NoData);
        }

        let gaps = detect_gaps(&stream, 1);
        if !gaps.is_empty() {
            let log_path = self.store.gap_log_path(id, bucket_start);
            let lines = gaps.iter().map(|gap| gap.log_line()).collect::<Vec<_>>();
            Store::write_bytes_atomic(&log_path, format!("{}\n", lines.join("\n")).as_bytes())
                .map_err(|err| failure(err.to_string()))?;
            warn!(%id, gaps = gaps.len(), log = %log_path, "gaps found while gathering");
        }

        let merged = merge(stream, fill);
        let bytes = self
            .writer
            .encode(&merged)
            .map_err(|err| failure(err.to_string()))?;
        let output = self
            .store
            .waveform_path(id, bucket_start, self.writer.extension());
        Store::write_bytes_atomic(&output, &bytes).map_err(|err| failure(err.to_string()))?;

        for (chunk_start, path) in sources.iter().filter(|(_, path)| *path != output) {
            if *chunk_start + self.chunk_size.as_delta() > bucket_end {
                debug!(%path, "chunk extends past the bucket, kept");
                continue;
            }
            Store::remove_file(path)?;
        }
        info!(%id, path = %output, sources = sources.len(), "bucket consolidated");

        Ok(GatherOutcome::Written {
            path: output,
            sources: sources.len(),
            gaps: gaps.len(),
            traces: merged.len(),
            samples: merged.sample_count(),
        })
    }
}
