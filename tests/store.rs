use camino::Utf8PathBuf;
use chrono::{TimeZone, Utc};

use seismo_pipeline::domain::IdentifierTuple;
use seismo_pipeline::store::{Store, file_timestamp};

#[test]
fn layout_paths() {
    let store = Store::new(Utf8PathBuf::from("/srv/raw"));
    let id: IdentifierTuple = "OX.NYM1..HHZ".parse().unwrap();
    let start = Utc.with_ymd_and_hms(2023, 12, 31, 23, 0, 0).unwrap();

    assert_eq!(store.day_dir(start).as_str(), "/srv/raw/2023/12/31");
    assert!(
        store
            .waveform_path(&id, start, "slist")
            .ends_with("2023/12/31/OX.NYM1..HHZ.20231231T230000.slist")
    );
    assert!(
        store
            .gap_log_path(&id, start)
            .as_str()
            .contains("gaps_in_OX.NYM1..HHZ.")
    );
    assert_eq!(file_timestamp(start), "20231231T230000");
}

#[test]
fn data_root_must_exist() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    assert!(Store::new(root.clone()).ensure_data_root().is_ok());
    assert!(Store::new(root.join("missing")).ensure_data_root().is_err());
}
