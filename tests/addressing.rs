use camino::Utf8PathBuf;
use chrono::{TimeDelta, TimeZone, Utc};

use seismo_pipeline::chunk::{ChunkDuration, plan_fetch_tasks};
use seismo_pipeline::config::{EndpointTable, PipelineConfig};
use seismo_pipeline::plan::{CodeSet, RequestPlan};

fn config() -> PipelineConfig {
    let endpoints = EndpointTable::from_pairs([("STA1", "10.0.0.5")]).unwrap();
    let mut config = PipelineConfig::new(Utf8PathBuf::from("/data"), endpoints);
    config.chunk_size = ChunkDuration::hours(1).unwrap();
    config.buffer = TimeDelta::seconds(150);
    config
}

#[test]
fn two_hour_request_yields_two_buffered_tasks() {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let codes = CodeSet::new("XX", "STA1", "00", "BHZ");
    let plan = RequestPlan::from_cross_product(&codes, start, start + TimeDelta::hours(2)).unwrap();

    let fetch_plan = plan_fetch_tasks(&plan, &config());
    assert!(fetch_plan.unresolved_stations.is_empty());
    assert_eq!(fetch_plan.tasks.len(), 2);

    // 2024-01-01T00:00:00Z is 1704067200
    assert_eq!(
        fetch_plan.tasks[0].url,
        "http://10.0.0.5/data?channel=XX.STA1.00.BHZ&from=1704067050&to=1704070950"
    );
    assert_eq!(
        fetch_plan.tasks[1].url,
        "http://10.0.0.5/data?channel=XX.STA1.00.BHZ&from=1704070650&to=1704074550"
    );
    assert_eq!(
        fetch_plan.tasks[0].destination.as_str(),
        "/data/2024/01/01/XX.STA1.00.BHZ.20240101T000000.json"
    );
    assert_eq!(
        fetch_plan.tasks[1].destination.as_str(),
        "/data/2024/01/01/XX.STA1.00.BHZ.20240101T010000.json"
    );
}

#[test]
fn unknown_station_is_skipped_and_reported() {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let codes = CodeSet::new("XX", ["STA1", "STA9"], "00", ["BHZ", "BHN"]);
    let plan = RequestPlan::from_cross_product(&codes, start, start + TimeDelta::hours(1)).unwrap();

    let fetch_plan = plan_fetch_tasks(&plan, &config());
    assert_eq!(fetch_plan.tasks.len(), 2);
    assert_eq!(fetch_plan.unresolved_stations, vec!["STA9".to_string()]);
}

#[test]
fn partial_last_chunk_is_included() {
    let start = Utc.with_ymd_and_hms(2024, 3, 31, 23, 30, 0).unwrap();
    let codes = CodeSet::new("XX", "STA1", "00", "BHZ");
    let plan =
        RequestPlan::from_cross_product(&codes, start, start + TimeDelta::minutes(90)).unwrap();

    let fetch_plan = plan_fetch_tasks(&plan, &config());
    assert_eq!(fetch_plan.tasks.len(), 2);
    assert!(
        fetch_plan.tasks[1]
            .destination
            .as_str()
            .starts_with("/data/2024/04/01/")
    );
}
