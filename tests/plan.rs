use assert_matches::assert_matches;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};

use seismo_pipeline::error::PipelineError;
use seismo_pipeline::plan::{CodeSet, RequestPlan, RequestSpec};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

#[test]
fn cross_product_order() {
    let codes = CodeSet::new(["N1", "N2"], ["S1", "S2"], ["00", "10"], ["HHZ", "HHN"]);
    let plan = RequestPlan::from_cross_product(&codes, t0(), t0() + TimeDelta::days(1)).unwrap();

    assert_eq!(plan.len(), 16);
    let ids = plan
        .iter()
        .map(|request| request.id().to_string())
        .collect::<Vec<_>>();
    assert_eq!(ids[0], "N1.S1.00.HHZ");
    assert_eq!(ids[1], "N1.S1.00.HHN");
    assert_eq!(ids[2], "N1.S1.10.HHZ");
    assert_eq!(ids[4], "N1.S2.00.HHZ");
    assert_eq!(ids[8], "N2.S1.00.HHZ");
    assert_eq!(ids[15], "N2.S2.10.HHN");
    assert!(plan.iter().all(|request| request.start() < request.end()));
}

#[test]
fn time_windows_vary_fastest() {
    let codes = CodeSet::new("XX", ["STA1", "STA2"], "00", "BHZ");
    let windows = [
        (t0(), t0() + TimeDelta::hours(1)),
        (t0() + TimeDelta::days(1), t0() + TimeDelta::days(2)),
    ];
    let plan = RequestPlan::from_time_windows(&codes, &windows).unwrap();

    assert_eq!(plan.len(), 4);
    let first = plan.get(0).unwrap();
    let second = plan.get(1).unwrap();
    assert_eq!(first.id(), second.id());
    assert_eq!(second.start(), t0() + TimeDelta::days(1));
    assert_eq!(plan.get(2).unwrap().id().station, "STA2");
    assert_eq!(plan.span(), (t0(), t0() + TimeDelta::days(2)));
    assert_eq!(plan.identifiers().len(), 2);
}

#[test]
fn empty_codes_are_reported() {
    let codes = CodeSet::new("XX", "STA1", Vec::<String>::new(), "BHZ");
    let err = RequestPlan::from_cross_product(&codes, t0(), t0() + TimeDelta::hours(1)).unwrap_err();
    assert_matches!(err, PipelineError::MissingField(field) if field == "location(s)");
}

#[test]
fn empty_records_rejected() {
    assert_matches!(RequestPlan::from_records(Vec::new()), Err(PipelineError::EmptyPlan));
}

#[test]
fn start_must_precede_end() {
    let id = "XX.STA1.00.BHZ".parse().unwrap();
    assert_matches!(
        RequestSpec::new(id, t0(), t0()),
        Err(PipelineError::InvalidTimeOrder { .. })
    );

    let codes = CodeSet::new("XX", "STA1", "00", "BHZ");
    let err = RequestPlan::from_cross_product(&codes, t0() + TimeDelta::hours(1), t0()).unwrap_err();
    assert_matches!(err, PipelineError::InvalidTimeOrder { .. });
}

#[test]
fn records_parse_from_flat_json() {
    let json = r#"[
        {"network": "XX", "station": "STA1", "location": "", "channel": "BHZ",
         "start": "2024-01-01T00:00:00Z", "end": "2024-01-01T02:00:00Z"}
    ]"#;
    let records: Vec<RequestSpec> = serde_json::from_str(json).unwrap();
    let plan = RequestPlan::from_records(records).unwrap();
    assert_eq!(plan.get(0).unwrap().id().to_string(), "XX.STA1..BHZ");

    let reversed = json.replace("02:00:00Z", "00:00:00Z");
    assert!(serde_json::from_str::<Vec<RequestSpec>>(&reversed).is_err());
}
