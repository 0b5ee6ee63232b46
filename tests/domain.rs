use assert_matches::assert_matches;
use std::str::FromStr;

use seismo_pipeline::domain::{Endpoint, FillPolicy, GatherSize, IdentifierTuple, WaveformFormat};
use seismo_pipeline::error::PipelineError;

#[test]
fn identifier_codes_are_validated() {
    assert!(IdentifierTuple::from_str("OX.NYM1.00.HHZ").is_ok());
    assert!(IdentifierTuple::from_str("AM.R1234.00.EHZ").is_ok());
    assert_matches!(
        IdentifierTuple::from_str("OX.NY M1.00.HHZ"),
        Err(PipelineError::InvalidIdentifier(_))
    );
    assert_matches!(
        IdentifierTuple::from_str("OX.NYM1.00.HHZ.extra"),
        Err(PipelineError::InvalidIdentifier(_))
    );
    assert_matches!(
        IdentifierTuple::new("", "NYM1", "00", "HHZ"),
        Err(PipelineError::MissingField(_))
    );
}

#[test]
fn endpoints_reject_urls() {
    assert!(Endpoint::from_str("sensor-7.local").is_ok());
    assert_matches!(
        Endpoint::from_str("http://10.0.0.1"),
        Err(PipelineError::InvalidEndpoint(_))
    );
    assert_matches!(Endpoint::from_str(" "), Err(PipelineError::InvalidEndpoint(_)));
    assert_matches!(Endpoint::from_str(":80"), Err(PipelineError::InvalidEndpoint(_)));
}

#[test]
fn enum_values_round_trip_through_serde() {
    let fill: FillPolicy = serde_json::from_str(r#""leave-gap""#).unwrap();
    assert_eq!(fill, FillPolicy::LeaveGap);
    assert!(!FillPolicy::NoneFill.fabricates_samples());
    assert!(FillPolicy::ZeroFill.fabricates_samples());

    let size: GatherSize = serde_json::from_str(r#""minute""#).unwrap();
    assert_eq!(size.to_string(), "minute");

    let format: WaveformFormat = serde_json::from_str(r#""slist""#).unwrap();
    assert_eq!(format.extension(), "slist");
}
