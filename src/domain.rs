use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, TimeDelta, Timelike, Utc};
use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

static CODE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_\-]*$").unwrap());

/// Network, station, location and channel codes naming one data stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentifierTuple {
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,
}

impl IdentifierTuple {
    pub fn new(
        network: &str,
        station: &str,
        location: &str,
        channel: &str,
    ) -> Result<Self, PipelineError> {
        for (field, value) in [
            ("network", network),
            ("station", station),
            ("channel", channel),
        ] {
            if value.trim().is_empty() {
                return Err(PipelineError::MissingField(field.to_string()));
            }
        }
        for value in [network, station, location, channel] {
            if !CODE_RE.is_match(value) {
                return Err(PipelineError::InvalidIdentifier(value.to_string()));
            }
        }
        Ok(Self {
            network: network.to_string(),
            station: station.to_string(),
            location: location.to_string(),
            channel: channel.to_string(),
        })
    }
}

impl fmt::Display for IdentifierTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.network, self.station, self.location, self.channel
        )
    }
}

impl FromStr for IdentifierTuple {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parts = value.trim().split('.').collect::<Vec<_>>();
        match parts.as_slice() {
            [network, station, location, channel] => {
                Self::new(network, station, location, channel)
            }
            _ => Err(PipelineError::InvalidIdentifier(value.to_string())),
        }
    }
}

/// Address of a sensor's HTTP interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: Option<u16>,
}

impl Endpoint {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}:{port}", self.host),
            None => write!(f, "{}", self.host),
        }
    }
}

impl FromStr for Endpoint {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.contains('/') {
            return Err(PipelineError::InvalidEndpoint(value.to_string()));
        }
        match trimmed.split_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| PipelineError::InvalidEndpoint(value.to_string()))?;
                if host.is_empty() {
                    return Err(PipelineError::InvalidEndpoint(value.to_string()));
                }
                Ok(Self {
                    host: host.to_string(),
                    port: Some(port),
                })
            }
            None => Ok(Self {
                host: trimmed.to_string(),
                port: None,
            }),
        }
    }
}

/// On-disk waveform encodings with a built-in codec. Chunk payloads must
/// already arrive in one of these; a binary miniSEED body is rejected as
/// undecodable at gather time and its chunks are left in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WaveformFormat {
    #[default]
    Json,
    Slist,
}

impl WaveformFormat {
    pub fn extension(self) -> &'static str {
        match self {
            WaveformFormat::Json => "json",
            WaveformFormat::Slist => "slist",
        }
    }
}

impl fmt::Display for WaveformFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// How discontinuities are handled when traces are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FillPolicy {
    #[default]
    #[value(name = "zero")]
    ZeroFill,
    LeaveGap,
    #[value(name = "none")]
    NoneFill,
}

impl FillPolicy {
    pub fn fabricates_samples(self) -> bool {
        matches!(self, FillPolicy::ZeroFill)
    }
}

/// Granularity of consolidated files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GatherSize {
    #[default]
    Day,
    Hour,
    Minute,
}

impl GatherSize {
    pub fn duration(self) -> TimeDelta {
        match self {
            GatherSize::Day => TimeDelta::days(1),
            GatherSize::Hour => TimeDelta::hours(1),
            GatherSize::Minute => TimeDelta::minutes(1),
        }
    }

    /// Truncates an instant down to the start of its bucket.
    pub fn align(self, instant: DateTime<Utc>) -> DateTime<Utc> {
        let truncated = instant.with_nanosecond(0).unwrap_or(instant);
        let truncated = truncated.with_second(0).unwrap_or(truncated);
        match self {
            GatherSize::Minute => truncated,
            GatherSize::Hour => truncated.with_minute(0).unwrap_or(truncated),
            GatherSize::Day => {
                let hour = truncated.with_minute(0).unwrap_or(truncated);
                hour.with_hour(0).unwrap_or(hour)
            }
        }
    }
}

impl fmt::Display for GatherSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatherSize::Day => write!(f, "day"),
            GatherSize::Hour => write!(f, "hour"),
            GatherSize::Minute => write!(f, "minute"),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn parse_identifier_valid() {
        let id: IdentifierTuple = "OX.NYM1.00.HHZ".parse().unwrap();
        assert_eq!(id.station, "NYM1");
        assert_eq!(id.to_string(), "OX.NYM1.00.HHZ");
    }

    #[test]
    fn parse_identifier_allows_empty_location() {
        let id: IdentifierTuple = "XX.STA1..BHZ".parse().unwrap();
        assert_eq!(id.location, "");
    }

    #[test]
    fn parse_identifier_invalid() {
        let err = "XX.STA1.BHZ".parse::<IdentifierTuple>().unwrap_err();
        assert_matches!(err, PipelineError::InvalidIdentifier(_));

        let err = IdentifierTuple::new("XX", "", "00", "BHZ").unwrap_err();
        assert_matches!(err, PipelineError::MissingField(field) if field == "station");
    }

    #[test]
    fn parse_endpoint_with_port() {
        let endpoint: Endpoint = "172.24.59.19:8080".parse().unwrap();
        assert_eq!(endpoint.host(), "172.24.59.19");
        assert_eq!(endpoint.port(), Some(8080));
        assert_eq!(endpoint.to_string(), "172.24.59.19:8080");

        let err = "172.24.59.19:http".parse::<Endpoint>().unwrap_err();
        assert_matches!(err, PipelineError::InvalidEndpoint(_));
    }

    #[test]
    fn gather_size_aligns_down() {
        let instant = Utc.with_ymd_and_hms(2024, 7, 3, 13, 47, 12).unwrap();
        assert_eq!(
            GatherSize::Day.align(instant),
            Utc.with_ymd_and_hms(2024, 7, 3, 0, 0, 0).unwrap()
        );
        assert_eq!(
            GatherSize::Hour.align(instant),
            Utc.with_ymd_and_hms(2024, 7, 3, 13, 0, 0).unwrap()
        );
        assert_eq!(
            GatherSize::Minute.align(instant),
            Utc.with_ymd_and_hms(2024, 7, 3, 13, 47, 0).unwrap()
        );
    }
}
