use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::IdentifierTuple;
use crate::error::PipelineError;

/// One identifier over one time window. `start < end` holds for every value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRequestSpec", into = "RawRequestSpec")]
pub struct RequestSpec {
    id: IdentifierTuple,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl RequestSpec {
    pub fn new(
        id: IdentifierTuple,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Self, PipelineError> {
        if start >= end {
            return Err(PipelineError::InvalidTimeOrder {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(Self { id, start, end })
    }

    pub fn id(&self) -> &IdentifierTuple {
        &self.id
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }
}

/// Flat on-disk shape shared by bulk request files and persisted gap records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRequestSpec {
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TryFrom<RawRequestSpec> for RequestSpec {
    type Error = PipelineError;

    fn try_from(raw: RawRequestSpec) -> Result<Self, Self::Error> {
        let id = IdentifierTuple::new(&raw.network, &raw.station, &raw.location, &raw.channel)?;
        RequestSpec::new(id, raw.start, raw.end)
    }
}

impl From<RequestSpec> for RawRequestSpec {
    fn from(request: RequestSpec) -> Self {
        Self {
            network: request.id.network,
            station: request.id.station,
            location: request.id.location,
            channel: request.id.channel,
            start: request.start,
            end: request.end,
        }
    }
}

/// A list of codes accepted either as a single value or as a list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Codes(Vec<String>);

impl Codes {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Codes {
    fn from(value: &str) -> Self {
        Self(vec![value.to_string()])
    }
}

impl From<String> for Codes {
    fn from(value: String) -> Self {
        Self(vec![value])
    }
}

impl From<Vec<String>> for Codes {
    fn from(values: Vec<String>) -> Self {
        Self(values)
    }
}

impl From<Vec<&str>> for Codes {
    fn from(values: Vec<&str>) -> Self {
        Self(values.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for Codes {
    fn from(values: &[&str]) -> Self {
        Self(values.iter().map(|value| value.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Codes {
    fn from(values: [&str; N]) -> Self {
        Self(values.iter().map(|value| value.to_string()).collect())
    }
}

/// The four code lists a cross product is built from.
#[derive(Debug, Clone, Default)]
pub struct CodeSet {
    pub networks: Codes,
    pub stations: Codes,
    pub locations: Codes,
    pub channels: Codes,
}

impl CodeSet {
    pub fn new(
        networks: impl Into<Codes>,
        stations: impl Into<Codes>,
        locations: impl Into<Codes>,
        channels: impl Into<Codes>,
    ) -> Self {
        Self {
            networks: networks.into(),
            stations: stations.into(),
            locations: locations.into(),
            channels: channels.into(),
        }
    }

    fn identifiers(&self) -> Result<Vec<IdentifierTuple>, PipelineError> {
        let missing = [
            ("network(s)", &self.networks),
            ("station(s)", &self.stations),
            ("location(s)", &self.locations),
            ("channel(s)", &self.channels),
        ]
        .into_iter()
        .filter(|(_, codes)| codes.is_empty())
        .map(|(name, _)| name)
        .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(PipelineError::MissingField(missing.join(", ")));
        }

        let mut ids = Vec::new();
        for network in self.networks.as_slice() {
            for station in self.stations.as_slice() {
                for location in self.locations.as_slice() {
                    for channel in self.channels.as_slice() {
                        ids.push(IdentifierTuple::new(network, station, location, channel)?);
                    }
                }
            }
        }
        Ok(ids)
    }
}

/// Ordered, non-empty, immutable list of requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPlan {
    requests: Vec<RequestSpec>,
}

impl RequestPlan {
    pub fn from_cross_product(
        codes: &CodeSet,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Self, PipelineError> {
        Self::from_time_windows(codes, &[(start, end)])
    }

    /// Windows vary fastest: networks, stations, locations, channels, then windows.
    pub fn from_time_windows(
        codes: &CodeSet,
        windows: &[(DateTime<Utc>, DateTime<Utc>)],
    ) -> Result<Self, PipelineError> {
        if windows.is_empty() {
            return Err(PipelineError::MissingField("time_windows".to_string()));
        }
        let mut requests = Vec::new();
        for id in codes.identifiers()? {
            for (start, end) in windows {
                requests.push(RequestSpec::new(id.clone(), *start, *end)?);
            }
        }
        Self::from_records(requests)
    }

    pub fn from_records(records: Vec<RequestSpec>) -> Result<Self, PipelineError> {
        if records.is_empty() {
            return Err(PipelineError::EmptyPlan);
        }
        Ok(Self { requests: records })
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RequestSpec> {
        self.requests.iter()
    }

    pub fn get(&self, index: usize) -> Option<&RequestSpec> {
        self.requests.get(index)
    }

    /// Distinct identifiers in first-seen order.
    pub fn identifiers(&self) -> Vec<IdentifierTuple> {
        let mut ids: Vec<IdentifierTuple> = Vec::new();
        for request in &self.requests {
            if !ids.contains(&request.id) {
                ids.push(request.id.clone());
            }
        }
        ids
    }

    /// Earliest start and latest end across all requests.
    pub fn span(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.requests.iter().map(|r| r.start).min();
        let end = self.requests.iter().map(|r| r.end).max();
        match (start, end) {
            (Some(start), Some(end)) => (start, end),
            _ => unreachable!("request plans are never empty"),
        }
    }
}

impl<'a> IntoIterator for &'a RequestPlan {
    type Item = &'a RequestSpec;
    type IntoIter = std::slice::Iter<'a, RequestSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.requests.iter()
    }
}
