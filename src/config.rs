use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::chunk::ChunkDuration;
use crate::domain::{Endpoint, WaveformFormat};
use crate::error::PipelineError;
use crate::gaps::load_request_records;
use crate::plan::{CodeSet, Codes, RequestPlan};

pub const MAX_REQUESTS_PER_ENDPOINT: usize = 3;
pub const DEFAULT_CONFIG_FILE: &str = "seismo-pipeline.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,
    #[serde(default)]
    pub endpoints_file: Option<String>,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub request: Option<RequestSection>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PipelineSection {
    #[serde(default)]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub chunk_hours: Option<i64>,
    #[serde(default)]
    pub buffer_seconds: Option<i64>,
    #[serde(default)]
    pub max_requests_per_endpoint: Option<usize>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub chunk_format: Option<WaveformFormat>,
    #[serde(default)]
    pub output_format: Option<WaveformFormat>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RequestSection {
    #[serde(default)]
    pub request_file: Option<String>,
    #[serde(default, alias = "network")]
    pub networks: Option<CodeEntry>,
    #[serde(default, alias = "station")]
    pub stations: Option<CodeEntry>,
    #[serde(default, alias = "location")]
    pub locations: Option<CodeEntry>,
    #[serde(default, alias = "channel")]
    pub channels: Option<CodeEntry>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub time_windows: Option<Vec<TimeWindowEntry>>,
    #[serde(default)]
    pub cron: bool,
    #[serde(default)]
    pub days_before: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CodeEntry {
    Shorthand(String),
    List(Vec<String>),
}

impl From<CodeEntry> for Codes {
    fn from(entry: CodeEntry) -> Self {
        match entry {
            CodeEntry::Shorthand(value) => Codes::from(value),
            CodeEntry::List(values) => Codes::from(values),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeWindowEntry {
    pub start: String,
    pub end: String,
}

/// Station code to sensor address. Read-only once a run starts.
#[derive(Debug, Clone, Default)]
pub struct EndpointTable {
    endpoints: BTreeMap<String, Endpoint>,
}

impl EndpointTable {
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, PipelineError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let endpoints = pairs
            .into_iter()
            .map(|(station, address)| {
                let endpoint = address.as_ref().parse::<Endpoint>()?;
                Ok((station.into(), endpoint))
            })
            .collect::<Result<BTreeMap<String, Endpoint>, PipelineError>>()?;
        Ok(Self { endpoints })
    }

    pub fn resolve(&self, station: &str) -> Result<&Endpoint, PipelineError> {
        self.endpoints
            .get(station)
            .ok_or_else(|| PipelineError::UnknownStation(station.to_string()))
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub data_dir: Utf8PathBuf,
    pub chunk_size: ChunkDuration,
    pub buffer: TimeDelta,
    pub max_requests_per_endpoint: usize,
    pub timeout: Duration,
    pub chunk_format: WaveformFormat,
    pub output_format: WaveformFormat,
    pub endpoints: EndpointTable,
}

impl PipelineConfig {
    pub fn new(data_dir: Utf8PathBuf, endpoints: EndpointTable) -> Self {
        Self {
            data_dir,
            chunk_size: ChunkDuration::default(),
            buffer: TimeDelta::seconds(150),
            max_requests_per_endpoint: MAX_REQUESTS_PER_ENDPOINT,
            timeout: Duration::from_secs(10),
            chunk_format: WaveformFormat::default(),
            output_format: WaveformFormat::default(),
            endpoints,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub pipeline: PipelineConfig,
    pub plan: Option<RequestPlan>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, PipelineError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(PipelineError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| PipelineError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| PipelineError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, PipelineError> {
        let endpoints = match &config.endpoints_file {
            Some(file) => {
                info!(file = %file, "loading station endpoints from file");
                let content = fs::read_to_string(file)
                    .map_err(|_| PipelineError::ConfigRead(PathBuf::from(file)))?;
                let map: BTreeMap<String, String> = serde_json::from_str(&content)
                    .map_err(|err| PipelineError::ConfigParse(err.to_string()))?;
                EndpointTable::from_pairs(map)?
            }
            None => EndpointTable::from_pairs(config.endpoints.clone())?,
        };

        let section = config.pipeline;
        let data_dir = Utf8PathBuf::from(section.data_dir.unwrap_or_else(|| ".".to_string()));
        let mut pipeline = PipelineConfig::new(data_dir, endpoints);
        if let Some(hours) = section.chunk_hours {
            pipeline.chunk_size = ChunkDuration::hours(hours)?;
        }
        if let Some(seconds) = section.buffer_seconds {
            pipeline.buffer = TimeDelta::try_seconds(seconds)
                .filter(|buffer| *buffer >= TimeDelta::zero())
                .ok_or_else(|| PipelineError::Validation(format!("buffer_seconds {seconds}")))?;
        }
        if let Some(max) = section.max_requests_per_endpoint {
            if max == 0 || max > MAX_REQUESTS_PER_ENDPOINT {
                return Err(PipelineError::InvalidConcurrency(max));
            }
            pipeline.max_requests_per_endpoint = max;
        }
        if let Some(seconds) = section.timeout_seconds {
            pipeline.timeout = Duration::from_secs(seconds);
        }
        if let Some(format) = section.chunk_format {
            pipeline.chunk_format = format;
        }
        if let Some(format) = section.output_format {
            pipeline.output_format = format;
        }

        let plan = config
            .request
            .map(|request| resolve_request(request, Utc::now()))
            .transpose()?;

        Ok(ResolvedConfig { pipeline, plan })
    }
}

pub fn resolve_request(
    request: RequestSection,
    now: DateTime<Utc>,
) -> Result<RequestPlan, PipelineError> {
    if let Some(file) = &request.request_file {
        info!(file = %file, "loading request records from file");
        let records = load_request_records(&Utf8PathBuf::from(file))?;
        return RequestPlan::from_records(records);
    }

    let missing = [
        ("networks", request.networks.is_none()),
        ("stations", request.stations.is_none()),
        ("locations", request.locations.is_none()),
        ("channels", request.channels.is_none()),
    ]
    .into_iter()
    .filter(|(_, absent)| *absent)
    .map(|(name, _)| name)
    .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(PipelineError::MissingField(missing.join(", ")));
    }

    let codes = CodeSet {
        networks: request.networks.map(Codes::from).unwrap_or_default(),
        stations: request.stations.map(Codes::from).unwrap_or_default(),
        locations: request.locations.map(Codes::from).unwrap_or_default(),
        channels: request.channels.map(Codes::from).unwrap_or_default(),
    };

    if request.cron {
        let days_before = request.days_before.unwrap_or(2);
        let end = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|midnight| midnight.and_utc())
            .ok_or_else(|| PipelineError::Validation("cannot resolve midnight".to_string()))?;
        let start = end
            - TimeDelta::try_days(days_before)
                .ok_or_else(|| PipelineError::Validation(format!("days_before {days_before}")))?;
        info!(%start, %end, "cron mode active");
        return RequestPlan::from_cross_product(&codes, start, end);
    }

    if let Some(windows) = request.time_windows {
        let windows = windows
            .iter()
            .map(|window| Ok((parse_instant(&window.start)?, parse_instant(&window.end)?)))
            .collect::<Result<Vec<_>, PipelineError>>()?;
        return RequestPlan::from_time_windows(&codes, &windows);
    }

    let start = request
        .start
        .as_deref()
        .ok_or_else(|| PipelineError::MissingField("start".to_string()))?;
    let end = request
        .end
        .as_deref()
        .ok_or_else(|| PipelineError::MissingField("end".to_string()))?;
    RequestPlan::from_cross_product(&codes, parse_instant(start)?, parse_instant(end)?)
}

/// Accepts RFC 3339, a naive `YYYY-MM-DDThh:mm:ss` (taken as UTC) or a bare date.
pub fn parse_instant(value: &str) -> Result<DateTime<Utc>, PipelineError> {
    let trimmed = value.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(instant.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    Err(PipelineError::Validation(format!("not a timestamp: {value}")))
}
