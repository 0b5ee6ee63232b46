use std::iter::FusedIterator;

use camino::Utf8PathBuf;
use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::domain::{Endpoint, IdentifierTuple};
use crate::error::PipelineError;
use crate::plan::RequestPlan;
use crate::store::Store;

/// A strictly positive step between chunk starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkDuration(TimeDelta);

impl ChunkDuration {
    pub fn new(step: TimeDelta) -> Result<Self, PipelineError> {
        if step <= TimeDelta::zero() {
            return Err(PipelineError::InvalidChunkSize(step.to_string()));
        }
        Ok(Self(step))
    }

    pub fn hours(hours: i64) -> Result<Self, PipelineError> {
        let step = TimeDelta::try_hours(hours)
            .ok_or_else(|| PipelineError::InvalidChunkSize(format!("{hours}h")))?;
        Self::new(step)
    }

    pub fn as_delta(self) -> TimeDelta {
        self.0
    }
}

impl Default for ChunkDuration {
    fn default() -> Self {
        Self(TimeDelta::hours(1))
    }
}

/// Chunk starts in `[start, end)`, `step` apart.
pub fn chunks(start: DateTime<Utc>, end: DateTime<Utc>, step: ChunkDuration) -> Chunks {
    Chunks {
        next: Some(start),
        end,
        step: step.0,
    }
}

#[derive(Debug, Clone)]
pub struct Chunks {
    next: Option<DateTime<Utc>>,
    end: DateTime<Utc>,
    step: TimeDelta,
}

impl Iterator for Chunks {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.filter(|instant| *instant < self.end)?;
        self.next = current.checked_add_signed(self.step);
        Some(current)
    }
}

impl FusedIterator for Chunks {}

/// Everything derived from one identifier and one chunk start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDescriptor {
    pub id: IdentifierTuple,
    pub chunk_start: DateTime<Utc>,
    pub query_start: DateTime<Utc>,
    pub query_end: DateTime<Utc>,
    pub path: Utf8PathBuf,
}

impl ChunkDescriptor {
    pub fn new(
        store: &Store,
        id: &IdentifierTuple,
        chunk_start: DateTime<Utc>,
        chunk_size: ChunkDuration,
        buffer: TimeDelta,
        ext: &str,
    ) -> Self {
        Self {
            id: id.clone(),
            chunk_start,
            query_start: chunk_start - buffer,
            query_end: chunk_start + chunk_size.as_delta() + buffer,
            path: store.waveform_path(id, chunk_start, ext),
        }
    }

    pub fn url(&self, endpoint: &Endpoint) -> String {
        format!(
            "http://{endpoint}/data?channel={}&from={}&to={}",
            self.id,
            epoch_param(self.query_start),
            epoch_param(self.query_end)
        )
    }
}

/// Whole seconds when possible, microsecond precision otherwise.
fn epoch_param(instant: DateTime<Utc>) -> String {
    let micros = instant.timestamp_subsec_micros();
    if micros == 0 {
        instant.timestamp().to_string()
    } else {
        format!("{}.{micros:06}", instant.timestamp())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTask {
    pub url: String,
    pub destination: Utf8PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct FetchPlan {
    pub tasks: Vec<FetchTask>,
    pub unresolved_stations: Vec<String>,
}

/// Expands a plan into fetch tasks. Stations without an endpoint are skipped
/// and reported, the rest of the plan proceeds.
pub fn plan_fetch_tasks(plan: &RequestPlan, config: &PipelineConfig) -> FetchPlan {
    let store = Store::new(config.data_dir.clone());
    let ext = config.chunk_format.extension();
    let mut fetch_plan = FetchPlan::default();

    for request in plan {
        let station = &request.id().station;
        let endpoint = match config.endpoints.resolve(station) {
            Ok(endpoint) => endpoint,
            Err(err) => {
                if !fetch_plan.unresolved_stations.contains(station) {
                    warn!(station = %station, error = %err, "skipping station");
                    fetch_plan.unresolved_stations.push(station.clone());
                }
                continue;
            }
        };

        for chunk_start in chunks(request.start(), request.end(), config.chunk_size) {
            let descriptor = ChunkDescriptor::new(
                &store,
                request.id(),
                chunk_start,
                config.chunk_size,
                config.buffer,
                ext,
            );
            fetch_plan.tasks.push(FetchTask {
                url: descriptor.url(endpoint),
                destination: descriptor.path,
            });
        }
    }

    debug!(tasks = fetch_plan.tasks.len(), "fetch plan built");
    fetch_plan
}
