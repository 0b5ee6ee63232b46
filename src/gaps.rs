use camino::Utf8Path;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::codec::WaveformCodec;
use crate::config::PipelineConfig;
use crate::domain::{GatherSize, IdentifierTuple};
use crate::error::PipelineError;
use crate::plan::{RequestPlan, RequestSpec};
use crate::store::Store;
use crate::waveform::{detect_gaps, edge_gaps, trim};

/// A window of missing data. Serialized flat so it can be fed back as a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapRecord {
    #[serde(flatten)]
    pub id: IdentifierTuple,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TryFrom<GapRecord> for RequestSpec {
    type Error = PipelineError;

    fn try_from(record: GapRecord) -> Result<Self, Self::Error> {
        RequestSpec::new(record.id, record.start, record.end)
    }
}

/// Compares the consolidated files on disk against what a plan expects.
pub struct GapAuditor {
    store: Store,
    codec: Box<dyn WaveformCodec>,
}

impl GapAuditor {
    pub fn new(store: Store, codec: Box<dyn WaveformCodec>) -> Self {
        Self { store, codec }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            Store::new(config.data_dir.clone()),
            config.output_format.codec(),
        )
    }

    /// Each missing, unreadable or incomplete file yields one record covering
    /// its whole bucket, clipped to the plan's span. A file is incomplete when
    /// it has a discontinuity, or uncovered head or tail, of at least
    /// `min_gap_samples`.
    pub fn find_gaps(
        &self,
        plan: &RequestPlan,
        size: GatherSize,
        min_gap_samples: u64,
    ) -> Result<Vec<GapRecord>, PipelineError> {
        self.store.ensure_data_root()?;
        let (span_start, span_end) = plan.span();
        let mut records = Vec::new();

        for id in plan.identifiers() {
            let mut bucket_start = size.align(span_start);
            while bucket_start < span_end {
                let bucket_end = bucket_start + size.duration();
                let window_start = bucket_start.max(span_start);
                let window_end = bucket_end.min(span_end);
                let whole_bucket = GapRecord {
                    id: id.clone(),
                    start: window_start,
                    end: window_end,
                };

                let path = self
                    .store
                    .waveform_path(&id, bucket_start, self.codec.extension());
                if !self.store.exists(&path) {
                    records.push(whole_bucket);
                    bucket_start = bucket_end;
                    continue;
                }

                let decoded = Store::read_bytes(&path).and_then(|bytes| self.codec.decode(&bytes));
                match decoded {
                    Ok(stream) => {
                        let stream = trim(stream, window_start, window_end);
                        let incomplete = stream.is_empty()
                            || !detect_gaps(&stream, min_gap_samples).is_empty()
                            || !edge_gaps(&stream, window_start, window_end, min_gap_samples)
                                .is_empty();
                        if incomplete {
                            debug!(%path, "consolidated file has gaps");
                            records.push(whole_bucket);
                        }
                    }
                    Err(err) => {
                        warn!(%path, error = %err, "unreadable consolidated file counted as gap");
                        records.push(whole_bucket);
                    }
                }
                bucket_start = bucket_end;
            }
        }

        info!(gaps = records.len(), "gap audit complete");
        Ok(records)
    }
}

pub fn save_gap_records(path: &Utf8Path, records: &[GapRecord]) -> Result<(), PipelineError> {
    let json = serde_json::to_vec_pretty(records)
        .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    Store::write_bytes_atomic(path, &json)
}

/// Reads a JSON array of flat request records, the same shape gap records are saved in.
pub fn load_request_records(path: &Utf8Path) -> Result<Vec<RequestSpec>, PipelineError> {
    let bytes = Store::read_bytes(path)?;
    serde_json::from_slice(&bytes)
        .map_err(|err| PipelineError::ConfigParse(format!("{path}: {err}")))
}
