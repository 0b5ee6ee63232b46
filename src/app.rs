use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::chunk::plan_fetch_tasks;
use crate::config::PipelineConfig;
use crate::domain::{FillPolicy, GatherSize, IdentifierTuple};
use crate::error::PipelineError;
use crate::fetch::ChunkFetcher;
use crate::gather::{GatherOutcome, Gatherer};
use crate::gaps::{GapAuditor, GapRecord, load_request_records, save_gap_records};
use crate::plan::RequestPlan;
use crate::scheduler::{FetchReport, Scheduler};
use crate::store::Store;

#[derive(Debug, Clone, Serialize)]
pub struct DownloadReport {
    pub requests: usize,
    pub tasks: usize,
    pub unresolved_stations: Vec<String>,
    #[serde(flatten)]
    pub fetch: FetchReport,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GatherReport {
    pub written: Vec<GatheredBucket>,
    pub empty: usize,
    pub failed: Vec<GatherFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GatheredBucket {
    pub id: String,
    pub bucket_start: DateTime<Utc>,
    pub path: Utf8PathBuf,
    pub sources: usize,
    pub gaps: usize,
    pub samples: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct GatherFailure {
    pub id: String,
    pub bucket_start: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GapReport {
    pub gaps: Vec<GapRecord>,
    pub saved_to: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<F: ChunkFetcher> {
    config: PipelineConfig,
    fetcher: F,
}

impl<F: ChunkFetcher> App<F> {
    pub fn new(config: PipelineConfig, fetcher: F) -> Self {
        Self { config, fetcher }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn download(
        &self,
        plan: &RequestPlan,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadReport, PipelineError> {
        let scheduler = Scheduler::new(self.config.max_requests_per_endpoint)?;
        let started = Instant::now();
        let fetch_plan = plan_fetch_tasks(plan, &self.config);
        let tasks = fetch_plan.tasks.len();
        sink.event(ProgressEvent {
            message: format!("phase=Fetch; requests={} tasks={tasks}", plan.len()),
            elapsed: None,
        });

        let fetch = scheduler.run(&self.fetcher, fetch_plan.tasks);
        sink.event(ProgressEvent {
            message: format!(
                "phase=Done; written={} failed={}",
                fetch.written,
                fetch.failed()
            ),
            elapsed: Some(started.elapsed()),
        });

        Ok(DownloadReport {
            requests: plan.len(),
            tasks,
            unresolved_stations: fetch_plan.unresolved_stations,
            fetch,
        })
    }

    /// Re-requests windows listed in a saved gap or request file.
    pub fn backfill(
        &self,
        records: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadReport, PipelineError> {
        let plan = RequestPlan::from_records(load_request_records(records)?)?;
        self.download(&plan, sink)
    }

    /// Gathers every bucket touched by the plan. A failed bucket keeps its
    /// chunks and does not stop the others.
    pub fn gather(
        &self,
        plan: &RequestPlan,
        size: GatherSize,
        fill: FillPolicy,
        sink: &dyn ProgressSink,
    ) -> Result<GatherReport, PipelineError> {
        Store::new(self.config.data_dir.clone()).ensure_data_root()?;
        let gatherer = Gatherer::from_config(&self.config);
        let started = Instant::now();
        let buckets = plan_buckets(plan, size);
        sink.event(ProgressEvent {
            message: format!("phase=Gather; buckets={}", buckets.len()),
            elapsed: None,
        });

        let mut report = GatherReport::default();
        for (id, bucket_start) in buckets {
            match gatherer.gather(&id, bucket_start, size, fill) {
                Ok(GatherOutcome::Written {
                    path,
                    sources,
                    gaps,
                    samples,
                    ..
                }) => report.written.push(GatheredBucket {
                    id: id.to_string(),
                    bucket_start,
                    path,
                    sources,
                    gaps,
                    samples,
                }),
                Ok(GatherOutcome::NoData) => report.empty += 1,
                Err(err) => {
                    warn!(%id, bucket = %bucket_start, error = %err, "bucket not gathered");
                    report.failed.push(GatherFailure {
                        id: id.to_string(),
                        bucket_start,
                        message: err.to_string(),
                    });
                }
            }
        }

        sink.event(ProgressEvent {
            message: format!(
                "phase=Done; written={} failed={}",
                report.written.len(),
                report.failed.len()
            ),
            elapsed: Some(started.elapsed()),
        });
        Ok(report)
    }

    pub fn find_gaps(
        &self,
        plan: &RequestPlan,
        size: GatherSize,
        min_gap_samples: u64,
        out: Option<&Utf8Path>,
        sink: &dyn ProgressSink,
    ) -> Result<GapReport, PipelineError> {
        let started = Instant::now();
        let gaps = GapAuditor::from_config(&self.config).find_gaps(plan, size, min_gap_samples)?;
        if let Some(path) = out {
            save_gap_records(path, &gaps)?;
        }
        sink.event(ProgressEvent {
            message: format!("phase=Done; gaps={}", gaps.len()),
            elapsed: Some(started.elapsed()),
        });
        Ok(GapReport {
            gaps,
            saved_to: out.map(Utf8Path::to_path_buf),
        })
    }
}

/// Distinct (identifier, bucket start) pairs covering each request's window.
fn plan_buckets(plan: &RequestPlan, size: GatherSize) -> BTreeSet<(IdentifierTuple, DateTime<Utc>)> {
    let mut buckets = BTreeSet::new();
    for request in plan {
        let mut bucket_start = size.align(request.start());
        while bucket_start < request.end() {
            buckets.insert((request.id().clone(), bucket_start));
            bucket_start += size.duration();
        }
    }
    buckets
}
