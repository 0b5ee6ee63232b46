use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::sync::mpsc::{self, Receiver};
use std::thread;

use reqwest::Url;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::chunk::FetchTask;
use crate::config::MAX_REQUESTS_PER_ENDPOINT;
use crate::error::PipelineError;
use crate::fetch::{ChunkFetcher, FetchOutcome};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchReport {
    pub written: usize,
    pub skipped_existing: usize,
    pub skipped_empty: usize,
    pub failed_http_status: usize,
    pub failed_connection: usize,
    pub failed_other: usize,
    pub failures: Vec<FailedFetch>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedFetch {
    pub url: String,
    pub outcome: FetchOutcome,
}

impl FetchReport {
    pub fn total(&self) -> usize {
        self.written
            + self.skipped_existing
            + self.skipped_empty
            + self.failed_http_status
            + self.failed_connection
            + self.failed_other
    }

    pub fn failed(&self) -> usize {
        self.failed_http_status + self.failed_connection + self.failed_other
    }

    fn record(&mut self, url: String, outcome: FetchOutcome) {
        match &outcome {
            FetchOutcome::Written { .. } => self.written += 1,
            FetchOutcome::SkippedExisting => self.skipped_existing += 1,
            FetchOutcome::SkippedEmpty => self.skipped_empty += 1,
            FetchOutcome::FailedHttpStatus { .. } => self.failed_http_status += 1,
            FetchOutcome::FailedConnection { .. } => self.failed_connection += 1,
            FetchOutcome::FailedOther { .. } => self.failed_other += 1,
        }
        if outcome.is_failure() {
            self.failures.push(FailedFetch { url, outcome });
        }
    }
}

/// Runs fetch tasks with a per-endpoint ceiling on in-flight requests.
/// Endpoints are served in parallel with each other.
#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    max_per_endpoint: usize,
}

impl Scheduler {
    pub fn new(max_per_endpoint: usize) -> Result<Self, PipelineError> {
        if max_per_endpoint == 0 || max_per_endpoint > MAX_REQUESTS_PER_ENDPOINT {
            return Err(PipelineError::InvalidConcurrency(max_per_endpoint));
        }
        Ok(Self { max_per_endpoint })
    }

    pub fn max_per_endpoint(&self) -> usize {
        self.max_per_endpoint
    }

    /// Returns once every task has an outcome. A task whose destination
    /// already exists is reported as skipped without reaching the fetcher,
    /// and a panicking fetcher counts as a failure of that task alone.
    pub fn run<F>(&self, fetcher: &F, tasks: Vec<FetchTask>) -> FetchReport
    where
        F: ChunkFetcher + ?Sized,
    {
        let (result_tx, result_rx) = mpsc::channel();
        thread::scope(|scope| {
            for (endpoint, tasks) in group_by_endpoint(tasks) {
                let workers = tasks.len().min(self.max_per_endpoint);
                info!(endpoint = %endpoint, tasks = tasks.len(), workers, "dispatching chunk requests");

                let (task_tx, task_rx) = mpsc::sync_channel::<FetchTask>(self.max_per_endpoint);
                scope.spawn(move || {
                    for task in tasks {
                        if task_tx.send(task).is_err() {
                            break;
                        }
                    }
                });

                let queue = Arc::new(Mutex::new(task_rx));
                for _ in 0..workers {
                    let queue = Arc::clone(&queue);
                    let result_tx = result_tx.clone();
                    scope.spawn(move || {
                        while let Some(task) = next_task(&queue) {
                            let outcome = fetch_once(fetcher, &task);
                            if result_tx.send((task.url, outcome)).is_err() {
                                break;
                            }
                        }
                    });
                }
            }
        });
        drop(result_tx);

        let mut report = FetchReport::default();
        for (url, outcome) in result_rx {
            report.record(url, outcome);
        }
        info!(
            written = report.written,
            skipped = report.skipped_existing + report.skipped_empty,
            failed = report.failed(),
            "fetch run complete"
        );
        report
    }
}

fn fetch_once<F>(fetcher: &F, task: &FetchTask) -> FetchOutcome
where
    F: ChunkFetcher + ?Sized,
{
    if task.destination.as_std_path().is_file() {
        debug!(destination = %task.destination, "chunk already on disk");
        return FetchOutcome::SkippedExisting;
    }
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        fetcher.fetch(&task.url, &task.destination)
    }))
    .unwrap_or_else(|_| {
        warn!(url = %task.url, "fetcher panicked");
        FetchOutcome::FailedOther {
            message: "fetcher panicked".to_string(),
        }
    });
    debug!(url = %task.url, ?outcome, "fetch finished");
    outcome
}

/// The lock is held only while taking the next task off the queue.
fn next_task(queue: &Mutex<Receiver<FetchTask>>) -> Option<FetchTask> {
    let receiver = queue.lock().ok()?;
    receiver.recv().ok()
}

/// Groups by URL host. Unparsable URLs form their own group.
fn group_by_endpoint(tasks: Vec<FetchTask>) -> BTreeMap<String, Vec<FetchTask>> {
    let mut groups: BTreeMap<String, Vec<FetchTask>> = BTreeMap::new();
    for task in tasks {
        let key = Url::parse(&task.url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| task.url.clone());
        groups.entry(key).or_default().push(task);
    }
    groups
}
