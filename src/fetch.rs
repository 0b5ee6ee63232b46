use std::time::Duration;

use camino::Utf8Path;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::store::Store;

/// Result of one fetch. Failures are values so a worker can keep going.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FetchOutcome {
    Written { bytes: usize },
    SkippedExisting,
    SkippedEmpty,
    FailedHttpStatus { status: u16 },
    FailedConnection { message: String },
    FailedOther { message: String },
}

impl FetchOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            FetchOutcome::FailedHttpStatus { .. }
                | FetchOutcome::FailedConnection { .. }
                | FetchOutcome::FailedOther { .. }
        )
    }
}

/// Issues one request. Callers skip destinations that already exist.
pub trait ChunkFetcher: Send + Sync {
    fn fetch(&self, url: &str, destination: &Utf8Path) -> FetchOutcome;
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, PipelineError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("seismo-pipeline/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| PipelineError::Http(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| PipelineError::Http(err.to_string()))?;
        Ok(Self { client })
    }

    fn classify_error(err: &reqwest::Error) -> FetchOutcome {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            FetchOutcome::FailedConnection {
                message: err.to_string(),
            }
        } else {
            FetchOutcome::FailedOther {
                message: err.to_string(),
            }
        }
    }
}

impl ChunkFetcher for HttpFetcher {
    fn fetch(&self, url: &str, destination: &Utf8Path) -> FetchOutcome {
        let response = match self.client.get(url).send() {
            Ok(response) => response,
            Err(err) => {
                let outcome = Self::classify_error(&err);
                warn!(%url, error = %err, "chunk request failed");
                return outcome;
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(%url, status = status.as_u16(), "chunk request rejected");
            return FetchOutcome::FailedHttpStatus {
                status: status.as_u16(),
            };
        }

        let body = match response.bytes() {
            Ok(body) => body,
            Err(err) => {
                warn!(%url, error = %err, "reading chunk body failed");
                return Self::classify_error(&err);
            }
        };
        if body.is_empty() {
            info!(%url, "no data returned for chunk");
            return FetchOutcome::SkippedEmpty;
        }

        match Store::write_bytes_atomic(destination, &body) {
            Ok(()) => {
                info!(%destination, bytes = body.len(), "chunk written");
                FetchOutcome::Written { bytes: body.len() }
            }
            Err(err) => {
                warn!(%destination, error = %err, "writing chunk failed");
                FetchOutcome::FailedOther {
                    message: err.to_string(),
                }
            }
        }
    }
}
