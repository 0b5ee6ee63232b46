use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("missing required parameters: {0}")]
    MissingField(String),

    #[error("request start {start} is not before end {end}")]
    InvalidTimeOrder { start: String, end: String },

    #[error("invalid identifier code: {0}")]
    InvalidIdentifier(String),

    #[error("request plan is empty")]
    EmptyPlan,

    #[error("no endpoint configured for station {0}")]
    UnknownStation(String),

    #[error("invalid endpoint address: {0}")]
    InvalidEndpoint(String),

    #[error("missing config file seismo-pipeline.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("max requests per endpoint must be between 1 and 3, got {0}")]
    #[diagnostic(help("the sensors accept at most 3 concurrent connections"))]
    InvalidConcurrency(usize),

    #[error("chunk duration must be positive, got {0}")]
    InvalidChunkSize(String),

    #[error("data directory does not exist: {0}")]
    MissingDataDir(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("http client error: {0}")]
    Http(String),

    #[error("waveform codec error: {0}")]
    Codec(String),

    #[error("gather failed for {bucket}: {message}")]
    Gather { bucket: String, message: String },
}
