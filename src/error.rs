use std::path::PathBuf;

use thiserror::Error;

/// Terminal failures of a single download invocation.
///
/// Transient connection losses are retried internally and only surface here
/// once the retry budget is gone.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("download from {url} exhausted {attempts} attempts: {source}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("{url} answered with status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("filesystem error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("download worker terminated abnormally")]
    Worker,
}
