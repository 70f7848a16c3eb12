//! Crate-wide error type.

use std::sync::Arc;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by configuration synchronization, cohort loading, and
/// the evaluation engine.
///
/// Evaluation itself never surfaces an [`Error`] to callers (a malformed
/// condition yields a non-match, a dependency cycle yields an empty result);
/// this type covers the synchronization and transport layers.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum Error {
    /// The server responded with an unexpected HTTP status code.
    #[error("fetch failed with status {0}")]
    FetchError(u16),

    /// A cohort download returned 204: the caller's copy is current.
    #[error("cohort not modified")]
    CohortNotModified,

    /// A cohort download returned 413: the cohort exceeds `maxCohortSize`.
    #[error("cohort too large")]
    CohortTooLarge,

    /// A bulk cohort download failed for one or more individual cohorts.
    #[error("failed to download {} cohort(s)", .0.len())]
    CohortsDownload(Vec<(String, Error)>),

    /// The flag dependency graph contains a cycle.
    #[error("dependency cycle detected: {}", .0.join(" -> "))]
    CycleDetected(Vec<String>),

    /// A request did not complete within its configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The configured base URL could not be parsed.
    #[error("invalid base url: {0}")]
    InvalidBaseUrl(String),

    /// The server rejected our credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// An I/O error occurred (e.g. spawning a background task).
    #[error("io error: {0}")]
    Io(Arc<std::io::Error>),

    /// The underlying HTTP client reported a transport-level error.
    #[error("network error: {0}")]
    Network(Arc<reqwest::Error>),

    /// A background task panicked.
    #[error("background task panicked")]
    TaskPanicked,
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(Arc::new(err))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout
        } else {
            Error::Network(Arc::new(err))
        }
    }
}
