//! Error types for search polling.

use thiserror::Error;

/// Result type alias using the searchpoll error type.
pub type Result<T> = std::result::Result<T, SearchPollError>;

/// Main error type for polling and its configuration.
///
/// Timing out is not an error: it is reported as
/// [`PollOutcome::TimedOut`](crate::poller::PollOutcome::TimedOut).
#[derive(Error, Debug)]
pub enum SearchPollError {
    /// A setting is invalid (non-positive deadline, malformed URL, missing name...)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The visibility check itself broke. Never retried.
    #[error("Visibility check failed on attempt {attempt}: {source}")]
    PredicateFailed {
        attempt: u32,
        #[source]
        source: anyhow::Error,
    },

    /// The best-effort index commit did not succeed
    #[error("Index commit failed: {0}")]
    CommitOptimizationFailed(String),

    /// HTTP client error
    #[error("HTTP request failed: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Reading a configuration file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// General error from anyhow
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SearchPollError {
    /// Whether this error came from the caller's visibility check.
    pub fn is_predicate_failure(&self) -> bool {
        matches!(self, SearchPollError::PredicateFailed { .. })
    }
}
