//! Error types for the churn pipeline.

use std::time::Duration;
use thiserror::Error;

/// Errors raised while walking the event feed or resolving commits.
#[derive(Error, Debug)]
pub enum ChurnError {
    /// The first page of the feed was rejected; credentials or user are wrong
    #[error("authentication failed ({status}): {message}")]
    AuthFailure { status: u16, message: String },

    /// The remote API throttled the request
    #[error("rate limited by remote API (status {status}{})", fmt_wait(.retry_after))]
    RateLimited {
        status: u16,
        retry_after: Option<Duration>,
    },

    /// Any other non-success status
    #[error("request to {url} failed with status {status}: {message}")]
    Status {
        url: String,
        status: u16,
        message: String,
    },

    /// A follow-up page could not be fetched
    #[error("failed to fetch page {url}: {source}")]
    PageFetch {
        url: String,
        #[source]
        source: Box<ChurnError>,
    },

    /// A commit detail could not be fetched
    #[error("failed to fetch commit {sha} in {repo}: {source}")]
    CommitFetch {
        repo: String,
        sha: String,
        #[source]
        source: Box<ChurnError>,
    },

    /// The remote returned JSON missing required keys
    #[error("malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },

    /// Transport failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid API base URL {url}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("credentials unavailable: {0}")]
    Credentials(String),

    #[error("run exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),

    #[error("run cancelled")]
    Cancelled,

    /// A background task panicked or was aborted unexpectedly
    #[error("task failure: {0}")]
    Task(String),
}

fn fmt_wait(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(wait) => format!(", retry after {}s", wait.as_secs()),
        None => String::new(),
    }
}

impl ChurnError {
    /// Whether repeating the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ChurnError::RateLimited { .. } => true,
            ChurnError::Status { status, .. } => *status >= 500,
            ChurnError::Http(err) => err.is_timeout() || err.is_connect(),
            ChurnError::PageFetch { source, .. } | ChurnError::CommitFetch { source, .. } => {
                source.is_retryable()
            }
            _ => false,
        }
    }

    /// Wait requested by the remote before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ChurnError::RateLimited { retry_after, .. } => *retry_after,
            ChurnError::PageFetch { source, .. } | ChurnError::CommitFetch { source, .. } => {
                source.retry_after()
            }
            _ => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ChurnError::RateLimited { .. })
    }
}

/// Result type alias using ChurnError.
pub type ChurnResult<T> = Result<T, ChurnError>;
