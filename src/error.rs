//! Error taxonomy for the ingest pipeline.

use thiserror::Error;

/// Errors surfaced by the pipeline components.
///
/// Per-item and per-query failures are converted into run counters by the
/// orchestrator; only `Unauthorized` and storage failures while loading VIPs
/// abort a whole request.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input could not be parsed as an absolute URL
    #[error("invalid url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// A single fetch exceeded its timeout and was cancelled
    #[error("fetch timed out after {timeout_ms}ms: {url}")]
    FetchTimeout { url: String, timeout_ms: u64 },

    /// Terminal non-success status, or a transport-level failure (status 0)
    #[error("http failure (status {status}) for {url}: {message}")]
    HttpFailure {
        url: String,
        status: u16,
        message: String,
    },

    /// Redirect chain longer than the allowed number of hops
    #[error("too many redirects (>{max}) starting at {url}")]
    TooManyRedirects { url: String, max: usize },

    /// Feed payload is not well-formed XML
    #[error("feed parse failure: {0}")]
    ParseFailure(String),

    /// Trigger credential missing or mismatched
    #[error("unauthorized")]
    Unauthorized,

    /// Storage lookup or write failed
    #[error("storage failure: {0}")]
    StorageFailure(String),
}

impl PipelineError {
    pub fn invalid_url(url: &str, reason: impl ToString) -> Self {
        Self::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn transport(url: &str, message: impl ToString) -> Self {
        Self::HttpFailure {
            url: url.to_string(),
            status: 0,
            message: message.to_string(),
        }
    }

    /// Whether the canonical resolver's outer retry may try again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::FetchTimeout { .. } | Self::HttpFailure { .. } | Self::TooManyRedirects { .. }
        )
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(e: sqlx::Error) -> Self {
        Self::StorageFailure(e.to_string())
    }
}

impl From<quick_xml::Error> for PipelineError {
    fn from(e: quick_xml::Error) -> Self {
        Self::ParseFailure(e.to_string())
    }
}
