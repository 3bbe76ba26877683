//! Content API client error types.

use std::sync::Arc;

/// Errors from the headless CMS Content API client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ContentError {
    /// Project id, dataset or API version cannot form a valid endpoint.
    #[error("invalid content configuration: {0}")]
    InvalidConfig(String),

    /// Invalid query parameters.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// A single-document query matched nothing.
    #[error("not found: {0}")]
    NotFound(String),

    /// HTTP error response.
    #[error("HTTP error: {status}")]
    HttpError { status: u16 },

    /// Request timeout.
    #[error("request timeout")]
    Timeout,

    /// Network error.
    #[error("network error: {0}")]
    Network(Arc<reqwest::Error>),

    /// Response parse error.
    #[error("parse error: {0}")]
    Parse(String),
}

impl ContentError {
    /// Whether the CMS was unreachable rather than answering with an error.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ContentError::Timeout | ContentError::Network(_))
    }
}

impl From<reqwest::Error> for ContentError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { ContentError::Timeout } else { ContentError::Network(Arc::new(err)) }
    }
}

impl From<serde_json::Error> for ContentError {
    fn from(err: serde_json::Error) -> Self {
        ContentError::Parse(err.to_string())
    }
}
