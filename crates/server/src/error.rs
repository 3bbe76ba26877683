//! HTTP error mapping for the worker's surface.
//!
//! Bodies carry the upper-case error code so kiosk pages can tell an
//! offline condition from a broken request.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use kiosk_client::ContentError;
use kiosk_core::Error;
use serde_json::json;

/// Structured errors for the kiosk worker's HTTP surface.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error(transparent)]
    Worker(#[from] Error),

    #[error("CONTENT_ERROR: {0}")]
    Content(#[from] ContentError),

    /// The request target cannot be turned into an upstream URL.
    #[error("INVALID_TARGET: {0}")]
    InvalidTarget(String),

    #[error("NOT_FOUND: {0}")]
    NotFound(String),
}

impl ProxyError {
    fn status(&self) -> StatusCode {
        match self {
            ProxyError::Worker(err) => match err {
                Error::Offline(_) => StatusCode::GATEWAY_TIMEOUT,
                Error::Network(_) | Error::FetchTimeout(_) | Error::FetchTooLarge(_) => StatusCode::BAD_GATEWAY,
                Error::InvalidInput(_) | Error::InvalidUrl(_) => StatusCode::BAD_REQUEST,
                Error::InvalidState(_) => StatusCode::SERVICE_UNAVAILABLE,
                Error::Database(_) | Error::MigrationFailed(_) | Error::InstallFailed(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ProxyError::Content(err) => match err {
                ContentError::NotFound(_) => StatusCode::NOT_FOUND,
                ContentError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
                ContentError::InvalidConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
                ContentError::Timeout => StatusCode::GATEWAY_TIMEOUT,
                ContentError::HttpError { .. } | ContentError::Network(_) | ContentError::Parse(_) => {
                    StatusCode::BAD_GATEWAY
                }
            },
            ProxyError::InvalidTarget(_) => StatusCode::BAD_REQUEST,
            ProxyError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ProxyError::from(Error::Offline("https://kiosk.local/".into())), StatusCode::GATEWAY_TIMEOUT),
            (ProxyError::from(Error::Network("refused".into())), StatusCode::BAD_GATEWAY),
            (ProxyError::from(Error::InvalidUrl("::".into())), StatusCode::BAD_REQUEST),
            (ProxyError::from(Error::InstallFailed("favicon".into())), StatusCode::INTERNAL_SERVER_ERROR),
            (ProxyError::from(ContentError::NotFound("exp-1".into())), StatusCode::NOT_FOUND),
            (ProxyError::from(ContentError::HttpError { status: 500 }), StatusCode::BAD_GATEWAY),
            (ProxyError::NotFound("exhibit exp-1".into()), StatusCode::NOT_FOUND),
            (ProxyError::InvalidTarget("*".into()), StatusCode::BAD_REQUEST),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status, "{err}");
        }
    }

    #[test]
    fn test_display_keeps_code() {
        assert_eq!(ProxyError::from(Error::Offline("x".into())).to_string(), "OFFLINE: x");
        assert_eq!(ProxyError::NotFound("exhibit".into()).to_string(), "NOT_FOUND: exhibit");
    }
}
