//! API and startup errors.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::config::ConfigError;
use crate::http_client::HttpClientError;
use crate::proxy::ProxyError;
use crate::token::IssueError;

/// Failure answered as `{ ok: false, error, message }`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed parameters
    #[error("{message}")]
    BadRequest {
        /// Human-readable detail
        message: String,
    },

    /// Nothing servable for the request
    #[error("{message}")]
    NotFound {
        /// Taxonomy code
        code: &'static str,
        /// Human-readable detail
        message: String,
    },

    /// Item exists but may not be served through the reader
    #[error("{message}")]
    Forbidden {
        /// Taxonomy code
        code: &'static str,
        /// Human-readable detail
        message: String,
    },

    /// Streaming proxy failure
    #[error(transparent)]
    Proxy(#[from] ProxyError),

    /// Token issuance failure
    #[error(transparent)]
    Issue(#[from] IssueError),

    /// Unexpected server-side failure
    #[error("internal error: {message}")]
    Internal {
        /// Detail, logged and returned
        message: String,
    },
}

impl ApiError {
    /// Creates a `BadRequest` error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Creates a `NotFound` error.
    #[must_use]
    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::NotFound {
            code,
            message: message.into(),
        }
    }

    /// Creates a `Forbidden` error.
    #[must_use]
    pub fn forbidden(code: &'static str, message: impl Into<String>) -> Self {
        Self::Forbidden {
            code,
            message: message.into(),
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } | Self::Issue(IssueError::InvalidRequest { .. }) => StatusCode::BAD_REQUEST,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Proxy(error) => StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::BAD_GATEWAY),
            Self::Issue(IssueError::Token(_)) | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } | Self::Issue(IssueError::InvalidRequest { .. }) => "bad_request",
            Self::NotFound { code, .. } | Self::Forbidden { code, .. } => *code,
            Self::Proxy(error) => error.code(),
            Self::Issue(IssueError::Token(_)) | Self::Internal { .. } => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "request failed");
        } else {
            tracing::debug!(error = %self, code = self.code(), "request rejected");
        }
        let body = json!({
            "ok": false,
            "error": self.code(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

/// Failure while wiring the application state.
#[derive(Debug, Error)]
pub enum StartupError {
    /// Invalid or incomplete configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An HTTP client could not be built
    #[error(transparent)]
    HttpClient(#[from] HttpClientError),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::token::TokenError;

    #[test]
    fn test_proxy_errors_keep_their_status() {
        let err = ApiError::from(ProxyError::DomainNotAllowed { host: "evil.example".into() });
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.code(), "domain_not_allowed");

        let err = ApiError::from(ProxyError::from(TokenError::Expired { exp: 1 }));
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.code(), "token_expired");
    }

    #[test]
    fn test_invalid_token_request_is_bad_request() {
        let err = ApiError::from(IssueError::invalid_request("no id"));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "bad_request");
    }

    #[test]
    fn test_forbidden_carries_its_code() {
        let err = ApiError::forbidden("borrow_required", "lending only");
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.code(), "borrow_required");
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = ApiError::not_found("no_usable_files", "no PDF in item").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["ok"], false);
        assert_eq!(body["error"], "no_usable_files");
        assert_eq!(body["message"], "no PDF in item");
    }
}
