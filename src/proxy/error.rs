//! Error types for the streaming proxy.

use thiserror::Error;

use crate::token::TokenError;

/// Why a proxy request could not be served.
#[derive(Debug, Clone, Error)]
pub enum ProxyError {
    /// Missing or contradictory query parameters
    #[error("bad proxy request: {message}")]
    BadRequest {
        /// What was wrong with the request
        message: String,
    },

    /// Token route called without a token
    #[error("reader token is required")]
    MissingToken,

    /// Token failed verification or has expired
    #[error(transparent)]
    Token(#[from] TokenError),

    /// Direct URL host is not on the allowlist
    #[error("domain not allowed: {host}")]
    DomainNotAllowed {
        /// Rejected host
        host: String,
    },

    /// Upstream redirected somewhere the proxy may not follow
    #[error("redirect not allowed: {location}")]
    RedirectNotAllowed {
        /// Rejected redirect target
        location: String,
    },

    /// Upstream redirected more than the hop cap
    #[error("upstream redirected more than {hops} times")]
    TooManyRedirects {
        /// Hop cap that was exceeded
        hops: usize,
    },

    /// Upstream answered 404
    #[error("upstream file not found")]
    NotFound,

    /// Upstream answered 401/403
    #[error("upstream refused access (HTTP {status})")]
    Forbidden {
        /// Upstream status
        status: u16,
    },

    /// Upstream answered another non-success status
    #[error("upstream returned HTTP {status}")]
    UpstreamStatus {
        /// Upstream status
        status: u16,
    },

    /// Upstream did not answer before the deadline
    #[error("upstream timed out")]
    Timeout,

    /// Transport failure talking to upstream
    #[error("upstream request failed: {message}")]
    Network {
        /// Transport error message
        message: String,
    },
}

impl ProxyError {
    /// Creates a `BadRequest` error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// HTTP status the API answers with.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest { .. } => 400,
            Self::MissingToken | Self::Token(_) => 401,
            Self::DomainNotAllowed { .. } | Self::RedirectNotAllowed { .. } | Self::Forbidden { .. } => 403,
            Self::NotFound => 404,
            Self::TooManyRedirects { .. } | Self::UpstreamStatus { .. } | Self::Network { .. } => 502,
            Self::Timeout => 504,
        }
    }

    /// Stable machine-readable code for API error bodies.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "bad_request",
            Self::MissingToken => "invalid_token",
            Self::Token(error) => error.code(),
            Self::DomainNotAllowed { .. } => "domain_not_allowed",
            Self::RedirectNotAllowed { .. } => "redirect_not_allowed",
            Self::Forbidden { .. } => "forbidden",
            Self::NotFound => "not_found",
            Self::TooManyRedirects { .. } | Self::UpstreamStatus { .. } | Self::Network { .. } => {
                "upstream_error"
            }
            Self::Timeout => "timeout",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ProxyError::bad_request("x").status_code(), 400);
        assert_eq!(ProxyError::MissingToken.status_code(), 401);
        assert_eq!(ProxyError::from(TokenError::Expired { exp: 1 }).status_code(), 401);
        assert_eq!(ProxyError::DomainNotAllowed { host: "x".into() }.status_code(), 403);
        assert_eq!(ProxyError::RedirectNotAllowed { location: "x".into() }.status_code(), 403);
        assert_eq!(ProxyError::Forbidden { status: 401 }.status_code(), 403);
        assert_eq!(ProxyError::NotFound.status_code(), 404);
        assert_eq!(ProxyError::UpstreamStatus { status: 500 }.status_code(), 502);
        assert_eq!(ProxyError::Network { message: "reset".into() }.status_code(), 502);
        assert_eq!(ProxyError::Timeout.status_code(), 504);
    }

    #[test]
    fn test_codes_follow_taxonomy() {
        assert_eq!(ProxyError::UpstreamStatus { status: 500 }.code(), "upstream_error");
        assert_eq!(ProxyError::from(TokenError::Expired { exp: 1 }).code(), "token_expired");
        assert_eq!(ProxyError::from(TokenError::invalid("x")).code(), "invalid_token");
        assert_eq!(ProxyError::DomainNotAllowed { host: "x".into() }.code(), "domain_not_allowed");
    }
}
