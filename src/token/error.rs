//! Error types for reader token operations.

use thiserror::Error;

/// Why a token could not be built or was rejected.
///
/// Verification failures always mean "unauthenticated" to callers; they are
/// never escalated into crashes.
#[derive(Debug, Clone, Error)]
pub enum TokenError {
    /// Malformed, tampered, or otherwise unverifiable token.
    #[error("invalid reader token: {reason}")]
    Invalid {
        /// What was wrong with the token.
        reason: &'static str,
    },

    /// Token signature is valid but its expiry has passed.
    #[error("reader token expired at {exp}")]
    Expired {
        /// Expiry timestamp (Unix seconds) carried by the token.
        exp: u64,
    },

    /// Payload could not be serialized.
    #[error("failed to encode reader token payload: {message}")]
    Encode {
        /// Serializer error message.
        message: String,
    },
}

impl TokenError {
    /// Creates an `Invalid` error.
    #[must_use]
    pub fn invalid(reason: &'static str) -> Self {
        Self::Invalid { reason }
    }

    /// Creates an `Encode` error from a serializer failure.
    #[must_use]
    pub fn encode(source: serde_json::Error) -> Self {
        Self::Encode {
            message: source.to_string(),
        }
    }

    /// Stable machine-readable code for API error bodies.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Invalid { .. } | Self::Encode { .. } => "invalid_token",
            Self::Expired { .. } => "token_expired",
        }
    }
}

/// Why a token request could not be answered.
#[derive(Debug, Clone, Error)]
pub enum IssueError {
    /// Request did not identify anything that can be resolved.
    #[error("invalid token request: {message}")]
    InvalidRequest {
        /// What was missing or malformed
        message: String,
    },

    /// Signing failed.
    #[error(transparent)]
    Token(#[from] TokenError),
}

impl IssueError {
    /// Creates an `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }
}
