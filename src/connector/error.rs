//! Error types for catalog connectors.
//!
//! Connector errors never leave the aggregator: [`super::Connector::search`]
//! logs them and degrades to an empty result list. They exist so the retry
//! logic and the logs can tell a timeout from a bad payload.

use thiserror::Error;

use crate::http_client::HttpClientError;

/// Errors that can occur while querying an upstream catalog.
#[derive(Debug, Clone, Error)]
pub enum ConnectorError {
    /// Request exceeded its deadline
    #[error("{source_name} request timed out: {url}")]
    Timeout {
        /// Connector name
        source_name: &'static str,
        /// Request URL
        url: String,
    },

    /// Transport-level failure (DNS, connect, TLS, reset)
    #[error("{source_name} request failed for {url}: {message}")]
    Network {
        /// Connector name
        source_name: &'static str,
        /// Request URL
        url: String,
        /// Transport error message
        message: String,
    },

    /// Upstream answered with a non-success status
    #[error("{source_name} returned HTTP {status} for {url}")]
    HttpStatus {
        /// Connector name
        source_name: &'static str,
        /// Request URL
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// Payload did not match the expected shape
    #[error("{source_name} payload could not be parsed: {message}")]
    Parse {
        /// Connector name
        source_name: &'static str,
        /// Parser error message
        message: String,
    },

    /// HTTP client could not be constructed
    #[error(transparent)]
    Client(#[from] HttpClientError),
}

impl ConnectorError {
    /// Creates a `Timeout` error.
    #[must_use]
    pub fn timeout(source_name: &'static str, url: &str) -> Self {
        Self::Timeout {
            source_name,
            url: url.to_string(),
        }
    }

    /// Creates a `Network` error.
    #[must_use]
    pub fn network(source_name: &'static str, url: &str, message: impl Into<String>) -> Self {
        Self::Network {
            source_name,
            url: url.to_string(),
            message: message.into(),
        }
    }

    /// Creates an `HttpStatus` error.
    #[must_use]
    pub fn http_status(source_name: &'static str, url: &str, status: u16) -> Self {
        Self::HttpStatus {
            source_name,
            url: url.to_string(),
            status,
        }
    }

    /// Creates a `Parse` error.
    #[must_use]
    pub fn parse(source_name: &'static str, message: impl Into<String>) -> Self {
        Self::Parse {
            source_name,
            message: message.into(),
        }
    }

    /// Classifies a `reqwest` failure as timeout or network error.
    #[must_use]
    pub fn from_reqwest(source_name: &'static str, url: &str, error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::timeout(source_name, url)
        } else if error.is_decode() {
            Self::parse(source_name, error.to_string())
        } else {
            Self::network(source_name, url, error.to_string())
        }
    }

    /// Returns true for failures worth one more attempt.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
