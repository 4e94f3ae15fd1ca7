//! Per-source HTTP access with one bounded retry.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::http_client::{HttpTimeouts, RedirectMode, build_http_client};
use crate::user_agent::default_connector_user_agent;

use super::ConnectorError;

/// Default first-attempt timeout; the retry doubles it.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(2500);

/// HTTP client, base URL, and request deadline for one upstream catalog.
#[derive(Clone)]
pub(crate) struct SourceClient {
    name: &'static str,
    client: Client,
    base_url: String,
    request_timeout: Duration,
}

impl SourceClient {
    pub(crate) fn new(name: &'static str, base_url: impl Into<String>) -> Result<Self, ConnectorError> {
        let client = build_http_client(
            name,
            default_connector_user_agent(),
            HttpTimeouts::default(),
            RedirectMode::Follow,
        )?;
        Ok(Self {
            name,
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    pub(crate) fn set_request_timeout(&mut self, timeout: Duration) {
        self.request_timeout = timeout.max(Duration::from_millis(1));
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Joins `path_and_query` onto the base URL.
    pub(crate) fn url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base_url, path_and_query)
    }

    /// Fetches and decodes a JSON document, retrying once on timeout with a
    /// doubled deadline.
    pub(crate) async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ConnectorError> {
        let body = self.get_text(url, "application/json").await?;
        serde_json::from_str(&body).map_err(|e| ConnectorError::parse(self.name, e.to_string()))
    }

    /// Fetches a response body as text with the same retry policy as
    /// [`get_json`](Self::get_json).
    pub(crate) async fn get_text(&self, url: &str, accept: &str) -> Result<String, ConnectorError> {
        match self.attempt(url, accept, self.request_timeout).await {
            Err(error) if error.is_transient() => {
                let retry_timeout = self.request_timeout.saturating_mul(2);
                debug!(
                    source = self.name,
                    url,
                    retry_timeout_ms = u64::try_from(retry_timeout.as_millis()).unwrap_or(u64::MAX),
                    "retrying after transient failure"
                );
                self.attempt(url, accept, retry_timeout).await
            }
            other => other,
        }
    }

    async fn attempt(&self, url: &str, accept: &str, timeout: Duration) -> Result<String, ConnectorError> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, accept)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ConnectorError::from_reqwest(self.name, url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConnectorError::http_status(self.name, url, status.as_u16()));
        }

        response
            .text()
            .await
            .map_err(|e| ConnectorError::from_reqwest(self.name, url, &e))
    }
}

impl std::fmt::Debug for SourceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceClient")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}
