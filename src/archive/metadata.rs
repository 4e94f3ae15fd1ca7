//! Cached Archive.org item metadata.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::cache::TtlCache;
use crate::connector::utils::OneOrMany;
use crate::http_client::{HttpClientError, HttpTimeouts, RedirectMode, build_http_client};
use crate::user_agent::default_connector_user_agent;

pub(crate) const DEFAULT_ARCHIVE_BASE_URL: &str = "https://archive.org";

/// Default deadline for one metadata fetch.
pub const DEFAULT_METADATA_TIMEOUT: Duration = Duration::from_millis(6000);

// ==================== Metadata API Response Types ====================

#[derive(Debug, Deserialize)]
pub(crate) struct RawMetadata {
    #[serde(default)]
    pub files: Vec<RawFile>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub is_dark: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawFile {
    pub name: String,
    #[serde(default)]
    pub format: Option<String>,
    /// Archive.org reports sizes as strings.
    #[serde(default)]
    pub size: Option<serde_json::Value>,
}

// ==================== Domain Types ====================

/// One file listed in an item's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveFile {
    pub name: String,
    /// Archive.org format label, e.g. `"EPUB"` or `"Text PDF"`.
    pub format: String,
    pub size_bytes: Option<u64>,
}

impl ArchiveFile {
    /// Creates a file entry.
    #[must_use]
    pub fn new(name: impl Into<String>, format: impl Into<String>, size_bytes: Option<u64>) -> Self {
        Self {
            name: name.into(),
            format: format.into(),
            size_bytes,
        }
    }
}

/// Parsed metadata for one archive item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArchiveMetadata {
    pub files: Vec<ArchiveFile>,
    /// Raw `metadata` object (collection, access flags, lending status, ...).
    pub fields: HashMap<String, serde_json::Value>,
    /// Item withdrawn from public access; its files are never served.
    pub is_dark: bool,
}

impl ArchiveMetadata {
    /// String values of a metadata field that may be a scalar or an array.
    #[must_use]
    pub fn field_values(&self, key: &str) -> Vec<String> {
        let Some(value) = self.fields.get(key) else {
            return Vec::new();
        };
        serde_json::from_value::<OneOrMany<serde_json::Value>>(value.clone())
            .map(OneOrMany::into_vec)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|v| match v {
                serde_json::Value::String(s) => Some(s),
                serde_json::Value::Bool(b) => Some(b.to_string()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect()
    }

    /// True when a field is the boolean `true` or the string `"true"`.
    #[must_use]
    pub fn field_is_true(&self, key: &str) -> bool {
        self.field_values(key)
            .iter()
            .any(|v| v.trim().eq_ignore_ascii_case("true"))
    }
}

impl From<RawMetadata> for ArchiveMetadata {
    fn from(raw: RawMetadata) -> Self {
        Self {
            files: raw
                .files
                .into_iter()
                .map(|f| ArchiveFile {
                    size_bytes: f.size.as_ref().and_then(parse_size),
                    format: f.format.unwrap_or_default(),
                    name: f.name,
                })
                .collect(),
            fields: raw.metadata,
            is_dark: raw.is_dark.unwrap_or(false),
        }
    }
}

fn parse_size(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parses a `/metadata/<id>` body.
///
/// Returns `None` for the empty `{}` document Archive.org serves for unknown
/// identifiers, and for anything that is not a metadata object.
#[must_use]
pub fn parse_metadata(body: &str) -> Option<ArchiveMetadata> {
    let raw: RawMetadata = serde_json::from_str(body).ok()?;
    if raw.files.is_empty() && raw.metadata.is_empty() {
        return None;
    }
    Some(raw.into())
}

// ==================== ArchiveMetadataClient ====================

/// Fetches `/metadata/<id>` with a TTL cache in front.
///
/// Only successful lookups are cached; failures are retried on the next call.
#[derive(Clone)]
pub struct ArchiveMetadataClient {
    client: Client,
    base_url: String,
    timeout: Duration,
    cache: Arc<TtlCache<String, Arc<ArchiveMetadata>>>,
}

impl ArchiveMetadataClient {
    /// Creates a client against archive.org.
    ///
    /// # Errors
    ///
    /// Returns [`HttpClientError`] when client construction fails.
    pub fn new(cache: Arc<TtlCache<String, Arc<ArchiveMetadata>>>) -> Result<Self, HttpClientError> {
        Self::with_base_url(DEFAULT_ARCHIVE_BASE_URL, cache)
    }

    /// Creates a client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`HttpClientError`] when client construction fails.
    pub fn with_base_url(
        base_url: impl Into<String>,
        cache: Arc<TtlCache<String, Arc<ArchiveMetadata>>>,
    ) -> Result<Self, HttpClientError> {
        let client = build_http_client(
            "archive-metadata",
            default_connector_user_agent(),
            HttpTimeouts::default(),
            RedirectMode::Follow,
        )?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: DEFAULT_METADATA_TIMEOUT,
            cache,
        })
    }

    /// Sets the per-fetch deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Base URL that download and landing-page links are built from.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the item's metadata, or `None` on any failure.
    #[tracing::instrument(skip(self), fields(archive_id = %identifier))]
    pub async fn get_metadata(&self, identifier: &str) -> Option<Arc<ArchiveMetadata>> {
        let key = identifier.to_string();
        if let Some(hit) = self.cache.get(&key) {
            debug!("metadata cache hit");
            return Some(hit);
        }

        let url = format!("{}/metadata/{}", self.base_url, urlencoding::encode(identifier));
        let response = match self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(error) => {
                warn!(error = %error, timed_out = error.is_timeout(), "metadata request failed");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(status = response.status().as_u16(), "metadata request returned error status");
            return None;
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(error) => {
                warn!(error = %error, "metadata body could not be read");
                return None;
            }
        };

        let Some(metadata) = parse_metadata(&body) else {
            debug!("metadata empty or unparseable");
            return None;
        };
        let metadata = Arc::new(metadata);
        self.cache.insert(key, Arc::clone(&metadata));
        Some(metadata)
    }
}

impl std::fmt::Debug for ArchiveMetadataClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveMetadataClient")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
