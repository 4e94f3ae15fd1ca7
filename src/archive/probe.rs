//! Live reachability probe for archive download URLs.
//!
//! A probe sends `HEAD` with `Range: bytes=0-0` and walks the redirect chain
//! by hand so a hop into a lending flow can be caught before it is followed.
//! The probe never fails: every transport problem becomes `maybe`.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, LOCATION, RANGE};
use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;

use crate::cache::TtlCache;
use crate::http_client::{HttpClientError, HttpTimeouts, RedirectMode, build_http_client};
use crate::record::{Readable, ReadabilityReason};
use crate::user_agent::default_fetch_user_agent;

use super::metadata::DEFAULT_ARCHIVE_BASE_URL;

/// Default deadline for a whole probe, redirects included.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(4000);

/// Redirects followed before the probe gives up with `maybe`.
pub const MAX_REDIRECT_HOPS: usize = 5;

const BORROW_LOCATION_MARKERS: [&str; 3] = ["borrow", "lending", "/loan"];

/// Verdict of one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub readable: Readable,
    pub reason: ReadabilityReason,
}

impl ProbeOutcome {
    const fn new(readable: Readable, reason: ReadabilityReason) -> Self {
        Self { readable, reason }
    }

    /// True/false answers are cached; `maybe` is retried next time.
    #[must_use]
    pub fn is_conclusive(self) -> bool {
        self.readable != Readable::Maybe
    }
}

/// Probes `/download/<id>/<file>` URLs with a TTL cache keyed by `id/file`.
#[derive(Clone)]
pub struct Prober {
    client: Client,
    base_url: String,
    timeout: Duration,
    cache: Arc<TtlCache<String, ProbeOutcome>>,
}

impl Prober {
    /// Creates a prober against archive.org.
    ///
    /// # Errors
    ///
    /// Returns [`HttpClientError`] when client construction fails.
    pub fn new(cache: Arc<TtlCache<String, ProbeOutcome>>) -> Result<Self, HttpClientError> {
        Self::with_base_url(DEFAULT_ARCHIVE_BASE_URL, cache)
    }

    /// Creates a prober with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`HttpClientError`] when client construction fails.
    pub fn with_base_url(
        base_url: impl Into<String>,
        cache: Arc<TtlCache<String, ProbeOutcome>>,
    ) -> Result<Self, HttpClientError> {
        let client = build_http_client(
            "archive-probe",
            default_fetch_user_agent(),
            HttpTimeouts::default(),
            RedirectMode::Manual,
        )?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: DEFAULT_PROBE_TIMEOUT,
            cache,
        })
    }

    /// Sets the whole-probe deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the download URL for a file inside an item.
    #[must_use]
    pub fn download_url(&self, identifier: &str, filename: &str) -> String {
        download_url(&self.base_url, identifier, filename)
    }

    /// Probes one file, consulting the cache first.
    #[tracing::instrument(skip(self), fields(archive_id = %identifier, file = %filename))]
    pub async fn probe(&self, identifier: &str, filename: &str) -> ProbeOutcome {
        let key = format!("{identifier}/{filename}");
        if let Some(hit) = self.cache.get(&key) {
            debug!(?hit, "probe cache hit");
            return hit;
        }

        let outcome = self.probe_url(&self.download_url(identifier, filename)).await;
        if outcome.is_conclusive() {
            self.cache.insert(key, outcome);
        }
        debug!(readable = ?outcome.readable, reason = ?outcome.reason, "probe finished");
        outcome
    }

    /// Probes an arbitrary URL without caching.
    pub async fn probe_url(&self, start: &str) -> ProbeOutcome {
        match tokio::time::timeout(self.timeout, self.walk(start)).await {
            Ok(outcome) => outcome,
            Err(_) => ProbeOutcome::new(Readable::Maybe, ReadabilityReason::Timeout),
        }
    }

    async fn walk(&self, start: &str) -> ProbeOutcome {
        let Ok(mut current) = Url::parse(start) else {
            return ProbeOutcome::new(Readable::Maybe, ReadabilityReason::ProbeInconclusive);
        };

        for hop in 0..=MAX_REDIRECT_HOPS {
            let response = match self
                .client
                .head(current.as_str())
                .header(RANGE, "bytes=0-0")
                .send()
                .await
            {
                Ok(response) => response,
                Err(error) if error.is_timeout() => {
                    return ProbeOutcome::new(Readable::Maybe, ReadabilityReason::Timeout);
                }
                Err(error) => {
                    debug!(error = %error, "probe transport failure");
                    return ProbeOutcome::new(Readable::Maybe, ReadabilityReason::ProbeInconclusive);
                }
            };

            let status = response.status();
            if status.is_redirection() {
                let Some(location) = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                else {
                    return ProbeOutcome::new(Readable::Maybe, ReadabilityReason::ProbeInconclusive);
                };
                if is_borrow_location(location) {
                    return ProbeOutcome::new(Readable::False, ReadabilityReason::BorrowRedirect);
                }
                if hop == MAX_REDIRECT_HOPS {
                    break;
                }
                let Ok(next) = current.join(location) else {
                    return ProbeOutcome::new(Readable::Maybe, ReadabilityReason::ProbeInconclusive);
                };
                debug!(hop, location = %next, "probe following redirect");
                current = next;
                continue;
            }

            return match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    ProbeOutcome::new(Readable::False, ReadabilityReason::Forbidden)
                }
                StatusCode::NOT_FOUND => ProbeOutcome::new(Readable::False, ReadabilityReason::NotFound),
                StatusCode::OK | StatusCode::PARTIAL_CONTENT => {
                    let content_type = response
                        .headers()
                        .get(CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default();
                    classify_content_type(content_type)
                }
                _ => ProbeOutcome::new(Readable::Maybe, ReadabilityReason::ProbeInconclusive),
            };
        }

        ProbeOutcome::new(Readable::Maybe, ReadabilityReason::TooManyRedirects)
    }
}

impl std::fmt::Debug for Prober {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prober")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// `<base>/download/<id>/<file>` with the file path percent-encoded per segment.
#[must_use]
pub fn download_url(base_url: &str, identifier: &str, filename: &str) -> String {
    let file_path = filename
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    format!(
        "{}/download/{}/{file_path}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(identifier)
    )
}

fn is_borrow_location(location: &str) -> bool {
    let lower = location.to_ascii_lowercase();
    BORROW_LOCATION_MARKERS.iter().any(|m| lower.contains(m))
}

fn classify_content_type(content_type: &str) -> ProbeOutcome {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if mime == "text/html" || mime == "application/xhtml+xml" {
        ProbeOutcome::new(Readable::False, ReadabilityReason::HtmlInterstitial)
    } else {
        // epub, pdf, octet-stream, zip, and anything else that is not a page
        ProbeOutcome::new(Readable::True, ReadabilityReason::Ok)
    }
}
