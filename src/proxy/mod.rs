//! Allowlisted streaming proxy for book files.
//!
//! A request either carries a verified [`ReaderToken`] (its URL is trusted,
//! redirects may stay on the same host or move to an allowlisted one) or a
//! direct URL that must itself be allowlisted (every redirect hop must be
//! too). Redirects are walked by hand and capped at [`MAX_PROXY_REDIRECTS`].
//! `Range` is forwarded so readers can seek without downloading whole files.

mod allowlist;
mod error;

pub use allowlist::{DEFAULT_ALLOWED_DOMAINS, DomainAllowlist};
pub use error::ProxyError;

use std::time::Duration;

use reqwest::header::{CONTENT_RANGE, CONTENT_TYPE, LOCATION, RANGE};
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, warn};
use url::Url;

use crate::http_client::{HttpClientError, HttpTimeouts, RedirectMode, build_http_client};
use crate::record::BookFormat;
use crate::token::ReaderToken;
use crate::user_agent::default_fetch_user_agent;

/// Redirect hops followed before giving up.
pub const MAX_PROXY_REDIRECTS: usize = 5;

/// Default deadline for upstream response headers.
pub const DEFAULT_PROXY_TIMEOUT: Duration = Duration::from_secs(60);

/// What the client asked to stream.
#[derive(Debug, Clone)]
pub enum ProxyTarget {
    /// Verified token payload.
    Token(ReaderToken),
    /// Client-supplied URL, subject to the allowlist.
    Direct {
        /// Requested URL.
        url: String,
        /// Format implied by the route (`/epub` or `/pdf`).
        format: BookFormat,
    },
}

impl ProxyTarget {
    fn format(&self) -> BookFormat {
        match self {
            Self::Token(token) => token.format,
            Self::Direct { format, .. } => *format,
        }
    }
}

/// Upstream response ready to be streamed back.
#[derive(Debug)]
pub struct UpstreamFile {
    /// 200 or 206.
    pub status: u16,
    /// Forced media type.
    pub content_type: String,
    pub content_length: Option<u64>,
    pub content_range: Option<String>,
    /// URL that finally answered, after redirects.
    pub final_url: Url,
    response: Response,
}

impl UpstreamFile {
    /// Hands over the upstream response for body streaming.
    #[must_use]
    pub fn into_response(self) -> Response {
        self.response
    }
}

/// Fetches allowlisted files with manual redirect handling.
#[derive(Clone)]
pub struct StreamingProxy {
    client: Client,
    allowlist: DomainAllowlist,
    timeout: Duration,
}

impl StreamingProxy {
    /// Creates a proxy enforcing `allowlist`.
    ///
    /// # Errors
    ///
    /// Returns [`HttpClientError`] when client construction fails.
    pub fn new(allowlist: DomainAllowlist) -> Result<Self, HttpClientError> {
        let client = build_http_client(
            "proxy",
            default_fetch_user_agent(),
            HttpTimeouts::default(),
            RedirectMode::Manual,
        )?;
        Ok(Self {
            client,
            allowlist,
            timeout: DEFAULT_PROXY_TIMEOUT,
        })
    }

    /// Sets the deadline for upstream response headers.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Allowlist in force.
    #[must_use]
    pub fn allowlist(&self) -> &DomainAllowlist {
        &self.allowlist
    }

    /// Opens the upstream file, following redirects under the target's rules.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError`] for rejected URLs or redirects and for upstream
    /// failures; see [`ProxyError::status_code`] for the HTTP mapping.
    #[tracing::instrument(skip(self, target), fields(mode = target_mode(target)))]
    pub async fn open(&self, target: &ProxyTarget, range: Option<&str>) -> Result<UpstreamFile, ProxyError> {
        let mut current = match target {
            ProxyTarget::Token(token) => Url::parse(&token.direct_url)
                .ok()
                .filter(|u| matches!(u.scheme(), "http" | "https"))
                .ok_or_else(|| ProxyError::bad_request("token carries an unusable URL"))?,
            ProxyTarget::Direct { url, .. } => self.allowlist.check(url)?,
        };

        for hop in 0..=MAX_PROXY_REDIRECTS {
            let response = self.send(&current, range).await?;
            let status = response.status();

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or(ProxyError::UpstreamStatus {
                        status: status.as_u16(),
                    })?;
                if hop == MAX_PROXY_REDIRECTS {
                    break;
                }
                let next = current
                    .join(location)
                    .map_err(|_| ProxyError::RedirectNotAllowed {
                        location: location.to_string(),
                    })?;
                if !self.redirect_allowed(target, &current, &next) {
                    warn!(from = %current, to = %next, "rejected upstream redirect");
                    return Err(ProxyError::RedirectNotAllowed {
                        location: next.to_string(),
                    });
                }
                debug!(hop, to = %next, "following upstream redirect");
                current = next;
                continue;
            }

            return match status {
                StatusCode::OK | StatusCode::PARTIAL_CONTENT => Ok(self.upstream_file(target, current, response)),
                StatusCode::NOT_FOUND => Err(ProxyError::NotFound),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ProxyError::Forbidden {
                    status: status.as_u16(),
                }),
                other => Err(ProxyError::UpstreamStatus {
                    status: other.as_u16(),
                }),
            };
        }

        Err(ProxyError::TooManyRedirects {
            hops: MAX_PROXY_REDIRECTS,
        })
    }

    async fn send(&self, url: &Url, range: Option<&str>) -> Result<Response, ProxyError> {
        let mut request = self.client.get(url.as_str());
        if let Some(range) = range {
            request = request.header(RANGE, range);
        }
        match tokio::time::timeout(self.timeout, request.send()).await {
            Err(_) => Err(ProxyError::Timeout),
            Ok(Err(error)) if error.is_timeout() => Err(ProxyError::Timeout),
            Ok(Err(error)) => Err(ProxyError::Network {
                message: error.to_string(),
            }),
            Ok(Ok(response)) => Ok(response),
        }
    }

    fn redirect_allowed(&self, target: &ProxyTarget, current: &Url, next: &Url) -> bool {
        if !matches!(next.scheme(), "http" | "https") {
            return false;
        }
        match target {
            ProxyTarget::Token(_) => {
                next.host_str().is_some_and(|h| Some(h) == current.host_str())
                    || self.allowlist.is_allowed_url(next)
            }
            ProxyTarget::Direct { .. } => self.allowlist.is_allowed_url(next),
        }
    }

    fn upstream_file(&self, target: &ProxyTarget, final_url: Url, response: Response) -> UpstreamFile {
        let headers = response.headers();
        let upstream_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let content_type = match target.format() {
            BookFormat::Unknown => upstream_type
                .unwrap_or_else(|| BookFormat::Unknown.media_type().to_string()),
            known => known.media_type().to_string(),
        };
        let content_range = headers
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        UpstreamFile {
            status: response.status().as_u16(),
            content_type,
            content_length: response.content_length(),
            content_range,
            final_url,
            response,
        }
    }
}

impl std::fmt::Debug for StreamingProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingProxy")
            .field("allowlist", &self.allowlist)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn target_mode(target: &ProxyTarget) -> &'static str {
    match target {
        ProxyTarget::Token(_) => "token",
        ProxyTarget::Direct { .. } => "direct",
    }
}
