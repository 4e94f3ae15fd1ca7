//! Shared HTTP client construction policy.
//!
//! Connectors, the archive metadata client, the live prober, and the
//! streaming proxy all build their `reqwest` clients here so timeout,
//! user-agent, compression, and proxy compatibility stay consistent.
//! Probe and proxy clients disable automatic redirects: they walk redirect
//! chains themselves so every hop can be inspected.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use reqwest::redirect::Policy;
use reqwest::{Client, ClientBuilder, Proxy};
use thiserror::Error;
use tracing::warn;

/// Default connect timeout for catalog and file requests.
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default idle read timeout.
pub const READ_TIMEOUT_SECS: u64 = 30;

/// Connect and read timeouts applied at client level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    /// TCP/TLS connect timeout.
    pub connect: Duration,
    /// Idle timeout between reads; callers set whole-request deadlines per request.
    pub read: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read: Duration::from_secs(READ_TIMEOUT_SECS),
        }
    }
}

impl HttpTimeouts {
    /// Creates timeouts from explicit durations.
    #[must_use]
    pub fn new(connect: Duration, read: Duration) -> Self {
        Self { connect, read }
    }
}

/// How the client treats 3xx responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectMode {
    /// Let reqwest follow redirects (catalog APIs).
    Follow,
    /// Return 3xx responses to the caller (probe and proxy).
    Manual,
}

/// Client construction failure.
#[derive(Debug, Clone, Error)]
pub enum HttpClientError {
    /// Builder rejected the configuration.
    #[error("HTTP client construction failed for {purpose}: {message}")]
    Build {
        /// Which component was building the client.
        purpose: String,
        /// Builder error message.
        message: String,
    },

    /// Builder panicked twice (system proxy lookup and env-proxy fallback).
    #[error("HTTP client construction panicked for {purpose}")]
    Panic {
        /// Which component was building the client.
        purpose: String,
    },
}

/// Builds an HTTP client using shared project policy.
///
/// `purpose` is used only for error messages and logging.
///
/// # Errors
///
/// Returns [`HttpClientError`] when client construction fails.
pub fn build_http_client(
    purpose: &str,
    user_agent: impl Into<String>,
    timeouts: HttpTimeouts,
    redirects: RedirectMode,
) -> Result<Client, HttpClientError> {
    let user_agent = user_agent.into();

    match try_build_client(&user_agent, timeouts, redirects, false) {
        Ok(client) => Ok(client),
        Err(BuildClientFailure::Panic) => {
            // Some restricted sandbox environments panic when querying system
            // proxy settings. The fallback keeps env-proxy support.
            warn!(
                purpose,
                "HTTP client hit system proxy panic; using env-proxy fallback builder"
            );
            match try_build_client(&user_agent, timeouts, redirects, true) {
                Ok(client) => Ok(client),
                Err(BuildClientFailure::Panic) => Err(HttpClientError::Panic {
                    purpose: purpose.to_string(),
                }),
                Err(BuildClientFailure::Build(error)) => Err(HttpClientError::Build {
                    purpose: purpose.to_string(),
                    message: error.to_string(),
                }),
            }
        }
        Err(BuildClientFailure::Build(error)) => Err(HttpClientError::Build {
            purpose: purpose.to_string(),
            message: error.to_string(),
        }),
    }
}

enum BuildClientFailure {
    Panic,
    Build(reqwest::Error),
}

fn try_build_client(
    user_agent: &str,
    timeouts: HttpTimeouts,
    redirects: RedirectMode,
    disable_system_proxy_lookup: bool,
) -> Result<Client, BuildClientFailure> {
    let user_agent = user_agent.to_string();
    catch_unwind(AssertUnwindSafe(move || {
        let mut builder = base_builder(user_agent, timeouts, redirects);
        if disable_system_proxy_lookup {
            builder = apply_env_proxy_fallback(builder.no_proxy());
        }
        builder.build().map_err(BuildClientFailure::Build)
    }))
    .map_err(|_| BuildClientFailure::Panic)?
}

fn base_builder(user_agent: String, timeouts: HttpTimeouts, redirects: RedirectMode) -> ClientBuilder {
    let policy = match redirects {
        RedirectMode::Follow => Policy::limited(10),
        RedirectMode::Manual => Policy::none(),
    };
    // File hosts get bytes and ranges untouched, so only catalog clients
    // negotiate compression.
    Client::builder()
        .connect_timeout(timeouts.connect)
        .read_timeout(timeouts.read)
        .user_agent(user_agent)
        .redirect(policy)
        .gzip(redirects == RedirectMode::Follow)
}

fn apply_env_proxy_fallback(mut builder: ClientBuilder) -> ClientBuilder {
    if let Some(proxy) = env_proxy_for_scheme("https")
        && let Ok(resolved) = Proxy::https(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    if let Some(proxy) = env_proxy_for_scheme("http")
        && let Ok(resolved) = Proxy::http(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    builder
}

fn env_proxy_for_scheme(scheme: &str) -> Option<String> {
    match scheme {
        "https" => find_first_proxy_var(&["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"]),
        "http" => find_first_proxy_var(&["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"]),
        _ => None,
    }
}

fn find_first_proxy_var(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_build_http_client_succeeds_for_both_redirect_modes() {
        for mode in [RedirectMode::Follow, RedirectMode::Manual] {
            let client = build_http_client("test", "bookloft-test", HttpTimeouts::default(), mode);
            assert!(client.is_ok(), "client build failed for {mode:?}");
        }
    }

    #[test]
    fn test_default_timeouts() {
        let timeouts = HttpTimeouts::default();
        assert_eq!(timeouts.connect, Duration::from_secs(CONNECT_TIMEOUT_SECS));
        assert_eq!(timeouts.read, Duration::from_secs(READ_TIMEOUT_SECS));
    }

    #[test]
    fn test_unknown_scheme_has_no_proxy() {
        assert_eq!(env_proxy_for_scheme("ftp"), None);
    }
}
