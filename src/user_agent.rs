//! Shared User-Agent strings for connector, probe, and proxy HTTP clients.
//!
//! Single source for project URL and UA format so catalog and file traffic
//! stay consistent and easy to update (good citizenship; RFC 9308).

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/bookloft";

/// Default User-Agent for catalog connector requests.
#[must_use]
pub(crate) fn default_connector_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("bookloft/{version} (open-library-aggregator; +{PROJECT_UA_URL})")
}

/// Default User-Agent for probe and proxy requests against file hosts.
#[must_use]
pub(crate) fn default_fetch_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("bookloft/{version} (open-library-reader; +{PROJECT_UA_URL})")
}
