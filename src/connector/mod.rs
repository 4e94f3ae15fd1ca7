//! Per-source catalog connectors.
//!
//! Each connector turns one upstream catalog's search API into normalized
//! [`CandidateRecord`]s. Raw payloads are modelled as distinct serde types per
//! source and mapped through a small adapter function; nothing upstream-shaped
//! escapes this module.
//!
//! # Architecture
//!
//! - [`Connector`] - Async trait every source implements
//! - [`GutendexConnector`] - Project Gutenberg via Gutendex
//! - [`OpenLibraryConnector`] - Open Library search (public scans only)
//! - [`ArchiveConnector`] - archive.org advanced search over text items
//! - [`OapenConnector`] / [`DoabConnector`] - DSpace REST catalogs
//! - [`OpenStaxConnector`] - bundled OpenStax catalog
//! - [`LocConnector`] - Library of Congress books with PDF resources
//!
//! # Example
//!
//! ```no_run
//! use bookloft_core::connector::{Connector, GutendexConnector};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let gutendex = GutendexConnector::new()?;
//! for record in gutendex.search("frankenstein", 1).await {
//!     println!("{} ({:?})", record.title, record.direct_url);
//! }
//! # Ok(())
//! # }
//! ```

mod archive;
mod client;
mod doab;
mod dspace;
mod error;
mod gutendex;
mod loc;
mod oapen;
mod openlibrary;
mod openstax;
pub(crate) mod utils;

pub use archive::ArchiveConnector;
pub use client::DEFAULT_REQUEST_TIMEOUT;
pub(crate) use client::SourceClient;
pub use doab::DoabConnector;
pub use error::ConnectorError;
pub use gutendex::GutendexConnector;
pub use loc::LocConnector;
pub use oapen::OapenConnector;
pub use openlibrary::OpenLibraryConnector;
pub use openstax::OpenStaxConnector;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::config::EngineConfig;
use crate::record::{CandidateRecord, Provider};

/// Trait that all catalog connectors implement.
///
/// Implementors provide [`try_search`](Connector::try_search); callers use
/// [`search`](Connector::search), which never fails outward.
///
/// # Object Safety
///
/// This trait uses `async_trait` so the aggregator can hold
/// `Arc<dyn Connector>` values.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Short stable name used in logs, per-source timeouts, and reports.
    fn name(&self) -> &'static str;

    /// Provider stamped on every record this connector returns.
    fn provider(&self) -> Provider;

    /// Queries the upstream catalog.
    async fn try_search(&self, query: &str, page: u32)
    -> Result<Vec<CandidateRecord>, ConnectorError>;

    /// Queries the upstream catalog, degrading any failure to an empty list.
    async fn search(&self, query: &str, page: u32) -> Vec<CandidateRecord> {
        match self.try_search(query, page).await {
            Ok(records) => records,
            Err(error) => {
                warn!(source = self.name(), error = %error, "connector search failed; returning no results");
                Vec::new()
            }
        }
    }
}

/// First-attempt timeout that leaves room for the doubled retry inside the
/// aggregator's per-source deadline.
#[must_use]
pub fn request_timeout_for(source_deadline: Duration) -> Duration {
    source_deadline / 3
}

/// Builds the default connector set in merge order.
///
/// Connectors whose HTTP client cannot be built are skipped with a warning.
#[must_use]
pub fn build_default_connectors(config: &EngineConfig) -> Vec<Arc<dyn Connector>> {
    let timeout = |name: &str| request_timeout_for(config.source_timeout_for(name));
    let mut connectors: Vec<Arc<dyn Connector>> = Vec::new();

    let mut push = |name: &'static str, built: Result<Arc<dyn Connector>, ConnectorError>| match built {
        Ok(connector) => connectors.push(connector),
        Err(error) => warn!(
            source = name,
            error = %error,
            "connector unavailable; continuing with remaining sources"
        ),
    };

    push(
        "gutendex",
        GutendexConnector::new().map(|c| Arc::new(c.with_request_timeout(timeout("gutendex"))) as _),
    );
    push(
        "openlibrary",
        OpenLibraryConnector::new()
            .map(|c| Arc::new(c.with_request_timeout(timeout("openlibrary"))) as _),
    );
    push(
        "archive",
        ArchiveConnector::new().map(|c| Arc::new(c.with_request_timeout(timeout("archive"))) as _),
    );
    push(
        "oapen",
        OapenConnector::new().map(|c| Arc::new(c.with_request_timeout(timeout("oapen"))) as _),
    );
    push(
        "doab",
        DoabConnector::new().map(|c| Arc::new(c.with_request_timeout(timeout("doab"))) as _),
    );
    push("openstax", Ok(Arc::new(OpenStaxConnector::new())));
    push(
        "loc",
        LocConnector::new().map(|c| Arc::new(c.with_request_timeout(timeout("loc"))) as _),
    );

    connectors
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct Failing;

    #[async_trait]
    impl Connector for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn provider(&self) -> Provider {
            Provider::Doab
        }

        async fn try_search(&self, _query: &str, _page: u32) -> Result<Vec<CandidateRecord>, ConnectorError> {
            Err(ConnectorError::http_status("failing", "https://x", 500))
        }
    }

    #[tokio::test]
    async fn test_search_degrades_errors_to_empty_list() {
        assert!(Failing.search("anything", 1).await.is_empty());
    }

    #[test]
    fn test_default_connectors_in_merge_order() {
        let config = EngineConfig::default();
        let names: Vec<&str> = build_default_connectors(&config)
            .iter()
            .map(|c| c.name())
            .collect();
        assert_eq!(
            names,
            ["gutendex", "openlibrary", "archive", "oapen", "doab", "openstax", "loc"]
        );
    }

    #[test]
    fn test_request_timeout_leaves_room_for_retry() {
        let deadline = Duration::from_millis(9000);
        let first = request_timeout_for(deadline);
        assert!(first + first * 2 <= deadline);
    }
}
