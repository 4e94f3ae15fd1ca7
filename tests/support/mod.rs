//! Shared helpers for integration tests.

#![allow(dead_code)]

pub mod socket_guard;

use std::sync::Arc;
use std::time::Duration;

use bookloft_core::archive::{ArchiveMetadataClient, Prober, ReadabilityChecker, SizeLimits};
use bookloft_core::cache::TtlCache;

/// Readability checker whose metadata and download hosts are `base_url`,
/// with fresh caches.
pub fn checker_for(base_url: &str) -> ReadabilityChecker {
    let metadata = ArchiveMetadataClient::with_base_url(
        base_url,
        Arc::new(TtlCache::new(Duration::from_secs(60), 64)),
    )
    .unwrap()
    .with_timeout(Duration::from_secs(2));
    let prober = Prober::with_base_url(base_url, Arc::new(TtlCache::new(Duration::from_secs(60), 64)))
        .unwrap()
        .with_timeout(Duration::from_millis(500));
    ReadabilityChecker::new(metadata, prober, SizeLimits::default())
}
