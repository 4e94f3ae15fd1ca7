//! In-memory catalog of harvested records.
//!
//! Harvested records are not probed; every hit is flagged `external_only` so
//! clients open them at the source (or through an external token) rather than
//! treating them as verified reads.

pub mod oai;

pub use oai::{DEFAULT_HARVEST_MAX_PAGES, DEFAULT_OAI_ENDPOINT, OaiHarvester, OaiPage};

use std::collections::HashSet;
use std::sync::RwLock;

use serde::Serialize;
use tracing::{debug, warn};

use crate::identity::canonical_key;
use crate::record::CandidateRecord;
use crate::search::relevance::{QueryTerms, score_record};

/// Result count when the caller does not ask for one.
pub const DEFAULT_CATALOG_LIMIT: usize = 20;

/// Upper bound on requested result counts.
pub const MAX_CATALOG_LIMIT: usize = 100;

/// One catalog search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogHit {
    pub key: String,
    #[serde(flatten)]
    pub record: CandidateRecord,
    pub score: f64,
    pub external_only: bool,
}

#[derive(Debug, Default)]
struct CatalogInner {
    entries: Vec<(String, CandidateRecord)>,
    keys: HashSet<String>,
}

/// Thread-safe store of harvested records, deduplicated by canonical key.
#[derive(Debug, Default)]
pub struct Catalog {
    inner: RwLock<CatalogInner>,
}

impl Catalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().map(|inner| inner.entries.len()).unwrap_or_default()
    }

    /// Returns true when nothing has been ingested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds records, skipping keys already present. Returns how many were added.
    pub fn ingest(&self, records: impl IntoIterator<Item = CandidateRecord>) -> usize {
        let Ok(mut inner) = self.inner.write() else {
            warn!("catalog lock poisoned; dropping ingest batch");
            return 0;
        };
        let mut added = 0;
        for record in records {
            let key = canonical_key(&record);
            if inner.keys.insert(key.clone()) {
                inner.entries.push((key, record));
                added += 1;
            }
        }
        debug!(added, total = inner.entries.len(), "catalog ingest");
        added
    }

    /// Ranked search over stored records.
    ///
    /// Only records with a positive relevance score match. `limit` defaults to
    /// [`DEFAULT_CATALOG_LIMIT`] and is clamped to `1..=MAX_CATALOG_LIMIT`.
    #[must_use]
    pub fn search(&self, query: &str, limit: Option<usize>) -> Vec<CatalogHit> {
        let terms = QueryTerms::parse(query);
        if terms.is_empty() {
            return Vec::new();
        }
        let limit = limit.unwrap_or(DEFAULT_CATALOG_LIMIT).clamp(1, MAX_CATALOG_LIMIT);

        let Ok(inner) = self.inner.read() else {
            return Vec::new();
        };
        let mut hits: Vec<CatalogHit> = inner
            .entries
            .iter()
            .filter_map(|(key, record)| {
                let score = score_record(&terms, record);
                (score > 0.0).then(|| CatalogHit {
                    key: key.clone(),
                    record: record.clone(),
                    score,
                    external_only: true,
                })
            })
            .collect();
        drop(inner);

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        hits
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::record::Provider;

    fn sample() -> Catalog {
        let catalog = Catalog::new();
        catalog.ingest([
            CandidateRecord::new(Provider::Doab, "oai:1", "Economics of Development in Africa"),
            CandidateRecord::new(Provider::Doab, "oai:2", "Clinton Cash"),
            CandidateRecord::new(Provider::Doab, "oai:3", "African Economics Today"),
        ]);
        catalog
    }

    #[test]
    fn test_ingest_dedups_by_canonical_key() {
        let catalog = sample();
        let added = catalog.ingest([CandidateRecord::new(Provider::Doab, "oai:1", "Duplicate")]);
        assert_eq!(added, 0);
        assert_eq!(catalog.len(), 3);
    }

    #[test]
    fn test_search_returns_only_matching_hits_flagged_external() {
        let hits = sample().search("economics africa", None);
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.external_only && h.score > 0.0));
        assert_eq!(hits[0].record.title, "Economics of Development in Africa");
    }

    #[test]
    fn test_limit_is_clamped() {
        let catalog = sample();
        assert_eq!(catalog.search("economics", Some(0)).len(), 1);
        assert_eq!(catalog.search("economics", Some(10_000)).len(), 2);
    }

    #[test]
    fn test_blank_query_matches_nothing() {
        assert!(sample().search("  ", None).is_empty());
        assert!(Catalog::new().is_empty());
    }

    #[test]
    fn test_hits_serialize_with_external_only_flag() {
        let hit = &sample().search("clinton", None)[0];
        let json = serde_json::to_value(hit).unwrap();
        assert_eq!(json["external_only"], true);
        assert_eq!(json["title"], "Clinton Cash");
        assert_eq!(json["key"], "doab-oai:2");
    }
}
