//! Multi-source search aggregation.
//!
//! [`Aggregator::search`] fans a query out to every connector concurrently,
//! each under its own deadline. Late sources contribute nothing and are
//! reported as timed out. Results are merged in connector order, deduplicated
//! by canonical key (first seen wins), optionally ranked, and annotated with
//! readability: the first `probe_budget` archive-backed records are checked
//! with bounded concurrency, everything else is `maybe / not_probed`.

pub mod relevance;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::archive::{ReadabilityChecker, ReadabilityResult};
use crate::config::EngineConfig;
use crate::connector::{Connector, build_default_connectors};
use crate::identity::{canonical_key, record_archive_id};
use crate::record::CandidateRecord;

use relevance::{QueryTerms, score_record};

/// Default per-source deadline.
pub const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_millis(8000);

/// Default number of archive-backed results checked per search.
pub const DEFAULT_PROBE_BUDGET: usize = 20;

/// Default number of concurrent readability checks.
pub const DEFAULT_PROBE_CONCURRENCY: usize = 6;

/// Per-request switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    /// 1-based page forwarded to every connector.
    pub page: u32,
    /// Sort by relevance (stable) instead of merge order.
    pub ranked: bool,
    /// Run live probes; without it only metadata analysis runs.
    pub probe: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            page: 1,
            ranked: false,
            probe: true,
        }
    }
}

/// One deduplicated, readability-annotated result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedBook {
    pub key: String,
    #[serde(flatten)]
    pub record: CandidateRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub readability: ReadabilityResult,
}

/// How one source fared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    pub source: String,
    pub count: usize,
    pub timed_out: bool,
}

/// Everything a search produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    pub query: String,
    pub page: u32,
    pub results: Vec<ResolvedBook>,
    pub sources: Vec<SourceReport>,
}

/// Fans queries out to connectors and resolves readability.
pub struct Aggregator {
    connectors: Vec<Arc<dyn Connector>>,
    checker: ReadabilityChecker,
    default_timeout: Duration,
    source_timeouts: HashMap<String, Duration>,
    probe_budget: usize,
    probe_concurrency: usize,
}

impl Aggregator {
    /// Creates an aggregator over `connectors` (merge order = slice order).
    #[must_use]
    pub fn new(connectors: Vec<Arc<dyn Connector>>, checker: ReadabilityChecker) -> Self {
        Self {
            connectors,
            checker,
            default_timeout: DEFAULT_SOURCE_TIMEOUT,
            source_timeouts: HashMap::new(),
            probe_budget: DEFAULT_PROBE_BUDGET,
            probe_concurrency: DEFAULT_PROBE_CONCURRENCY,
        }
    }

    /// Aggregator over the default connector set with deadlines and probe
    /// limits taken from `config`.
    #[must_use]
    pub fn from_config(config: &EngineConfig, checker: ReadabilityChecker) -> Self {
        let mut aggregator = Self::new(build_default_connectors(config), checker)
            .with_source_timeout(config.source_timeout)
            .with_probe_budget(config.probe_budget)
            .with_probe_concurrency(config.probe_concurrency);
        for (source, timeout) in &config.source_timeouts {
            aggregator = aggregator.with_source_timeout_for(source, *timeout);
        }
        aggregator
    }

    /// Sets the deadline applied to sources without an override.
    #[must_use]
    pub fn with_source_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Overrides the deadline for one source.
    #[must_use]
    pub fn with_source_timeout_for(mut self, source: &str, timeout: Duration) -> Self {
        self.source_timeouts.insert(source.to_ascii_lowercase(), timeout);
        self
    }

    /// Sets how many archive-backed results are checked per search.
    #[must_use]
    pub fn with_probe_budget(mut self, budget: usize) -> Self {
        self.probe_budget = budget;
        self
    }

    /// Sets how many checks run at once (at least one).
    #[must_use]
    pub fn with_probe_concurrency(mut self, concurrency: usize) -> Self {
        self.probe_concurrency = concurrency.max(1);
        self
    }

    /// Names of the configured sources, in merge order.
    #[must_use]
    pub fn source_names(&self) -> Vec<&'static str> {
        self.connectors.iter().map(|c| c.name()).collect()
    }

    fn timeout_for(&self, source: &str) -> Duration {
        self.source_timeouts
            .get(source)
            .copied()
            .unwrap_or(self.default_timeout)
    }

    /// Runs one aggregated search. Never fails; degraded sources show up in
    /// [`SearchOutcome::sources`].
    #[tracing::instrument(skip(self), fields(sources = self.connectors.len()))]
    pub async fn search(&self, query: &str, options: SearchOptions) -> SearchOutcome {
        let query = query.trim();
        let page = options.page.max(1);
        if query.is_empty() {
            return SearchOutcome {
                query: String::new(),
                page,
                results: Vec::new(),
                sources: Vec::new(),
            };
        }

        let fetches = self.connectors.iter().map(|connector| {
            let deadline = self.timeout_for(connector.name());
            async move {
                let outcome = tokio::time::timeout(deadline, connector.search(query, page)).await;
                (connector.name(), outcome)
            }
        });
        let per_source = join_all(fetches).await;

        let mut sources = Vec::with_capacity(per_source.len());
        let mut seen = HashSet::new();
        let mut merged: Vec<(String, CandidateRecord)> = Vec::new();
        for (name, outcome) in per_source {
            match outcome {
                Ok(records) => {
                    sources.push(SourceReport {
                        source: name.to_string(),
                        count: records.len(),
                        timed_out: false,
                    });
                    for record in records {
                        let key = canonical_key(&record);
                        if seen.insert(key.clone()) {
                            merged.push((key, record));
                        }
                    }
                }
                Err(_) => {
                    warn!(source = name, "source timed out; dropping its results");
                    sources.push(SourceReport {
                        source: name.to_string(),
                        count: 0,
                        timed_out: true,
                    });
                }
            }
        }

        let mut scored: Vec<(String, CandidateRecord, Option<f64>)> = if options.ranked {
            let terms = QueryTerms::parse(query);
            let mut scored: Vec<_> = merged
                .into_iter()
                .map(|(key, record)| {
                    let score = score_record(&terms, &record);
                    (key, record, Some(score))
                })
                .collect();
            // sort_by is stable: equal scores keep merge order
            scored.sort_by(|a, b| b.2.unwrap_or_default().total_cmp(&a.2.unwrap_or_default()));
            scored
        } else {
            merged.into_iter().map(|(key, record)| (key, record, None)).collect()
        };

        let mut readability = self.check_archive_backed(&scored, options.probe).await;
        let results = scored
            .drain(..)
            .enumerate()
            .map(|(index, (key, record, score))| ResolvedBook {
                key,
                record,
                score,
                readability: readability
                    .remove(&index)
                    .unwrap_or_else(ReadabilityResult::not_probed),
            })
            .collect::<Vec<_>>();

        info!(
            query,
            results = results.len(),
            timed_out = sources.iter().filter(|s| s.timed_out).count(),
            "search complete"
        );
        SearchOutcome {
            query: query.to_string(),
            page,
            results,
            sources,
        }
    }

    async fn check_archive_backed(
        &self,
        records: &[(String, CandidateRecord, Option<f64>)],
        probe: bool,
    ) -> HashMap<usize, ReadabilityResult> {
        let jobs: Vec<(usize, String)> = records
            .iter()
            .enumerate()
            .filter_map(|(index, (_, record, _))| record_archive_id(record).map(|id| (index, id)))
            .take(self.probe_budget)
            .collect();
        debug!(checks = jobs.len(), budget = self.probe_budget, "checking archive-backed results");

        let checker = &self.checker;
        stream::iter(jobs)
            .map(|(index, identifier)| async move { (index, checker.check(&identifier, probe).await) })
            .buffered(self.probe_concurrency)
            .collect::<HashMap<_, _>>()
            .await
    }
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field("sources", &self.source_names())
            .field("default_timeout", &self.default_timeout)
            .field("probe_budget", &self.probe_budget)
            .field("probe_concurrency", &self.probe_concurrency)
            .finish_non_exhaustive()
    }
}
