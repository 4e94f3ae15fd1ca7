//! Composes metadata, file analysis, and probing into one verdict.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::cache::TtlCache;
use crate::config::EngineConfig;
use crate::http_client::HttpClientError;
use crate::record::{BookFormat, Readable, ReadabilityReason};

use super::analyze::{SizeLimits, analyze_files, borrow_required};
use super::metadata::ArchiveMetadataClient;
use super::probe::{Prober, download_url};

/// Readability verdict for one archive item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadabilityResult {
    pub readable: Readable,
    pub reason: ReadabilityReason,
    pub best_file: Option<String>,
    pub format: BookFormat,
    pub best_pdf: Option<String>,
    /// Resolved download URL. Server-side only; clients reach the file through a token.
    #[serde(skip_serializing)]
    pub direct_url: Option<String>,
    pub all_files: Vec<String>,
    pub borrow_required: bool,
    pub encrypted_only: bool,
}

impl ReadabilityResult {
    /// A verdict with no file information.
    #[must_use]
    pub fn unverified(readable: Readable, reason: ReadabilityReason) -> Self {
        Self {
            readable,
            reason,
            best_file: None,
            format: BookFormat::Unknown,
            best_pdf: None,
            direct_url: None,
            all_files: Vec::new(),
            borrow_required: false,
            encrypted_only: false,
        }
    }

    /// Verdict for records that are not archive-backed or fell outside the
    /// probe budget.
    #[must_use]
    pub fn not_probed() -> Self {
        Self::unverified(Readable::Maybe, ReadabilityReason::NotProbed)
    }

    /// True when the item may be offered through the reader.
    #[must_use]
    pub fn is_offerable(&self) -> bool {
        self.readable.is_not_false() && !self.borrow_required && self.best_file.is_some()
    }
}

/// Decides whether an archive item is openly readable.
#[derive(Debug, Clone)]
pub struct ReadabilityChecker {
    metadata: ArchiveMetadataClient,
    prober: Prober,
    limits: SizeLimits,
}

impl ReadabilityChecker {
    /// Creates a checker from its injected collaborators.
    #[must_use]
    pub fn new(metadata: ArchiveMetadataClient, prober: Prober, limits: SizeLimits) -> Self {
        Self {
            metadata,
            prober,
            limits,
        }
    }

    /// Production checker with fresh caches sized and timed by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`HttpClientError`] when an HTTP client cannot be built.
    pub fn from_config(config: &EngineConfig) -> Result<Self, HttpClientError> {
        let metadata = ArchiveMetadataClient::new(Arc::new(TtlCache::new(config.cache_ttl, config.cache_max_entries)))?
            .with_timeout(config.metadata_timeout);
        let prober = Prober::new(Arc::new(TtlCache::new(config.cache_ttl, config.cache_max_entries)))?
            .with_timeout(config.probe_timeout);
        Ok(Self::new(metadata, prober, config.size_limits()))
    }

    /// Download URL of `filename` inside an item, on the metadata host.
    #[must_use]
    pub fn download_url(&self, identifier: &str, filename: &str) -> String {
        download_url(self.metadata.base_url(), identifier, filename)
    }

    /// Size limits applied during analysis.
    #[must_use]
    pub fn limits(&self) -> SizeLimits {
        self.limits
    }

    /// Checks one item. With `probe` false the network probe is skipped and
    /// an otherwise-usable file is reported as `maybe / not_probed`.
    #[tracing::instrument(skip(self), fields(archive_id = %identifier))]
    pub async fn check(&self, identifier: &str, probe: bool) -> ReadabilityResult {
        let Some(metadata) = self.metadata.get_metadata(identifier).await else {
            return ReadabilityResult::unverified(Readable::Maybe, ReadabilityReason::MetadataUnavailable);
        };

        let analysis = analyze_files(&metadata, self.limits);
        let borrow = borrow_required(&metadata);
        let best_file = analysis.best_file.as_ref().map(|f| f.name.clone());

        let mut result = ReadabilityResult {
            readable: Readable::Maybe,
            reason: ReadabilityReason::NotProbed,
            direct_url: best_file
                .as_deref()
                .map(|name| download_url(self.metadata.base_url(), identifier, name)),
            best_file,
            format: analysis.best_format,
            best_pdf: analysis.best_pdf.as_ref().map(|f| f.name.clone()),
            all_files: analysis.all_files.iter().map(|f| f.name.clone()).collect(),
            borrow_required: borrow,
            encrypted_only: analysis.encrypted_only,
        };

        let verdict = if metadata.is_dark {
            Some((Readable::False, ReadabilityReason::NoUsableFiles))
        } else if analysis.encrypted_only {
            Some((Readable::False, ReadabilityReason::EncryptedOnly))
        } else if borrow {
            Some((Readable::False, ReadabilityReason::BorrowRequired))
        } else if result.best_file.is_none() {
            Some((Readable::False, ReadabilityReason::NoUsableFiles))
        } else if analysis.too_large {
            Some((Readable::Maybe, ReadabilityReason::TooLarge))
        } else if !probe {
            Some((Readable::Maybe, ReadabilityReason::NotProbed))
        } else {
            None
        };

        if let Some((readable, reason)) = verdict {
            debug!(?readable, ?reason, "readability decided without probe");
            result.readable = readable;
            result.reason = reason;
            if readable == Readable::False {
                result.direct_url = None;
            }
            return result;
        }

        if let Some(file) = result.best_file.as_deref() {
            let outcome = self.prober.probe(identifier, file).await;
            result.readable = outcome.readable;
            result.reason = outcome.reason;
        }
        result
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_result_serializes_camel_case() {
        let mut result = ReadabilityResult::not_probed();
        result.best_file = Some("a.epub".into());
        result.direct_url = Some("https://archive.org/download/a/a.epub".into());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["readable"], "maybe");
        assert_eq!(json["reason"], "not_probed");
        assert_eq!(json["bestFile"], "a.epub");
        assert!(json.get("borrowRequired").is_some());
        assert!(json.get("encryptedOnly").is_some());
        assert!(json.get("allFiles").is_some());
        assert!(json.get("directUrl").is_none());
    }

    #[test]
    fn test_is_offerable() {
        let mut result = ReadabilityResult::not_probed();
        assert!(!result.is_offerable());
        result.best_file = Some("a.epub".into());
        assert!(result.is_offerable());
        result.borrow_required = true;
        assert!(!result.is_offerable());
    }
}
