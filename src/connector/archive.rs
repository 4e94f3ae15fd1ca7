//! Internet Archive advanced-search connector.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::identity::is_valid_archive_id;
use crate::record::{CandidateRecord, Provider};

use super::client::SourceClient;
use super::utils::{OneOrMany, extract_year, join_authors};
use super::{Connector, ConnectorError};

const DEFAULT_BASE_URL: &str = "https://archive.org";
const PAGE_SIZE: u32 = 30;
const RESULT_FIELDS: [&str; 7] = [
    "identifier",
    "title",
    "creator",
    "year",
    "date",
    "language",
    "subject",
];

// ==================== Advanced Search Response Types ====================

#[derive(Debug, Deserialize)]
pub(crate) struct AdvancedSearch {
    pub response: AdvancedSearchBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AdvancedSearchBody {
    #[serde(default)]
    pub docs: Vec<ArchiveDoc>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ArchiveDoc {
    pub identifier: String,
    pub title: Option<OneOrMany<String>>,
    pub creator: Option<OneOrMany<String>>,
    /// Number or string depending on the item.
    pub year: Option<serde_json::Value>,
    pub date: Option<String>,
    pub language: Option<OneOrMany<String>>,
    pub subject: Option<OneOrMany<String>>,
}

// ==================== ArchiveConnector ====================

/// Searches archive.org text items.
///
/// The item identifier is the archive id, so every result is archive-backed
/// and goes through metadata analysis and probing in the aggregator.
#[derive(Debug, Clone)]
pub struct ArchiveConnector {
    http: SourceClient,
}

impl ArchiveConnector {
    /// Creates a connector against archive.org.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError`] when HTTP client construction fails.
    pub fn new() -> Result<Self, ConnectorError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Creates a connector with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError`] when HTTP client construction fails.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, ConnectorError> {
        Ok(Self {
            http: SourceClient::new("archive", base_url)?,
        })
    }

    /// Sets the first-attempt request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.http.set_request_timeout(timeout);
        self
    }
}

#[async_trait]
impl Connector for ArchiveConnector {
    fn name(&self) -> &'static str {
        "archive"
    }

    fn provider(&self) -> Provider {
        Provider::InternetArchive
    }

    #[tracing::instrument(skip(self), fields(source = "archive"))]
    async fn try_search(&self, query: &str, page: u32) -> Result<Vec<CandidateRecord>, ConnectorError> {
        let q = format!("({query}) AND mediatype:texts");
        let fields: String = RESULT_FIELDS
            .iter()
            .map(|f| format!("&fl[]={f}"))
            .collect();
        let url = self.http.url(&format!(
            "/advancedsearch.php?q={}{fields}&rows={PAGE_SIZE}&page={}&output=json",
            urlencoding::encode(&q),
            page.max(1)
        ));
        let body: AdvancedSearch = self.http.get_json(&url).await?;
        debug!(count = body.response.docs.len(), "archive docs");
        let base_url = self.http.base_url().to_string();
        Ok(body
            .response
            .docs
            .into_iter()
            .filter_map(|doc| map_doc(doc, &base_url))
            .collect())
    }
}

// ==================== Adapter ====================

fn map_doc(doc: ArchiveDoc, base_url: &str) -> Option<CandidateRecord> {
    let identifier = doc.identifier.trim().to_string();
    if !is_valid_archive_id(&identifier) {
        return None;
    }
    let title = doc
        .title
        .as_ref()
        .and_then(OneOrMany::first)
        .map_or_else(|| identifier.clone(), |t| t.trim().to_string());

    let mut record = CandidateRecord::new(Provider::InternetArchive, identifier.clone(), title);
    record.author = doc.creator.map(OneOrMany::into_vec).and_then(join_authors);
    record.year = doc
        .year
        .as_ref()
        .and_then(year_from_value)
        .or_else(|| doc.date.as_deref().and_then(extract_year));
    record.language = doc.language.as_ref().and_then(OneOrMany::first).cloned();
    record.subjects = doc.subject.map(OneOrMany::into_vec).unwrap_or_default();
    record.cover_url = Some(format!("{base_url}/services/img/{identifier}"));
    record.source_url = Some(format!("{base_url}/details/{identifier}"));
    record.archive_id = Some(identifier);
    Some(record)
}

fn year_from_value(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::String(s) => extract_year(s),
        serde_json::Value::Array(items) => items.first().and_then(year_from_value),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn doc(value: serde_json::Value) -> ArchiveDoc {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_map_doc_handles_string_or_array_fields() {
        let record = map_doc(
            doc(serde_json::json!({
                "identifier": "economicsinafric0000unse",
                "title": "Economics in Africa",
                "creator": ["Smith, J.", "Doe, A."],
                "year": 1999,
                "language": "eng",
                "subject": "Economics"
            })),
            "https://archive.org",
        )
        .unwrap();
        assert_eq!(record.archive_id.as_deref(), Some("economicsinafric0000unse"));
        assert_eq!(record.author.as_deref(), Some("Smith, J., Doe, A."));
        assert_eq!(record.year.as_deref(), Some("1999"));
        assert_eq!(record.subjects, vec!["Economics".to_string()]);
        assert_eq!(
            record.source_url.as_deref(),
            Some("https://archive.org/details/economicsinafric0000unse")
        );
    }

    #[test]
    fn test_map_doc_rejects_numeric_identifier() {
        assert!(map_doc(doc(serde_json::json!({"identifier": "12345"})), "https://archive.org").is_none());
    }

    #[test]
    fn test_map_doc_year_from_date_string() {
        let record = map_doc(
            doc(serde_json::json!({"identifier": "abc", "date": "1818-01-01T00:00:00Z"})),
            "https://archive.org",
        )
        .unwrap();
        assert_eq!(record.year.as_deref(), Some("1818"));
        assert_eq!(record.title, "abc");
    }
}
