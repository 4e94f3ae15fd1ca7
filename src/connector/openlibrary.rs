//! Open Library search connector.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::identity::is_valid_archive_id;
use crate::record::{CandidateRecord, Provider};

use super::client::SourceClient;
use super::utils::join_authors;
use super::{Connector, ConnectorError};

const DEFAULT_BASE_URL: &str = "https://openlibrary.org";
const COVERS_BASE_URL: &str = "https://covers.openlibrary.org/b/id";
const SEARCH_FIELDS: &str = "key,title,author_name,first_publish_year,cover_i,ia,public_scan_b,has_fulltext,ebook_access,language,subject";
const PAGE_SIZE: u32 = 20;

// ==================== Open Library API Response Types ====================

#[derive(Debug, Deserialize)]
pub(crate) struct OpenLibrarySearch {
    #[serde(default)]
    pub docs: Vec<OpenLibraryDoc>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenLibraryDoc {
    pub key: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author_name: Vec<String>,
    pub first_publish_year: Option<i32>,
    pub cover_i: Option<i64>,
    #[serde(default)]
    pub ia: Vec<String>,
    pub public_scan_b: Option<bool>,
    pub has_fulltext: Option<bool>,
    pub ebook_access: Option<String>,
    #[serde(default)]
    pub language: Vec<String>,
    #[serde(default)]
    pub subject: Vec<String>,
}

// ==================== OpenLibraryConnector ====================

/// Searches Open Library, keeping only works with an openly readable scan.
#[derive(Debug, Clone)]
pub struct OpenLibraryConnector {
    http: SourceClient,
}

impl OpenLibraryConnector {
    /// Creates a connector against openlibrary.org.
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
            http: SourceClient::new("openlibrary", base_url)?,
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
impl Connector for OpenLibraryConnector {
    fn name(&self) -> &'static str {
        "openlibrary"
    }

    fn provider(&self) -> Provider {
        Provider::OpenLibrary
    }

    #[tracing::instrument(skip(self), fields(source = "openlibrary"))]
    async fn try_search(&self, query: &str, page: u32) -> Result<Vec<CandidateRecord>, ConnectorError> {
        let url = self.http.url(&format!(
            "/search.json?q={}&page={}&limit={PAGE_SIZE}&fields={SEARCH_FIELDS}",
            urlencoding::encode(query),
            page.max(1)
        ));
        let body: OpenLibrarySearch = self.http.get_json(&url).await?;
        debug!(count = body.docs.len(), "openlibrary docs");
        Ok(body.docs.into_iter().filter_map(map_doc).collect())
    }
}

// ==================== Adapter ====================

fn is_openly_readable(doc: &OpenLibraryDoc) -> bool {
    match doc.ebook_access.as_deref() {
        Some(access) => access.eq_ignore_ascii_case("public") || doc.public_scan_b == Some(true),
        None => doc.public_scan_b == Some(true) || doc.has_fulltext == Some(true),
    }
}

fn map_doc(doc: OpenLibraryDoc) -> Option<CandidateRecord> {
    if !is_openly_readable(&doc) {
        return None;
    }

    let work_id = doc.key.trim_start_matches("/works/").to_string();
    let mut record = CandidateRecord::new(Provider::OpenLibrary, work_id, doc.title.trim());
    record.author = join_authors(&doc.author_name);
    record.year = doc.first_publish_year.map(|y| y.to_string());
    record.cover_url = doc
        .cover_i
        .filter(|id| *id > 0)
        .map(|id| format!("{COVERS_BASE_URL}/{id}-M.jpg"));
    record.source_url = Some(format!("{DEFAULT_BASE_URL}{}", doc.key));
    record.archive_id = doc.ia.iter().find(|id| is_valid_archive_id(id)).cloned();
    record.language = doc.language.into_iter().next();
    record.subjects = doc.subject.into_iter().take(10).collect();
    Some(record)
}
