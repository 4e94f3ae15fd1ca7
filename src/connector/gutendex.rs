//! Project Gutenberg via the Gutendex JSON API.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::record::{BookFormat, CandidateRecord, Provider};

use super::client::SourceClient;
use super::utils::join_authors;
use super::{Connector, ConnectorError};

const DEFAULT_BASE_URL: &str = "https://gutendex.com";
const GUTENBERG_EBOOK_BASE: &str = "https://www.gutenberg.org/ebooks";

// ==================== Gutendex API Response Types ====================

#[derive(Debug, Deserialize)]
pub(crate) struct GutendexPage {
    #[serde(default)]
    pub results: Vec<GutendexBook>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GutendexBook {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub authors: Vec<GutendexPerson>,
    #[serde(default)]
    pub subjects: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    /// `true`, `false`, or `null` (unknown).
    #[serde(default)]
    pub copyright: Option<bool>,
    /// MIME type (sometimes with parameters) to URL.
    #[serde(default)]
    pub formats: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GutendexPerson {
    pub name: String,
}

// ==================== GutendexConnector ====================

/// Searches Project Gutenberg through Gutendex.
///
/// Only public-domain entries are kept; the EPUB download is preferred over
/// the PDF one when both exist.
#[derive(Debug, Clone)]
pub struct GutendexConnector {
    http: SourceClient,
}

impl GutendexConnector {
    /// Creates a connector against the public Gutendex instance.
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
            http: SourceClient::new("gutendex", base_url)?,
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
impl Connector for GutendexConnector {
    fn name(&self) -> &'static str {
        "gutendex"
    }

    fn provider(&self) -> Provider {
        Provider::Gutenberg
    }

    #[tracing::instrument(skip(self), fields(source = "gutendex"))]
    async fn try_search(&self, query: &str, page: u32) -> Result<Vec<CandidateRecord>, ConnectorError> {
        let url = self.http.url(&format!(
            "/books/?search={}&page={}",
            urlencoding::encode(query),
            page.max(1)
        ));
        let body: GutendexPage = self.http.get_json(&url).await?;
        debug!(count = body.results.len(), "gutendex results");
        Ok(body.results.into_iter().filter_map(map_book).collect())
    }
}

// ==================== Adapter ====================

fn map_book(book: GutendexBook) -> Option<CandidateRecord> {
    if book.copyright == Some(true) {
        return None;
    }
    let (format, direct_url) = pick_download(&book.formats)?;

    let mut record = CandidateRecord::new(Provider::Gutenberg, book.id.to_string(), book.title.trim());
    record.author = join_authors(book.authors.iter().map(|a| a.name.as_str()));
    record.format = format;
    record.direct_url = Some(direct_url);
    record.source_url = Some(format!("{GUTENBERG_EBOOK_BASE}/{}", book.id));
    record.cover_url = find_format(&book.formats, "image/jpeg");
    record.language = book.languages.into_iter().next();
    record.subjects = book.subjects;
    Some(record)
}

fn pick_download(formats: &HashMap<String, String>) -> Option<(BookFormat, String)> {
    find_format(formats, "application/epub+zip")
        .map(|url| (BookFormat::Epub, url))
        .or_else(|| find_format(formats, "application/pdf").map(|url| (BookFormat::Pdf, url)))
}

/// Finds a format URL by MIME type, ignoring parameters such as `; charset=`.
fn find_format(formats: &HashMap<String, String>, mime: &str) -> Option<String> {
    formats.iter().find_map(|(key, url)| {
        let base = key.split(';').next().unwrap_or_default().trim();
        base.eq_ignore_ascii_case(mime).then(|| url.clone())
    })
}
