//! Library of Congress (loc.gov JSON API) connector.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::record::{BookFormat, CandidateRecord, Provider};

use super::client::SourceClient;
use super::utils::{OneOrMany, extract_year, join_authors};
use super::{Connector, ConnectorError};

const DEFAULT_BASE_URL: &str = "https://www.loc.gov";
const PAGE_SIZE: u32 = 25;

// ==================== loc.gov Response Types ====================

#[derive(Debug, Deserialize)]
pub(crate) struct LocSearch {
    #[serde(default)]
    pub results: Vec<LocItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LocItem {
    pub id: Option<String>,
    pub title: Option<String>,
    pub contributor: Option<OneOrMany<String>>,
    pub date: Option<String>,
    pub language: Option<OneOrMany<String>>,
    pub subject: Option<OneOrMany<String>>,
    #[serde(default)]
    pub image_url: Vec<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub resources: Vec<LocResource>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LocResource {
    pub pdf: Option<String>,
}

// ==================== LocConnector ====================

/// Searches loc.gov books, keeping only items that offer a PDF resource.
#[derive(Debug, Clone)]
pub struct LocConnector {
    http: SourceClient,
}

impl LocConnector {
    /// Creates a connector against www.loc.gov.
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
            http: SourceClient::new("loc", base_url)?,
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
impl Connector for LocConnector {
    fn name(&self) -> &'static str {
        "loc"
    }

    fn provider(&self) -> Provider {
        Provider::LibraryOfCongress
    }

    #[tracing::instrument(skip(self), fields(source = "loc"))]
    async fn try_search(&self, query: &str, page: u32) -> Result<Vec<CandidateRecord>, ConnectorError> {
        let url = self.http.url(&format!(
            "/books/?q={}&fo=json&c={PAGE_SIZE}&sp={}",
            urlencoding::encode(query),
            page.max(1)
        ));
        let body: LocSearch = self.http.get_json(&url).await?;
        debug!(count = body.results.len(), "loc results");
        Ok(body.results.into_iter().filter_map(map_item).collect())
    }
}

// ==================== Adapter ====================

fn map_item(item: LocItem) -> Option<CandidateRecord> {
    let pdf = item
        .resources
        .iter()
        .find_map(|r| r.pdf.as_deref().map(str::trim).filter(|p| !p.is_empty()))?
        .to_string();
    let id = item.id.as_deref().and_then(last_path_segment)?;
    let title = item.title.as_deref().map(str::trim).filter(|t| !t.is_empty())?;

    let mut record = CandidateRecord::new(Provider::LibraryOfCongress, id, title);
    record.author = item.contributor.map(OneOrMany::into_vec).and_then(join_authors);
    record.format = BookFormat::Pdf;
    record.direct_url = Some(https(&pdf));
    record.source_url = item.url.as_deref().or(item.id.as_deref()).map(https);
    record.cover_url = item.image_url.first().map(|u| https(u));
    record.year = item.date.as_deref().and_then(extract_year);
    record.language = item.language.as_ref().and_then(OneOrMany::first).cloned();
    record.subjects = item.subject.map(OneOrMany::into_vec).unwrap_or_default();
    Some(record)
}

/// `http://www.loc.gov/item/2002.../` -> `2002...`
fn last_path_segment(id: &str) -> Option<String> {
    id.split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn https(url: &str) -> String {
    match url.strip_prefix("http://") {
        Some(rest) => format!("https://{rest}"),
        None if url.starts_with("//") => format!("https:{url}"),
        None => url.to_string(),
    }
}
