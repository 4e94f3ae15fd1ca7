//! Directory of Open Access Books (DSpace REST) connector.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::record::{BookFormat, CandidateRecord, Provider};

use super::client::SourceClient;
use super::dspace::DspaceItem;
use super::utils::extract_year;
use super::{Connector, ConnectorError};

const DEFAULT_BASE_URL: &str = "https://directory.doabooks.org";
const PAGE_SIZE: u32 = 25;
const DOWNLOAD_URL_KEY: &str = "oapen.identifier.downloadUrl";

/// Searches DOAB. Only items carrying a download URL in their metadata are
/// returned.
#[derive(Debug, Clone)]
pub struct DoabConnector {
    http: SourceClient,
}

impl DoabConnector {
    /// Creates a connector against directory.doabooks.org.
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
            http: SourceClient::new("doab", base_url)?,
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
impl Connector for DoabConnector {
    fn name(&self) -> &'static str {
        "doab"
    }

    fn provider(&self) -> Provider {
        Provider::Doab
    }

    #[tracing::instrument(skip(self), fields(source = "doab"))]
    async fn try_search(&self, query: &str, page: u32) -> Result<Vec<CandidateRecord>, ConnectorError> {
        let offset = page.max(1).saturating_sub(1).saturating_mul(PAGE_SIZE);
        let url = self.http.url(&format!(
            "/rest/search?query={}&expand=metadata&limit={PAGE_SIZE}&offset={offset}",
            urlencoding::encode(query)
        ));
        let items: Vec<DspaceItem> = self.http.get_json(&url).await?;
        debug!(count = items.len(), "doab items");
        let base_url = self.http.base_url().to_string();
        Ok(items
            .iter()
            .filter_map(|item| map_item(item, &base_url))
            .collect())
    }
}

// ==================== Adapter ====================

fn map_item(item: &DspaceItem, base_url: &str) -> Option<CandidateRecord> {
    let download_url = item.value(DOWNLOAD_URL_KEY)?;
    let id = item.stable_id()?;

    let format = match BookFormat::from_path(&download_url) {
        BookFormat::Unknown => item
            .value("dc.format")
            .map_or(BookFormat::Pdf, |f| match BookFormat::from_mime(&f) {
                BookFormat::Unknown => BookFormat::Pdf,
                known => known,
            }),
        known => known,
    };

    let mut record = CandidateRecord::new(Provider::Doab, id, item.title()?);
    record.author = item.authors();
    record.format = format;
    record.direct_url = Some(download_url);
    record.source_url = item
        .handle
        .as_deref()
        .map(|handle| format!("{}/handle/{handle}", base_url.trim_end_matches('/')));
    record.year = item.value("dc.date.issued").as_deref().and_then(extract_year);
    record.language = item.value("dc.language");
    record.subjects = item.subjects();
    Some(record)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_url_comes_from_download_metadata() {
        let item: DspaceItem = serde_json::from_value(serde_json::json!({
            "handle": "20.500.12854/25706",
            "name": "Development Economics",
            "metadata": [
                {"key": "oapen.identifier.downloadUrl", "value": "https://library.oapen.org/bitstream/id/abc/9781.pdf"},
                {"key": "dc.contributor.author", "value": "Mensah, K."}
            ]
        }))
        .unwrap();
        let record = map_item(&item, "https://directory.doabooks.org").unwrap();
        assert_eq!(record.format, BookFormat::Pdf);
        assert_eq!(
            record.direct_url.as_deref(),
            Some("https://library.oapen.org/bitstream/id/abc/9781.pdf")
        );
        assert_eq!(record.provider_id, "20.500.12854/25706");
    }

    #[test]
    fn test_items_without_download_url_are_skipped() {
        let item: DspaceItem = serde_json::from_value(serde_json::json!({
            "handle": "h/2", "name": "T", "metadata": []
        }))
        .unwrap();
        assert!(map_item(&item, "https://directory.doabooks.org").is_none());
    }
}
