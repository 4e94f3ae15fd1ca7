//! OAPEN Library (DSpace REST) connector.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::record::{BookFormat, CandidateRecord, Provider};

use super::client::SourceClient;
use super::dspace::{DspaceBitstream, DspaceItem};
use super::utils::{absolutize, extract_year};
use super::{Connector, ConnectorError};

const DEFAULT_BASE_URL: &str = "https://library.oapen.org";
const PAGE_SIZE: u32 = 25;
const ORIGINAL_BUNDLE: &str = "ORIGINAL";
const THUMBNAIL_BUNDLE: &str = "THUMBNAIL";

/// Searches OAPEN; the first PDF or EPUB in the item's ORIGINAL bundle is
/// the direct URL.
#[derive(Debug, Clone)]
pub struct OapenConnector {
    http: SourceClient,
}

impl OapenConnector {
    /// Creates a connector against library.oapen.org.
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
            http: SourceClient::new("oapen", base_url)?,
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
impl Connector for OapenConnector {
    fn name(&self) -> &'static str {
        "oapen"
    }

    fn provider(&self) -> Provider {
        Provider::Oapen
    }

    #[tracing::instrument(skip(self), fields(source = "oapen"))]
    async fn try_search(&self, query: &str, page: u32) -> Result<Vec<CandidateRecord>, ConnectorError> {
        let offset = page.max(1).saturating_sub(1).saturating_mul(PAGE_SIZE);
        let url = self.http.url(&format!(
            "/rest/search?query={}&expand=metadata,bitstreams&limit={PAGE_SIZE}&offset={offset}",
            urlencoding::encode(query)
        ));
        let items: Vec<DspaceItem> = self.http.get_json(&url).await?;
        debug!(count = items.len(), "oapen items");
        let base_url = self.http.base_url().to_string();
        Ok(items
            .into_iter()
            .filter_map(|item| map_item(&item, &base_url))
            .collect())
    }
}

// ==================== Adapter ====================

fn map_item(item: &DspaceItem, base_url: &str) -> Option<CandidateRecord> {
    let (format, link) = item
        .bitstreams
        .iter()
        .filter(|b| in_bundle(b, ORIGINAL_BUNDLE))
        .find_map(|b| bitstream_format(b).map(|format| (format, b.retrieve_link.as_deref())))?;
    let link = link?;
    let id = item.stable_id()?;

    let mut record = CandidateRecord::new(Provider::Oapen, id, item.title()?);
    record.author = item.authors();
    record.format = format;
    record.direct_url = Some(absolutize(link, base_url));
    record.source_url = item
        .handle
        .as_deref()
        .map(|handle| format!("{}/handle/{handle}", base_url.trim_end_matches('/')));
    record.cover_url = item
        .bitstreams
        .iter()
        .filter(|b| in_bundle(b, THUMBNAIL_BUNDLE))
        .find_map(|b| b.retrieve_link.as_deref())
        .map(|link| absolutize(link, base_url));
    record.year = item.value("dc.date.issued").as_deref().and_then(extract_year);
    record.language = item.value("dc.language");
    record.subjects = item.subjects();
    Some(record)
}

fn in_bundle(bitstream: &DspaceBitstream, bundle: &str) -> bool {
    bitstream
        .bundle_name
        .as_deref()
        .is_some_and(|name| name.eq_ignore_ascii_case(bundle))
}

fn bitstream_format(bitstream: &DspaceBitstream) -> Option<BookFormat> {
    let by_mime = bitstream
        .mime_type
        .as_deref()
        .map_or(BookFormat::Unknown, BookFormat::from_mime);
    let format = if by_mime == BookFormat::Unknown {
        bitstream
            .name
            .as_deref()
            .map_or(BookFormat::Unknown, BookFormat::from_path)
    } else {
        by_mime
    };
    (format != BookFormat::Unknown).then_some(format)
}
