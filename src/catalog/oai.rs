//! OAI-PMH harvesting of Dublin Core records.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::connector::utils::{compile_static_regex, extract_year, join_authors};
use crate::connector::{ConnectorError, SourceClient};
use crate::record::{BookFormat, CandidateRecord, Provider};

/// DOAB's OAI-PMH endpoint.
pub const DEFAULT_OAI_ENDPOINT: &str = "https://directory.doabooks.org/oai/request";

/// Default number of `ListRecords` pages fetched per harvest.
pub const DEFAULT_HARVEST_MAX_PAGES: u32 = 5;

const HARVEST_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

static RECORD_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?s)<record\b[^>]*>(.*?)</record>"));

static DELETED_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r#"<header\b[^>]*\bstatus\s*=\s*["']deleted["']"#));

static HEADER_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r"(?s)<header\b[^>]*>.*?<identifier>\s*(.*?)\s*</identifier>")
});

static DC_ELEMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r"(?s)<dc:([a-zA-Z]+)\b[^>]*>(.*?)</dc:[a-zA-Z]+>")
});

static RESUMPTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r"(?s)<resumptionToken\b[^>]*>\s*(.*?)\s*</resumptionToken>")
});

static OAI_ERROR_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r#"<error\b[^>]*\bcode\s*=\s*["']([^"']+)["']"#));

/// One parsed `ListRecords` response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OaiPage {
    pub records: Vec<CandidateRecord>,
    /// Token for the next page; `None` when the list is complete.
    pub resumption_token: Option<String>,
}

/// Pulls `oai_dc` records page by page.
#[derive(Debug, Clone)]
pub struct OaiHarvester {
    client: SourceClient,
    provider: Provider,
    max_pages: u32,
}

impl OaiHarvester {
    /// Harvester for DOAB's endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError`] when the HTTP client cannot be built.
    pub fn new() -> Result<Self, ConnectorError> {
        Self::with_base_url(DEFAULT_OAI_ENDPOINT)
    }

    /// Harvester for another endpoint (tests, mirrors).
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError`] when the HTTP client cannot be built.
    pub fn with_base_url(endpoint: impl Into<String>) -> Result<Self, ConnectorError> {
        let mut client = SourceClient::new("oai", endpoint)?;
        client.set_request_timeout(HARVEST_REQUEST_TIMEOUT);
        Ok(Self {
            client,
            provider: Provider::Doab,
            max_pages: DEFAULT_HARVEST_MAX_PAGES,
        })
    }

    /// Caps the number of pages a harvest fetches (at least one).
    #[must_use]
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Provider stamped on harvested records.
    #[must_use]
    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = provider;
        self
    }

    /// Endpoint being harvested.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        self.client.base_url()
    }

    /// Fetches up to `max_pages` pages, following resumption tokens.
    ///
    /// A failed page ends the harvest; records from earlier pages are kept.
    #[tracing::instrument(skip(self), fields(endpoint = self.endpoint(), max_pages = self.max_pages))]
    pub async fn harvest(&self) -> Vec<CandidateRecord> {
        let mut records = Vec::new();
        let mut token: Option<String> = None;

        for page in 1..=self.max_pages {
            let fetched = match self.list_records(token.as_deref()).await {
                Ok(fetched) => fetched,
                Err(error) => {
                    warn!(page, error = %error, "harvest page failed; stopping");
                    break;
                }
            };
            debug!(page, records = fetched.records.len(), "harvested page");
            records.extend(fetched.records);

            match fetched.resumption_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        info!(records = records.len(), "harvest finished");
        records
    }

    /// Fetches one `ListRecords` page.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError`] on transport or HTTP failures.
    pub async fn list_records(&self, resumption_token: Option<&str>) -> Result<OaiPage, ConnectorError> {
        let query = match resumption_token {
            Some(token) => format!("?verb=ListRecords&resumptionToken={}", urlencoding::encode(token)),
            None => "?verb=ListRecords&metadataPrefix=oai_dc".to_string(),
        };
        let body = self
            .client
            .get_text(&self.client.url(&query), "text/xml, application/xml")
            .await?;
        Ok(parse_list_records(&body, self.provider))
    }
}

/// Parses a `ListRecords` response body.
///
/// An OAI `noRecordsMatch` error is an empty, complete page.
#[must_use]
pub fn parse_list_records(body: &str, provider: Provider) -> OaiPage {
    if let Some(code) = OAI_ERROR_RE.captures(body).and_then(|c| c.get(1)) {
        if code.as_str() != "noRecordsMatch" {
            warn!(code = code.as_str(), "OAI-PMH endpoint returned an error");
        }
        return OaiPage::default();
    }

    let records = RECORD_RE
        .captures_iter(body)
        .filter_map(|caps| caps.get(1))
        .filter_map(|record| parse_record(record.as_str(), provider))
        .collect();

    let resumption_token = RESUMPTION_RE
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| xml_unescape(m.as_str()))
        .filter(|t| !t.is_empty());

    OaiPage {
        records,
        resumption_token,
    }
}

fn parse_record(xml: &str, provider: Provider) -> Option<CandidateRecord> {
    if DELETED_RE.is_match(xml) {
        return None;
    }

    let mut titles = Vec::new();
    let mut creators = Vec::new();
    let mut identifiers = Vec::new();
    let mut subjects = Vec::new();
    let mut date = None;
    let mut language = None;

    for caps in DC_ELEMENT_RE.captures_iter(xml) {
        let (Some(element), Some(value)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let value = xml_unescape(value.as_str().trim());
        if value.is_empty() {
            continue;
        }
        match element.as_str() {
            "title" => titles.push(value),
            "creator" => creators.push(value),
            "identifier" => identifiers.push(value),
            "subject" => subjects.push(value),
            "date" if date.is_none() => date = Some(value),
            "language" if language.is_none() => language = Some(value),
            _ => {}
        }
    }

    let title = titles.into_iter().next()?;
    let header_id = HEADER_ID_RE
        .captures(xml)
        .and_then(|c| c.get(1))
        .map(|m| xml_unescape(m.as_str()))
        .filter(|id| !id.is_empty())?;

    let direct_url = identifiers
        .iter()
        .find(|id| id.starts_with("http") && BookFormat::from_path(id) != BookFormat::Unknown)
        .cloned();
    let source_url = identifiers
        .iter()
        .find(|id| id.starts_with("http") && Some(*id) != direct_url.as_ref())
        .cloned();

    let mut record = CandidateRecord::new(provider, header_id, title);
    record.author = join_authors(&creators);
    record.format = direct_url.as_deref().map(BookFormat::from_path).unwrap_or_default();
    record.direct_url = direct_url;
    record.source_url = source_url;
    record.year = date.as_deref().and_then(extract_year);
    record.language = language;
    record.subjects = subjects;
    Some(record)
}

/// Decodes the five predefined XML entities and numeric character references.
#[must_use]
pub fn xml_unescape(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let decoded = after.find(';').filter(|end| *end <= 10).and_then(|end| {
            let entity = &after[..end];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, end))
        });
        match decoded {
            Some((ch, end)) => {
                out.push(ch);
                rest = &after[end + 1..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/">
  <ListRecords>
    <record>
      <header><identifier>oai:doab-books:20.500.12854/1001</identifier></header>
      <metadata><oai_dc:dc>
        <dc:title>Economics of Development in Africa</dc:title>
        <dc:creator>Okafor, Ada</dc:creator>
        <dc:creator>Mensah, Kofi</dc:creator>
        <dc:subject>Economics</dc:subject>
        <dc:date>2019-05-01</dc:date>
        <dc:language>eng</dc:language>
        <dc:identifier>https://directory.doabooks.org/handle/20.500.12854/1001</dc:identifier>
        <dc:identifier>https://library.oapen.org/bitstream/id/1/book.pdf</dc:identifier>
      </oai_dc:dc></metadata>
    </record>
    <record>
      <header status="deleted"><identifier>oai:doab-books:20.500.12854/1002</identifier></header>
    </record>
    <record>
      <header><identifier>oai:doab-books:20.500.12854/1003</identifier></header>
      <metadata><oai_dc:dc>
        <dc:title>Trade &amp; Growth</dc:title>
      </oai_dc:dc></metadata>
    </record>
    <resumptionToken cursor="0" completeListSize="3">oai_dc/2/abc</resumptionToken>
  </ListRecords>
</OAI-PMH>"#;

    #[test]
    fn test_parse_list_records_maps_dublin_core() {
        let page = parse_list_records(PAGE, Provider::Doab);
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.resumption_token.as_deref(), Some("oai_dc/2/abc"));

        let first = &page.records[0];
        assert_eq!(first.provider_id, "oai:doab-books:20.500.12854/1001");
        assert_eq!(first.title, "Economics of Development in Africa");
        assert_eq!(first.author.as_deref(), Some("Okafor, Ada, Mensah, Kofi"));
        assert_eq!(first.direct_url.as_deref(), Some("https://library.oapen.org/bitstream/id/1/book.pdf"));
        assert_eq!(first.format, BookFormat::Pdf);
        assert_eq!(
            first.source_url.as_deref(),
            Some("https://directory.doabooks.org/handle/20.500.12854/1001")
        );
        assert_eq!(first.year.as_deref(), Some("2019"));
        assert_eq!(first.subjects, ["Economics"]);

        assert_eq!(page.records[1].title, "Trade & Growth");
        assert_eq!(page.records[1].direct_url, None);
    }

    #[test]
    fn test_empty_resumption_token_ends_the_list() {
        let body = "<ListRecords><resumptionToken completeListSize=\"3\"/></ListRecords>";
        assert_eq!(parse_list_records(body, Provider::Doab).resumption_token, None);
        let body = "<ListRecords><resumptionToken cursor=\"2\"></resumptionToken></ListRecords>";
        assert_eq!(parse_list_records(body, Provider::Doab).resumption_token, None);
    }

    #[test]
    fn test_no_records_match_is_an_empty_page() {
        let body = r#"<OAI-PMH><error code="noRecordsMatch">none</error></OAI-PMH>"#;
        assert_eq!(parse_list_records(body, Provider::Doab), OaiPage::default());
    }

    #[test]
    fn test_xml_unescape() {
        assert_eq!(xml_unescape("a &amp; b &lt;c&gt; &quot;d&quot; &apos;e&apos;"), "a & b <c> \"d\" 'e'");
        assert_eq!(xml_unescape("caf&#233; &#x263A;"), "café ☺");
        assert_eq!(xml_unescape("AT&T and &bogus; stay"), "AT&T and &bogus; stay");
    }
}
