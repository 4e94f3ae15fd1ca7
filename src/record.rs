//! Normalized book records shared by connectors, the aggregator, and the API.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Upstream catalog a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Project Gutenberg via the Gutendex API.
    Gutenberg,
    /// Open Library search.
    #[serde(rename = "openlibrary")]
    OpenLibrary,
    /// Internet Archive (archive.org) items.
    #[serde(rename = "archive")]
    InternetArchive,
    /// OAPEN Library.
    Oapen,
    /// Directory of Open Access Books.
    Doab,
    /// OpenStax textbooks.
    #[serde(rename = "openstax")]
    OpenStax,
    /// Library of Congress.
    #[serde(rename = "loc")]
    LibraryOfCongress,
}

impl Provider {
    /// Stable short label used in canonical keys and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gutenberg => "gutenberg",
            Self::OpenLibrary => "openlibrary",
            Self::InternetArchive => "archive",
            Self::Oapen => "oapen",
            Self::Doab => "doab",
            Self::OpenStax => "openstax",
            Self::LibraryOfCongress => "loc",
        }
    }

    /// Parses a provider label (case-insensitive, accepts a few common aliases).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gutenberg" | "gutendex" => Some(Self::Gutenberg),
            "openlibrary" | "open_library" => Some(Self::OpenLibrary),
            "archive" | "internet_archive" | "ia" => Some(Self::InternetArchive),
            "oapen" => Some(Self::Oapen),
            "doab" => Some(Self::Doab),
            "openstax" => Some(Self::OpenStax),
            "loc" | "library_of_congress" => Some(Self::LibraryOfCongress),
            _ => None,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// File format of a readable book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookFormat {
    /// EPUB container.
    Epub,
    /// PDF document.
    Pdf,
    /// Not yet known.
    #[default]
    Unknown,
}

impl BookFormat {
    /// Media type the proxy forces on streamed responses.
    #[must_use]
    pub fn media_type(self) -> &'static str {
        match self {
            Self::Epub => "application/epub+zip",
            Self::Pdf => "application/pdf",
            Self::Unknown => "application/octet-stream",
        }
    }

    /// Infers a format from a URL or filename extension.
    #[must_use]
    pub fn from_path(path: &str) -> Self {
        let lower = path
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        if lower.ends_with(".epub") || lower.contains(".epub3") || lower.contains(".epub.") {
            Self::Epub
        } else if lower.ends_with(".pdf") {
            Self::Pdf
        } else {
            Self::Unknown
        }
    }

    /// Infers a format from a MIME type.
    #[must_use]
    pub fn from_mime(mime: &str) -> Self {
        let lower = mime.to_ascii_lowercase();
        if lower.contains("epub") {
            Self::Epub
        } else if lower.contains("pdf") {
            Self::Pdf
        } else {
            Self::Unknown
        }
    }
}

/// A normalized book description returned by a connector before dedup and
/// readability annotation.
///
/// `provider` and `provider_id` are unique per source. `direct_url` may be
/// absent until the record is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub provider: Provider,
    pub provider_id: String,
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub format: BookFormat,
    #[serde(default)]
    pub direct_url: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    /// Explicit Archive.org identifier, when the source knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subjects: Vec<String>,
}

impl CandidateRecord {
    /// Creates a record with only the identifying fields set.
    #[must_use]
    pub fn new(provider: Provider, provider_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            provider,
            provider_id: provider_id.into(),
            title: title.into(),
            author: None,
            cover_url: None,
            format: BookFormat::Unknown,
            direct_url: None,
            source_url: None,
            year: None,
            language: None,
            archive_id: None,
            subjects: Vec::new(),
        }
    }
}

/// Tri-state readability verdict. Never collapsed into a boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Readable {
    /// Verified to serve the expected file.
    True,
    /// Verified not to be openly readable.
    False,
    /// Not probed yet, or the probe was inconclusive.
    Maybe,
}

impl Readable {
    /// Returns true unless the verdict is a confirmed `False`.
    #[must_use]
    pub fn is_not_false(self) -> bool {
        !matches!(self, Self::False)
    }
}

/// Machine-readable reason attached to a readability verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadabilityReason {
    /// Probe confirmed the file.
    Ok,
    /// Upstream metadata fetch failed.
    MetadataUnavailable,
    /// All files protected, oversized, or absent.
    NoUsableFiles,
    /// Every candidate file is DRM-wrapped.
    EncryptedOnly,
    /// Access is gated behind lending.
    BorrowRequired,
    /// Deferred because of the probe budget.
    NotProbed,
    /// Only an oversized EPUB is available.
    TooLarge,
    /// A network call exceeded its deadline.
    Timeout,
    /// Probe saw a redirect into a lending flow.
    BorrowRedirect,
    /// Probe was refused (401/403).
    Forbidden,
    /// Probe got 404.
    NotFound,
    /// Probe got an HTML page instead of a file.
    HtmlInterstitial,
    /// Probe followed too many redirects.
    TooManyRedirects,
    /// Probe got an unexpected status or transport failure.
    ProbeInconclusive,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_labels_round_trip_through_parse() {
        for provider in [
            Provider::Gutenberg,
            Provider::OpenLibrary,
            Provider::InternetArchive,
            Provider::Oapen,
            Provider::Doab,
            Provider::OpenStax,
            Provider::LibraryOfCongress,
        ] {
            assert_eq!(Provider::parse(provider.as_str()), Some(provider));
            let json = serde_json::to_string(&provider).unwrap();
            assert_eq!(json, format!("\"{}\"", provider.as_str()));
        }
        assert_eq!(Provider::parse("internet_archive"), Some(Provider::InternetArchive));
        assert_eq!(Provider::parse("nope"), None);
    }

    #[test]
    fn test_book_format_from_path() {
        assert_eq!(BookFormat::from_path("https://x.org/a/book.EPUB"), BookFormat::Epub);
        assert_eq!(BookFormat::from_path("https://x.org/ebooks/84.epub3.images"), BookFormat::Epub);
        assert_eq!(BookFormat::from_path("/download/x/y.pdf?download=1"), BookFormat::Pdf);
        assert_eq!(BookFormat::from_path("/download/x/y.txt"), BookFormat::Unknown);
    }

    #[test]
    fn test_readable_serializes_as_tri_state_string() {
        assert_eq!(serde_json::to_string(&Readable::True).unwrap(), "\"true\"");
        assert_eq!(serde_json::to_string(&Readable::False).unwrap(), "\"false\"");
        assert_eq!(serde_json::to_string(&Readable::Maybe).unwrap(), "\"maybe\"");
        assert!(Readable::Maybe.is_not_false());
        assert!(!Readable::False.is_not_false());
    }

    #[test]
    fn test_reason_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ReadabilityReason::MetadataUnavailable).unwrap(),
            "\"metadata_unavailable\""
        );
        assert_eq!(
            serde_json::to_string(&ReadabilityReason::NotProbed).unwrap(),
            "\"not_probed\""
        );
    }

    #[test]
    fn test_candidate_record_deserializes_with_defaults() {
        let record: CandidateRecord = serde_json::from_value(serde_json::json!({
            "provider": "gutenberg",
            "provider_id": "84",
            "title": "Frankenstein"
        }))
        .unwrap();
        assert_eq!(record, CandidateRecord::new(Provider::Gutenberg, "84", "Frankenstein"));
    }
}
