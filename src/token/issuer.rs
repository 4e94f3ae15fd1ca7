//! Turns token requests from the reader UI into signed reader tokens.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::archive::{ReadabilityChecker, landing_page_url};
use crate::identity::{archive_id_from_url, is_valid_archive_id, strip_archive_prefixes};
use crate::proxy::DomainAllowlist;
use crate::record::{BookFormat, Provider, ReadabilityReason};

use super::{IssueError, ReaderToken, TokenSigner};

const GUTENBERG_EPUB_BASE: &str = "https://www.gutenberg.org/cache/epub";

/// Body of `POST /api/archive/token`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ArchiveTokenRequest {
    #[serde(default, alias = "archiveId", alias = "identifier")]
    pub archive_id: Option<String>,
    /// Any archive.org URL for the item, used when `archive_id` is absent.
    #[serde(default, alias = "sourceUrl", alias = "url")]
    pub source_url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default, alias = "coverUrl")]
    pub cover_url: Option<String>,
}

/// Body of `POST /api/external/token`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExternalTokenRequest {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default, alias = "providerId", alias = "id")]
    pub provider_id: Option<String>,
    #[serde(default, alias = "directUrl")]
    pub direct_url: Option<String>,
    #[serde(default, alias = "sourceUrl")]
    pub source_url: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default, alias = "coverUrl")]
    pub cover_url: Option<String>,
}

/// Response body for both token routes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenOutcome {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<BookFormat>,
    /// Echo of the URL the caller supplied; never a resolved upstream URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direct_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ReadabilityReason>,
}

impl TokenOutcome {
    fn issued(token: String, format: BookFormat, echoed_url: Option<String>) -> Self {
        Self {
            ok: true,
            token: Some(token),
            format: Some(format),
            direct_url: echoed_url,
            open_url: None,
            reason: None,
        }
    }

    fn declined(open_url: Option<String>, reason: Option<ReadabilityReason>) -> Self {
        Self {
            ok: false,
            token: None,
            format: None,
            direct_url: None,
            open_url,
            reason,
        }
    }
}

/// Resolves token requests and signs the result.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    signer: TokenSigner,
    checker: ReadabilityChecker,
    allowlist: DomainAllowlist,
}

impl TokenIssuer {
    /// Creates an issuer from its collaborators.
    #[must_use]
    pub fn new(signer: TokenSigner, checker: ReadabilityChecker, allowlist: DomainAllowlist) -> Self {
        Self {
            signer,
            checker,
            allowlist,
        }
    }

    /// Signer used for issued tokens (the proxy verifies with the same one).
    #[must_use]
    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    /// Issues a token for an archive item once it checks out as readable.
    ///
    /// Borrow-only or unreadable items are declined with the item's landing
    /// page as `open_url`.
    ///
    /// # Errors
    ///
    /// [`IssueError::InvalidRequest`] when no valid (non-numeric) identifier
    /// can be found; [`IssueError::Token`] if signing fails.
    #[tracing::instrument(skip(self, request))]
    pub async fn archive_token(&self, request: &ArchiveTokenRequest) -> Result<TokenOutcome, IssueError> {
        let identifier = request
            .archive_id
            .as_deref()
            .map(strip_archive_prefixes)
            .filter(|id| is_valid_archive_id(id))
            .map(str::to_string)
            .or_else(|| request.source_url.as_deref().and_then(archive_id_from_url))
            .ok_or_else(|| {
                IssueError::invalid_request("archive_id must be a non-numeric archive.org identifier")
            })?;

        let result = self.checker.check(&identifier, true).await;
        let direct_url = match result.direct_url.as_deref() {
            Some(url) if result.is_offerable() => url.to_string(),
            _ => {
                info!(archive_id = %identifier, reason = ?result.reason, "archive item not offerable");
                return Ok(TokenOutcome::declined(
                    Some(landing_page_url(&identifier)),
                    Some(result.reason),
                ));
            }
        };

        let mut payload = ReaderToken::new(Provider::InternetArchive, identifier.clone(), result.format, direct_url);
        payload.archive_id = Some(identifier.clone());
        payload.title = request.title.clone().unwrap_or_else(|| identifier.clone());
        payload.author.clone_from(&request.author);
        payload.cover_url.clone_from(&request.cover_url);

        let token = self.signer.build(payload)?;
        debug!(archive_id = %identifier, format = ?result.format, "issued archive reader token");
        Ok(TokenOutcome::issued(token, result.format, None))
    }

    /// Issues a token for a non-archive record.
    ///
    /// Tries, in order: an allowlisted `direct_url`, a Gutenberg EPUB derived
    /// from a numeric id, and an archive.org `source_url` (delegated to
    /// [`archive_token`](Self::archive_token)). Anything else is declined
    /// with `source_url` as `open_url`.
    ///
    /// An archive.org `direct_url` is never signed as given: its item goes
    /// through [`archive_token`](Self::archive_token), so borrow-only and
    /// DRM-only items are declined.
    ///
    /// # Errors
    ///
    /// [`IssueError::InvalidRequest`] when the request names no URL or id at
    /// all; [`IssueError::Token`] if signing fails.
    #[tracing::instrument(skip(self, request), fields(provider = ?request.provider))]
    pub async fn external_token(&self, request: &ExternalTokenRequest) -> Result<TokenOutcome, IssueError> {
        let provider = request.provider.as_deref().and_then(Provider::parse);
        let provider_id = request
            .provider_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());

        if let Some(direct_url) = request.direct_url.as_deref()
            && let Ok(url) = self.allowlist.check(direct_url)
        {
            // Archive files are only signed after the item passes the archive checks.
            if provider_for_host(url.host_str().unwrap_or_default()) == Provider::InternetArchive {
                let Some(archive_id) = archive_id_from_url(url.as_str()) else {
                    info!(url = %url, "archive.org URL without an item identifier; declining");
                    let open_url = request.source_url.clone().or_else(|| Some(direct_url.to_string()));
                    return Ok(TokenOutcome::declined(open_url, None));
                };
                return self.archive_token(&archive_request(archive_id, request)).await;
            }

            let format = requested_format(request.format.as_deref())
                .unwrap_or_else(|| BookFormat::from_path(url.path()));
            let mut payload = ReaderToken::new(
                provider.unwrap_or_else(|| provider_for_host(url.host_str().unwrap_or_default())),
                provider_id.unwrap_or_default(),
                format,
                url.to_string(),
            );
            fill_display_fields(&mut payload, request);
            let token = self.signer.build(payload)?;
            return Ok(TokenOutcome::issued(token, format, Some(direct_url.to_string())));
        }

        if provider == Some(Provider::Gutenberg)
            && let Some(id) = provider_id.filter(|id| id.chars().all(|c| c.is_ascii_digit()))
        {
            let mut payload = ReaderToken::new(Provider::Gutenberg, id, BookFormat::Epub, gutenberg_epub_url(id));
            fill_display_fields(&mut payload, request);
            let token = self.signer.build(payload)?;
            return Ok(TokenOutcome::issued(token, BookFormat::Epub, None));
        }

        let archive_source = request
            .source_url
            .as_deref()
            .and_then(archive_id_from_url)
            .or_else(|| {
                (provider == Some(Provider::InternetArchive))
                    .then_some(provider_id)
                    .flatten()
                    .map(strip_archive_prefixes)
                    .filter(|id| is_valid_archive_id(id))
                    .map(str::to_string)
            });
        if let Some(archive_id) = archive_source {
            return self.archive_token(&archive_request(archive_id, request)).await;
        }

        let open_url = request.source_url.clone().or_else(|| request.direct_url.clone());
        if open_url.is_none() && provider_id.is_none() {
            return Err(IssueError::invalid_request(
                "request needs a direct_url, source_url, or provider_id",
            ));
        }
        Ok(TokenOutcome::declined(open_url, None))
    }
}

fn archive_request(archive_id: String, request: &ExternalTokenRequest) -> ArchiveTokenRequest {
    ArchiveTokenRequest {
        archive_id: Some(archive_id),
        source_url: request.source_url.clone(),
        title: request.title.clone(),
        author: request.author.clone(),
        cover_url: request.cover_url.clone(),
    }
}

fn fill_display_fields(payload: &mut ReaderToken, request: &ExternalTokenRequest) {
    payload.title = request.title.clone().unwrap_or_default();
    payload.author.clone_from(&request.author);
    payload.cover_url.clone_from(&request.cover_url);
}

/// Best guess at the source of an allowlisted URL when the caller did not say.
fn provider_for_host(host: &str) -> Provider {
    let host = host.to_ascii_lowercase();
    let is = |domain: &str| host == domain || host.ends_with(&format!(".{domain}"));
    if is("archive.org") {
        Provider::InternetArchive
    } else if is("openlibrary.org") {
        Provider::OpenLibrary
    } else if is("library.oapen.org") {
        Provider::Oapen
    } else if is("directory.doabooks.org") {
        Provider::Doab
    } else if is("openstax.org") || is("cloudfront.net") {
        Provider::OpenStax
    } else if is("loc.gov") {
        Provider::LibraryOfCongress
    } else {
        Provider::Gutenberg
    }
}

fn requested_format(value: Option<&str>) -> Option<BookFormat> {
    match value.map(str::trim).map(str::to_ascii_lowercase).as_deref() {
        Some("epub") => Some(BookFormat::Epub),
        Some("pdf") => Some(BookFormat::Pdf),
        _ => None,
    }
}

/// EPUB download for a Gutenberg ebook number.
#[must_use]
pub fn gutenberg_epub_url(id: &str) -> String {
    format!("{GUTENBERG_EPUB_BASE}/{id}/pg{id}-images-3.epub")
}
