//! Canonical identity keys used to deduplicate records across sources.
//!
//! The same physical Archive.org scan often reaches us through several
//! providers (Open Library's `ia` field, an archive.org search hit, a cover
//! URL). All of them must collapse to one `bl-book-<identifier>` key. Records
//! with no archive backing fall back to `<provider>-<provider_id>`, and as a
//! last resort to a content hash of title and author.
//!
//! Every function here is pure and idempotent.

use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::record::{CandidateRecord, Provider};

/// Prefix for archive-backed canonical keys.
pub const ARCHIVE_KEY_PREFIX: &str = "bl-book-";

/// Legacy prefix some records carry from earlier normalization passes.
const LEGACY_ARCHIVE_PREFIX: &str = "archive-";

/// Prefix for content-hash fallback keys.
const HASH_KEY_PREFIX: &str = "hash-";

static ARCHIVE_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(
        r"(?i)(?:^|[/.])archive\.org/(?:details|download|services/img|(?:\d+/)?items)/([A-Za-z0-9][A-Za-z0-9._-]*)",
    )
});

static ARCHIVE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,99}$"));

fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

/// Returns true if `id` can be an Archive.org identifier.
///
/// Purely numeric strings are rejected: they are usually ISBNs or catalog
/// numbers misrouted into an identifier field.
#[must_use]
pub fn is_valid_archive_id(id: &str) -> bool {
    let id = id.trim();
    ARCHIVE_ID_RE.is_match(id) && !id.chars().all(|c| c.is_ascii_digit())
}

/// Extracts an archive identifier from an archive.org `/details/`,
/// `/download/`, `/services/img/`, or datanode `/<n>/items/` URL.
#[must_use]
pub fn archive_id_from_url(value: &str) -> Option<String> {
    let caps = ARCHIVE_URL_RE.captures(value.trim())?;
    let id = caps.get(1)?.as_str();
    is_valid_archive_id(id).then(|| id.to_string())
}

/// Removes any number of stacked `bl-book-` / `archive-` prefixes.
#[must_use]
pub fn strip_archive_prefixes(value: &str) -> &str {
    let mut current = value.trim();
    loop {
        if let Some(rest) = current.strip_prefix(ARCHIVE_KEY_PREFIX) {
            current = rest;
        } else if let Some(rest) = current.strip_prefix(LEGACY_ARCHIVE_PREFIX) {
            current = rest;
        } else {
            return current;
        }
    }
}

/// Returns the archive identifier backing a record, if any.
///
/// Checks the explicit `archive_id`, then archive.org URLs embedded in the
/// record, then prefixed provider ids (and the archive provider's own id).
#[must_use]
pub fn record_archive_id(record: &CandidateRecord) -> Option<String> {
    if let Some(explicit) = record.archive_id.as_deref() {
        let stripped = strip_archive_prefixes(explicit);
        if is_valid_archive_id(stripped) {
            return Some(stripped.to_string());
        }
    }

    let url_fields = [
        record.source_url.as_deref(),
        Some(record.provider_id.as_str()),
        record.cover_url.as_deref(),
        record.direct_url.as_deref(),
    ];
    if let Some(id) = url_fields.into_iter().flatten().find_map(archive_id_from_url) {
        return Some(id);
    }

    let stripped = strip_archive_prefixes(&record.provider_id);
    let was_prefixed = stripped.len() != record.provider_id.trim().len();
    if (was_prefixed || record.provider == Provider::InternetArchive)
        && is_valid_archive_id(stripped)
    {
        return Some(stripped.to_string());
    }

    None
}

/// Builds the canonical dedup key for a record.
#[must_use]
pub fn canonical_key(record: &CandidateRecord) -> String {
    if let Some(id) = record_archive_id(record) {
        return format!("{ARCHIVE_KEY_PREFIX}{id}");
    }

    let provider_id = strip_archive_prefixes(&record.provider_id);
    if provider_id.starts_with(HASH_KEY_PREFIX) {
        return provider_id.to_string();
    }
    if !provider_id.is_empty() {
        return provider_key(record.provider.as_str(), provider_id);
    }

    content_hash_key(&record.title, record.author.as_deref())
}

/// Normalizes an already-built key string.
///
/// `bl-book-bl-book-X` becomes `bl-book-X`. An archive-prefixed numeric id is
/// not an archive key; it falls through to the archive provider's
/// `archive-<id>` form, exactly as [`canonical_key`] would build it. Anything
/// else is returned unchanged, so `normalize_key(normalize_key(k)) == normalize_key(k)`.
#[must_use]
pub fn normalize_key(key: &str) -> String {
    let trimmed = key.trim();
    let stripped = strip_archive_prefixes(trimmed);
    if stripped.len() == trimmed.len() {
        return trimmed.to_string();
    }
    if is_valid_archive_id(stripped) {
        format!("{ARCHIVE_KEY_PREFIX}{stripped}")
    } else {
        provider_key(Provider::InternetArchive.as_str(), stripped)
    }
}

fn provider_key(provider: &str, provider_id: &str) -> String {
    let prefix = format!("{provider}-");
    if provider_id.starts_with(&prefix) {
        provider_id.to_string()
    } else {
        format!("{prefix}{provider_id}")
    }
}

/// Stable content-hash key from normalized title and author.
#[must_use]
pub fn content_hash_key(title: &str, author: Option<&str>) -> String {
    let normalized = format!(
        "{}|{}",
        normalize_text(title),
        normalize_text(author.unwrap_or_default())
    );
    let digest = Sha256::digest(normalized.as_bytes());
    let mut hex = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        let _ = write!(hex, "{byte:02x}");
    }
    format!("{HASH_KEY_PREFIX}{hex}")
}

fn normalize_text(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
