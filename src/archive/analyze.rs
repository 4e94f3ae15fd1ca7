//! File classification and best-file selection for archive items.
//!
//! Selection order:
//! 1. smallest EPUB within the EPUB limit
//! 2. otherwise the first suitable PDF ("Text PDF" first, then smallest)
//!    within the PDF limit
//! 3. otherwise the smallest EPUB, flagged too large
//! 4. otherwise nothing
//!
//! Files without a reported size sort after sized files and count as within
//! limits. Protected (DRM/LCP/ACSM) files are never candidates.

use std::cmp::Ordering;

use crate::record::BookFormat;

use super::metadata::{ArchiveFile, ArchiveMetadata};

/// Default EPUB size ceiling in megabytes.
pub const DEFAULT_MAX_EPUB_MB: u64 = 50;

/// Default PDF size ceiling in megabytes.
pub const DEFAULT_MAX_PDF_MB: u64 = 200;

const BYTES_PER_MB: u64 = 1024 * 1024;

const PROTECTED_MARKERS: [&str; 5] = ["lcp", "drm", "protected", "acsm", "adobe"];
const BORROW_COLLECTIONS: [&str; 3] = ["inlibrary", "lendinglibrary", "printdisabled"];
const OPEN_COLLECTIONS: [&str; 5] = [
    "opensource",
    "gutenberg",
    "publicdomain",
    "folkscanomy",
    "opensource_textbooks",
];

/// Per-format size ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeLimits {
    pub max_epub_bytes: u64,
    pub max_pdf_bytes: u64,
}

impl SizeLimits {
    /// Builds limits from megabyte values.
    #[must_use]
    pub fn from_megabytes(max_epub_mb: u64, max_pdf_mb: u64) -> Self {
        Self {
            max_epub_bytes: max_epub_mb.saturating_mul(BYTES_PER_MB),
            max_pdf_bytes: max_pdf_mb.saturating_mul(BYTES_PER_MB),
        }
    }
}

impl Default for SizeLimits {
    fn default() -> Self {
        Self::from_megabytes(DEFAULT_MAX_EPUB_MB, DEFAULT_MAX_PDF_MB)
    }
}

/// Outcome of [`analyze_files`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileAnalysis {
    /// Selected file, if any.
    pub best_file: Option<ArchiveFile>,
    /// Format of `best_file` (`Unknown` when none).
    pub best_format: BookFormat,
    /// First suitable PDF within the limit, independent of `best_file`.
    pub best_pdf: Option<ArchiveFile>,
    /// `best_file` is an EPUB over the limit.
    pub too_large: bool,
    /// Protected files exist and no unprotected candidate does.
    pub encrypted_only: bool,
    /// Unprotected candidates in selection order (EPUBs, then PDFs).
    pub all_files: Vec<ArchiveFile>,
}

/// Returns true if a file is DRM-wrapped or a loan token.
#[must_use]
pub fn is_protected(file: &ArchiveFile) -> bool {
    let name = file.name.to_ascii_lowercase();
    let format = file.format.to_ascii_lowercase();
    PROTECTED_MARKERS
        .iter()
        .any(|marker| name.contains(marker) || format.contains(marker))
}

fn candidate_format(file: &ArchiveFile) -> BookFormat {
    match BookFormat::from_path(&file.name) {
        BookFormat::Unknown => BookFormat::from_mime(&file.format),
        known => known,
    }
}

fn is_text_pdf(file: &ArchiveFile) -> bool {
    file.format.trim().eq_ignore_ascii_case("text pdf")
}

/// Sized files first, ascending; unsized last.
fn by_size(a: &ArchiveFile, b: &ArchiveFile) -> Ordering {
    match (a.size_bytes, b.size_bytes) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn within(file: &ArchiveFile, limit: u64) -> bool {
    file.size_bytes.is_none_or(|size| size <= limit)
}

/// Classifies an item's files and selects the best readable one.
#[must_use]
pub fn analyze_files(metadata: &ArchiveMetadata, limits: SizeLimits) -> FileAnalysis {
    let mut epubs = Vec::new();
    let mut pdfs = Vec::new();
    let mut protected = 0usize;

    for file in &metadata.files {
        if is_protected(file) {
            protected += 1;
            continue;
        }
        match candidate_format(file) {
            BookFormat::Epub => epubs.push(file.clone()),
            BookFormat::Pdf => pdfs.push(file.clone()),
            BookFormat::Unknown => {}
        }
    }

    epubs.sort_by(by_size);
    pdfs.sort_by(|a, b| is_text_pdf(b).cmp(&is_text_pdf(a)).then_with(|| by_size(a, b)));

    let best_pdf = pdfs.iter().find(|f| within(f, limits.max_pdf_bytes)).cloned();
    let encrypted_only = protected > 0 && epubs.is_empty() && pdfs.is_empty();

    let (best_file, best_format, too_large) =
        if let Some(epub) = epubs.iter().find(|f| within(f, limits.max_epub_bytes)) {
            (Some(epub.clone()), BookFormat::Epub, false)
        } else if let Some(pdf) = &best_pdf {
            (Some(pdf.clone()), BookFormat::Pdf, false)
        } else if let Some(epub) = epubs.first() {
            (Some(epub.clone()), BookFormat::Epub, true)
        } else {
            (None, BookFormat::Unknown, false)
        };

    let mut all_files = epubs;
    all_files.extend(pdfs);

    FileAnalysis {
        best_file,
        best_format,
        best_pdf,
        too_large,
        encrypted_only,
        all_files,
    }
}

/// Returns true if the item is gated behind lending.
///
/// Best-effort: access-restricted flag, borrow-only collections without an
/// open collection, or a lending status mentioning "borrow".
#[must_use]
pub fn borrow_required(metadata: &ArchiveMetadata) -> bool {
    if metadata.field_is_true("access-restricted-item") {
        return true;
    }

    let collections: Vec<String> = metadata
        .field_values("collection")
        .into_iter()
        .map(|c| c.trim().to_ascii_lowercase())
        .collect();
    let in_borrow = collections
        .iter()
        .any(|c| BORROW_COLLECTIONS.contains(&c.as_str()));
    let in_open = collections
        .iter()
        .any(|c| OPEN_COLLECTIONS.contains(&c.as_str()));
    if in_borrow && !in_open {
        return true;
    }

    metadata
        .fields
        .keys()
        .filter(|key| key.to_ascii_lowercase().contains("lending"))
        .flat_map(|key| metadata.field_values(key))
        .any(|status| status.to_ascii_lowercase().contains("borrow"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const MB: u64 = 1024 * 1024;

    fn metadata(files: Vec<ArchiveFile>, fields: serde_json::Value) -> ArchiveMetadata {
        let fields: HashMap<String, serde_json::Value> = serde_json::from_value(fields).unwrap();
        ArchiveMetadata {
            files,
            fields,
            is_dark: false,
        }
    }

    fn file(name: &str, format: &str, size_mb: Option<u64>) -> ArchiveFile {
        ArchiveFile::new(name, format, size_mb.map(|s| s * MB))
    }

    #[test]
    fn test_epub_within_limit_wins_and_best_pdf_is_reported() {
        let analysis = analyze_files(
            &metadata(
                vec![
                    file("book.pdf", "Text PDF", Some(80)),
                    file("book.epub", "EPUB", Some(45)),
                ],
                serde_json::json!({}),
            ),
            SizeLimits::default(),
        );
        assert_eq!(analysis.best_file.unwrap().name, "book.epub");
        assert_eq!(analysis.best_format, BookFormat::Epub);
        assert_eq!(analysis.best_pdf.unwrap().name, "book.pdf");
        assert!(!analysis.too_large);
    }

    #[test]
    fn test_text_pdf_preferred_over_smaller_image_pdf() {
        let analysis = analyze_files(
            &metadata(
                vec![
                    file("scan.pdf", "Image Container PDF", Some(5)),
                    file("text.pdf", "Text PDF", Some(30)),
                ],
                serde_json::json!({}),
            ),
            SizeLimits::default(),
        );
        assert_eq!(analysis.best_file.unwrap().name, "text.pdf");
        assert_eq!(analysis.all_files[0].name, "text.pdf");
    }

    #[test]
    fn test_unsized_files_sort_last_but_are_within_limits() {
        let analysis = analyze_files(
            &metadata(
                vec![
                    file("unsized.epub", "EPUB", None),
                    file("small.epub", "EPUB", Some(2)),
                ],
                serde_json::json!({}),
            ),
            SizeLimits::default(),
        );
        assert_eq!(analysis.best_file.unwrap().name, "small.epub");

        let only_unsized = analyze_files(
            &metadata(vec![file("unsized.epub", "EPUB", None)], serde_json::json!({})),
            SizeLimits::default(),
        );
        assert_eq!(only_unsized.best_file.unwrap().name, "unsized.epub");
        assert!(!only_unsized.too_large);
    }

    #[test]
    fn test_oversized_epub_without_pdf_is_flagged_too_large() {
        let analysis = analyze_files(
            &metadata(
                vec![
                    file("huge.epub", "EPUB", Some(120)),
                    file("huge.pdf", "Text PDF", Some(400)),
                ],
                serde_json::json!({}),
            ),
            SizeLimits::default(),
        );
        assert_eq!(analysis.best_file.unwrap().name, "huge.epub");
        assert!(analysis.too_large);
        assert!(analysis.best_pdf.is_none());
    }

    #[test]
    fn test_protected_only_is_encrypted_only() {
        let analysis = analyze_files(
            &metadata(
                vec![
                    file("book_lcp.epub", "LCP Encrypted EPUB", Some(3)),
                    file("book.acsm", "ACS Encrypted PDF", Some(1)),
                ],
                serde_json::json!({}),
            ),
            SizeLimits::default(),
        );
        assert!(analysis.encrypted_only);
        assert!(analysis.best_file.is_none());
        assert!(analysis.all_files.is_empty());
    }

    #[test]
    fn test_no_candidates_without_protection_is_not_encrypted_only() {
        let analysis = analyze_files(
            &metadata(vec![file("book_djvu.txt", "DjVuTXT", Some(1))], serde_json::json!({})),
            SizeLimits::default(),
        );
        assert!(!analysis.encrypted_only);
        assert!(analysis.best_file.is_none());
    }

    #[test]
    fn test_borrow_required_rules() {
        let restricted = metadata(vec![], serde_json::json!({"access-restricted-item": "true"}));
        assert!(borrow_required(&restricted));

        let lending = metadata(vec![], serde_json::json!({"collection": ["inlibrary", "printdisabled"]}));
        assert!(borrow_required(&lending));

        let mixed = metadata(vec![], serde_json::json!({"collection": ["printdisabled", "opensource"]}));
        assert!(!borrow_required(&mixed));

        let status = metadata(vec![], serde_json::json!({"lending___status": "available_to_borrow"}));
        assert!(borrow_required(&status));

        let open = metadata(vec![], serde_json::json!({"collection": "gutenberg"}));
        assert!(!borrow_required(&open));
    }
}
