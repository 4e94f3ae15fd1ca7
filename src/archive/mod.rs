//! Archive.org metadata analysis and live availability probing.
//!
//! - [`ArchiveMetadataClient`] - cached `/metadata/<id>` fetches
//! - [`analyze_files`] / [`borrow_required`] - pure classification of an item's files
//! - [`Prober`] - `HEAD` + `Range` probe with a manual redirect walk
//! - [`ReadabilityChecker`] - composes the three into a [`ReadabilityResult`]

mod analyze;
mod metadata;
mod probe;
mod readability;

pub use analyze::{
    DEFAULT_MAX_EPUB_MB, DEFAULT_MAX_PDF_MB, FileAnalysis, SizeLimits, analyze_files,
    borrow_required, is_protected,
};
pub use metadata::{
    ArchiveFile, ArchiveMetadata, ArchiveMetadataClient, DEFAULT_METADATA_TIMEOUT, parse_metadata,
};
pub use probe::{DEFAULT_PROBE_TIMEOUT, MAX_REDIRECT_HOPS, ProbeOutcome, Prober, download_url};
pub use readability::{ReadabilityChecker, ReadabilityResult};

/// Landing page for an item, used when it cannot be offered through the reader.
#[must_use]
pub fn landing_page_url(identifier: &str) -> String {
    format!("https://archive.org/details/{}", urlencoding::encode(identifier))
}
