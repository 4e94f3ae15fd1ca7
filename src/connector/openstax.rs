//! OpenStax textbooks from a curated static catalog.
//!
//! The public OpenStax CMS API changes shape without notice, so the connector
//! ships the catalog and filters it locally by relevance.

use async_trait::async_trait;

use crate::record::{BookFormat, CandidateRecord, Provider};
use crate::search::relevance::{QueryTerms, score};

use super::{Connector, ConnectorError};

const DETAILS_BASE_URL: &str = "https://openstax.org/details/books";
const AUTHOR: &str = "OpenStax";

struct CatalogEntry {
    slug: &'static str,
    title: &'static str,
    subjects: &'static [&'static str],
}

const CATALOG: &[CatalogEntry] = &[
    CatalogEntry { slug: "principles-economics-3e", title: "Principles of Economics 3e", subjects: &["Economics", "Social Sciences"] },
    CatalogEntry { slug: "principles-microeconomics-3e", title: "Principles of Microeconomics 3e", subjects: &["Economics", "Microeconomics"] },
    CatalogEntry { slug: "principles-macroeconomics-3e", title: "Principles of Macroeconomics 3e", subjects: &["Economics", "Macroeconomics"] },
    CatalogEntry { slug: "introductory-business-statistics-2e", title: "Introductory Business Statistics 2e", subjects: &["Business", "Statistics"] },
    CatalogEntry { slug: "principles-finance", title: "Principles of Finance", subjects: &["Business", "Finance"] },
    CatalogEntry { slug: "principles-management", title: "Principles of Management", subjects: &["Business", "Management"] },
    CatalogEntry { slug: "introduction-sociology-3e", title: "Introduction to Sociology 3e", subjects: &["Sociology", "Social Sciences"] },
    CatalogEntry { slug: "psychology-2e", title: "Psychology 2e", subjects: &["Psychology", "Social Sciences"] },
    CatalogEntry { slug: "american-government-3e", title: "American Government 3e", subjects: &["Political Science", "Government"] },
    CatalogEntry { slug: "us-history", title: "U.S. History", subjects: &["History", "United States"] },
    CatalogEntry { slug: "world-history-volume-1", title: "World History Volume 1, to 1500", subjects: &["History", "World History"] },
    CatalogEntry { slug: "world-history-volume-2", title: "World History Volume 2, from 1400", subjects: &["History", "World History"] },
    CatalogEntry { slug: "biology-2e", title: "Biology 2e", subjects: &["Biology", "Science"] },
    CatalogEntry { slug: "concepts-biology", title: "Concepts of Biology", subjects: &["Biology", "Science"] },
    CatalogEntry { slug: "microbiology", title: "Microbiology", subjects: &["Biology", "Microbiology"] },
    CatalogEntry { slug: "anatomy-and-physiology-2e", title: "Anatomy and Physiology 2e", subjects: &["Biology", "Medicine"] },
    CatalogEntry { slug: "chemistry-2e", title: "Chemistry 2e", subjects: &["Chemistry", "Science"] },
    CatalogEntry { slug: "organic-chemistry", title: "Organic Chemistry", subjects: &["Chemistry", "Science"] },
    CatalogEntry { slug: "college-physics-2e", title: "College Physics 2e", subjects: &["Physics", "Science"] },
    CatalogEntry { slug: "university-physics-volume-1", title: "University Physics Volume 1", subjects: &["Physics", "Mechanics"] },
    CatalogEntry { slug: "astronomy-2e", title: "Astronomy 2e", subjects: &["Astronomy", "Science"] },
    CatalogEntry { slug: "calculus-volume-1", title: "Calculus Volume 1", subjects: &["Mathematics", "Calculus"] },
    CatalogEntry { slug: "college-algebra-2e", title: "College Algebra 2e", subjects: &["Mathematics", "Algebra"] },
    CatalogEntry { slug: "introductory-statistics-2e", title: "Introductory Statistics 2e", subjects: &["Mathematics", "Statistics"] },
    CatalogEntry { slug: "introduction-philosophy", title: "Introduction to Philosophy", subjects: &["Philosophy", "Humanities"] },
    CatalogEntry { slug: "writing-guide", title: "Writing Guide with Handbook", subjects: &["Writing", "Humanities"] },
    CatalogEntry { slug: "introduction-computer-science", title: "Introduction to Computer Science", subjects: &["Computer Science", "Technology"] },
    CatalogEntry { slug: "introduction-python-programming", title: "Introduction to Python Programming", subjects: &["Computer Science", "Programming"] },
];

/// Matches queries against the bundled OpenStax catalog. Never touches the
/// network and never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenStaxConnector;

impl OpenStaxConnector {
    /// Creates the connector.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for OpenStaxConnector {
    fn name(&self) -> &'static str {
        "openstax"
    }

    fn provider(&self) -> Provider {
        Provider::OpenStax
    }

    async fn try_search(&self, query: &str, page: u32) -> Result<Vec<CandidateRecord>, ConnectorError> {
        // The whole catalog fits on the first page.
        if page > 1 {
            return Ok(Vec::new());
        }
        let terms = QueryTerms::parse(query);
        let mut scored: Vec<(f64, CandidateRecord)> = CATALOG
            .iter()
            .filter_map(|entry| {
                let subjects: Vec<String> = entry.subjects.iter().map(|s| (*s).to_string()).collect();
                let relevance = score(&terms, entry.title, Some(AUTHOR), &subjects);
                (relevance > 0.0).then(|| (relevance, map_entry(entry, subjects)))
            })
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        Ok(scored.into_iter().map(|(_, record)| record).collect())
    }
}

fn map_entry(entry: &CatalogEntry, subjects: Vec<String>) -> CandidateRecord {
    let mut record = CandidateRecord::new(Provider::OpenStax, entry.slug, entry.title);
    record.author = Some(AUTHOR.to_string());
    record.format = BookFormat::Pdf;
    record.source_url = Some(format!("{DETAILS_BASE_URL}/{}", entry.slug));
    record.language = Some("en".to_string());
    record.subjects = subjects;
    record
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_search_filters_catalog_by_relevance() {
        let results = OpenStaxConnector::new().search("principles of economics", 1).await;
        assert!(!results.is_empty());
        assert_eq!(results[0].provider_id, "principles-economics-3e");
        assert!(results.iter().all(|r| r.provider == Provider::OpenStax));
        assert!(results.iter().all(|r| !r.title.contains("Biology")));
    }

    #[tokio::test]
    async fn test_unrelated_query_and_later_pages_are_empty() {
        let connector = OpenStaxConnector::new();
        assert!(connector.search("clinton cash", 1).await.is_empty());
        assert!(connector.search("economics", 2).await.is_empty());
    }
}
