//! Lightweight relevance scoring for merged search results.
//!
//! Scores are additive: every query term found in the title adds
//! [`TITLE_WEIGHT`], in the author [`AUTHOR_WEIGHT`], in any subject
//! [`SUBJECT_WEIGHT`]. A title containing the whole query phrase earns
//! [`PHRASE_BONUS`], and records that matched at all get a small Jaro-Winkler
//! similarity bonus so near-identical titles float up. A score of zero means
//! "no overlap with the query".

use std::collections::HashSet;
use std::sync::LazyLock;

use crate::record::CandidateRecord;

pub const TITLE_WEIGHT: f64 = 3.0;
pub const AUTHOR_WEIGHT: f64 = 2.0;
pub const SUBJECT_WEIGHT: f64 = 1.0;
pub const PHRASE_BONUS: f64 = 4.0;
pub const SIMILARITY_WEIGHT: f64 = 1.0;

/// Shortest token that may match as a prefix (`economic` ~ `economics`).
const MIN_PREFIX_LEN: usize = 4;

static STOPWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "into", "is", "it",
        "of", "on", "or", "the", "to", "with", "de", "la", "le", "les", "et", "der", "die", "das",
        "und", "el", "los", "y",
    ]
    .into_iter()
    .collect()
});

/// A preprocessed query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTerms {
    phrase: String,
    terms: Vec<String>,
}

impl QueryTerms {
    /// Normalizes and tokenizes a raw query string.
    #[must_use]
    pub fn parse(query: &str) -> Self {
        let phrase = normalize(query);
        let mut seen = HashSet::new();
        let terms = tokenize(&phrase)
            .into_iter()
            .filter(|t| seen.insert(t.clone()))
            .collect();
        Self { phrase, terms }
    }

    /// Content terms (stopwords removed, deduplicated, in query order).
    #[must_use]
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// True when the query carries no content terms.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Scores a record against a query.
#[must_use]
pub fn score_record(query: &QueryTerms, record: &CandidateRecord) -> f64 {
    score(query, &record.title, record.author.as_deref(), &record.subjects)
}

/// Scores loose fields against a query.
#[must_use]
pub fn score(query: &QueryTerms, title: &str, author: Option<&str>, subjects: &[String]) -> f64 {
    if query.is_empty() {
        return 0.0;
    }

    let title_norm = normalize(title);
    let title_tokens = tokenize(&title_norm);
    let author_tokens = author.map(|a| tokenize(&normalize(a))).unwrap_or_default();
    let subject_tokens: Vec<String> = subjects
        .iter()
        .flat_map(|s| tokenize(&normalize(s)))
        .collect();

    let mut total = 0.0;
    for term in &query.terms {
        if contains_term(&title_tokens, term) {
            total += TITLE_WEIGHT;
        }
        if contains_term(&author_tokens, term) {
            total += AUTHOR_WEIGHT;
        }
        if contains_term(&subject_tokens, term) {
            total += SUBJECT_WEIGHT;
        }
    }

    if total <= 0.0 {
        return 0.0;
    }

    if query.terms.len() > 1 && title_norm.contains(&query.phrase) {
        total += PHRASE_BONUS;
    }
    total + SIMILARITY_WEIGHT * strsim::jaro_winkler(&query.phrase, &title_norm)
}

fn contains_term(tokens: &[String], term: &str) -> bool {
    tokens.iter().any(|token| {
        token == term
            || (term.len() >= MIN_PREFIX_LEN && token.starts_with(term))
            || (token.len() >= MIN_PREFIX_LEN && term.starts_with(token.as_str()))
    })
}

/// Lowercases and collapses every run of non-alphanumerics into one space.
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn tokenize(normalized: &str) -> Vec<String> {
    normalized
        .split(' ')
        .filter(|t| t.chars().count() >= 2 && !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}
