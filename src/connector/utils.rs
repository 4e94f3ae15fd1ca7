//! Shared helpers for connector payload adapters.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

/// Compiles a regex at static init; panics on invalid pattern.
pub(crate) fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

static YEAR_VALUE_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"\b(1[5-9]|20)\d{2}\b"));

/// A field some APIs return as a scalar and sometimes as an array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub(crate) fn first(&self) -> Option<&T> {
        match self {
            Self::One(value) => Some(value),
            Self::Many(values) => values.first(),
        }
    }

    pub(crate) fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(value) => vec![value],
            Self::Many(values) => values,
        }
    }
}

/// Returns the first year-like match (1500..=2099) in `value`.
#[must_use]
pub(crate) fn extract_year(value: &str) -> Option<String> {
    YEAR_VALUE_RE.find(value).map(|m| m.as_str().to_string())
}

/// Trims a string and drops it when empty.
#[must_use]
pub(crate) fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Joins author names with `", "`, returning `None` when there are none.
#[must_use]
pub(crate) fn join_authors<I, S>(names: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let joined = names
        .into_iter()
        .map(|n| n.as_ref().trim().to_string())
        .filter(|n| !n.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    (!joined.is_empty()).then_some(joined)
}

/// Resolves a possibly relative link against a base URL string.
#[must_use]
pub(crate) fn absolutize(link: &str, base_url: &str) -> String {
    if link.starts_with("http://") || link.starts_with("https://") {
        return link.to_string();
    }
    if let Some(rest) = link.strip_prefix("//") {
        return format!("https://{rest}");
    }
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        link.trim_start_matches('/')
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_one_or_many_accepts_both_shapes() {
        let one: OneOrMany<String> = serde_json::from_str("\"a\"").unwrap();
        let many: OneOrMany<String> = serde_json::from_str("[\"a\",\"b\"]").unwrap();
        assert_eq!(one.first().map(String::as_str), Some("a"));
        assert_eq!(many.into_vec(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_extract_year_accepts_pre_1900_dates() {
        assert_eq!(extract_year("London, 1818."), Some("1818".to_string()));
        assert_eq!(extract_year("2019-05-01"), Some("2019".to_string()));
        assert_eq!(extract_year("n.d."), None);
    }

    #[test]
    fn test_join_authors_skips_blank_names() {
        assert_eq!(
            join_authors(["Shelley, Mary", " ", "Godwin"]),
            Some("Shelley, Mary, Godwin".to_string())
        );
        assert_eq!(join_authors(Vec::<String>::new()), None);
    }

    #[test]
    fn test_absolutize() {
        assert_eq!(absolutize("/bitstream/x.pdf", "https://library.oapen.org/"), "https://library.oapen.org/bitstream/x.pdf");
        assert_eq!(absolutize("https://a.org/b", "https://c.org"), "https://a.org/b");
        assert_eq!(absolutize("//cdn.org/x", "https://c.org"), "https://cdn.org/x");
    }
}
