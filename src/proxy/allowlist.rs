//! Host allowlist for direct-URL proxy requests and redirect hops.

use url::Url;

use super::ProxyError;

/// Primary and CDN domains of every supported source. Subdomains match.
pub const DEFAULT_ALLOWED_DOMAINS: &[&str] = &[
    "gutenberg.org",
    "gutenberg.pglaf.org",
    "gutendex.com",
    "archive.org",
    "openlibrary.org",
    "library.oapen.org",
    "directory.doabooks.org",
    "openstax.org",
    "d3bxy9euw4e147.cloudfront.net",
    "loc.gov",
];

/// Set of hosts the proxy may fetch from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainAllowlist {
    domains: Vec<String>,
}

impl Default for DomainAllowlist {
    fn default() -> Self {
        Self::new(std::iter::empty::<&str>())
    }
}

impl DomainAllowlist {
    /// Default domains plus `extra` hosts (e.g. from `PROXY_EXTRA_HOSTS`).
    #[must_use]
    pub fn new<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut domains: Vec<String> = DEFAULT_ALLOWED_DOMAINS
            .iter()
            .map(|d| normalize_host(d))
            .collect();
        for host in extra {
            let host = normalize_host(host.as_ref());
            if !host.is_empty() && !domains.contains(&host) {
                domains.push(host);
            }
        }
        Self { domains }
    }

    /// Configured domains.
    #[must_use]
    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    /// True when `host` equals an allowed domain or is a subdomain of one.
    #[must_use]
    pub fn is_allowed_host(&self, host: &str) -> bool {
        let host = normalize_host(host);
        if host.is_empty() {
            return false;
        }
        self.domains.iter().any(|domain| {
            host == *domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    /// True when `url` is http(s) and its host is allowed.
    #[must_use]
    pub fn is_allowed_url(&self, url: &Url) -> bool {
        matches!(url.scheme(), "http" | "https") && url.host_str().is_some_and(|h| self.is_allowed_host(h))
    }

    /// Parses and validates a client-supplied URL.
    ///
    /// # Errors
    ///
    /// [`ProxyError::BadRequest`] for unparseable or non-http(s) URLs,
    /// [`ProxyError::DomainNotAllowed`] for hosts outside the list.
    pub fn check(&self, raw: &str) -> Result<Url, ProxyError> {
        let url = Url::parse(raw.trim()).map_err(|_| ProxyError::bad_request("url is not a valid absolute URL"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ProxyError::bad_request("only http and https URLs can be proxied"));
        }
        let host = url.host_str().unwrap_or_default().to_string();
        if !self.is_allowed_host(&host) {
            return Err(ProxyError::DomainNotAllowed { host });
        }
        Ok(url)
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('.').to_ascii_lowercase();
    // Bare IPv6 literals come back from Url::host_str with brackets.
    host.trim_start_matches('[').trim_end_matches(']').to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_subdomains_of_allowed_domains_match() {
        let list = DomainAllowlist::default();
        assert!(list.is_allowed_host("archive.org"));
        assert!(list.is_allowed_host("ia800300.us.archive.org"));
        assert!(list.is_allowed_host("www.gutenberg.org"));
        assert!(list.is_allowed_host("tile.loc.gov"));
        assert!(list.is_allowed_host("ARCHIVE.ORG."));
    }

    #[test]
    fn test_lookalike_hosts_are_rejected() {
        let list = DomainAllowlist::default();
        assert!(!list.is_allowed_host("notarchive.org"));
        assert!(!list.is_allowed_host("archive.org.evil.example"));
        assert!(!list.is_allowed_host(""));
    }

    #[test]
    fn test_extra_hosts_extend_the_list() {
        let list = DomainAllowlist::new([" 127.0.0.1 ", "", "mirror.example.edu"]);
        assert!(list.is_allowed_host("127.0.0.1"));
        assert!(list.is_allowed_host("files.mirror.example.edu"));
        assert_eq!(list.domains().len(), DEFAULT_ALLOWED_DOMAINS.len() + 2);
    }

    #[test]
    fn test_check_rejects_bad_scheme_and_foreign_host() {
        let list = DomainAllowlist::default();
        assert!(matches!(list.check("ftp://archive.org/x"), Err(ProxyError::BadRequest { .. })));
        assert!(matches!(list.check("not a url"), Err(ProxyError::BadRequest { .. })));
        assert!(matches!(
            list.check("https://evil.example/book.epub"),
            Err(ProxyError::DomainNotAllowed { .. })
        ));
        assert!(list.check("https://www.gutenberg.org/ebooks/84.epub3.images").is_ok());
    }
}
