//! Engine configuration.
//!
//! Layers, lowest to highest precedence: built-in defaults, an optional
//! `key = value` config file, environment variables, then CLI flags (applied
//! by the binary). File keys are the lowercase forms of the environment
//! variable names, so `PROBE_BUDGET=10` and `probe_budget = 10` are the same
//! setting.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::RngCore;
use thiserror::Error;
use tracing::warn;

use crate::archive::{DEFAULT_MAX_EPUB_MB, DEFAULT_MAX_PDF_MB, DEFAULT_METADATA_TIMEOUT, DEFAULT_PROBE_TIMEOUT, SizeLimits};
use crate::cache::{DEFAULT_CACHE_MAX_ENTRIES, DEFAULT_CACHE_TTL};
use crate::catalog::{DEFAULT_HARVEST_MAX_PAGES, DEFAULT_OAI_ENDPOINT};
use crate::proxy::DEFAULT_PROXY_TIMEOUT;
use crate::search::{DEFAULT_PROBE_BUDGET, DEFAULT_PROBE_CONCURRENCY, DEFAULT_SOURCE_TIMEOUT};
use crate::token::DEFAULT_TOKEN_TTL;

/// Default listen address.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";

/// Connector names accepted in `SOURCE_TIMEOUT_<SOURCE>_MS`.
pub const KNOWN_SOURCES: &[&str] = &["gutendex", "openlibrary", "archive", "oapen", "doab", "openstax", "loc"];

/// Every environment variable the engine reads (besides per-source timeouts).
const ENV_KEYS: &[&str] = &[
    "BIND_ADDR",
    "APP_ENV",
    "APP_SIGNING_SECRET",
    "MAX_EPUB_MB",
    "MAX_PDF_MB",
    "SOURCE_TIMEOUT_MS",
    "PROBE_TIMEOUT_MS",
    "METADATA_TIMEOUT_MS",
    "PROXY_TIMEOUT_SECS",
    "PROBE_BUDGET",
    "PROBE_CONCURRENCY",
    "CACHE_TTL_SECS",
    "CACHE_MAX_ENTRIES",
    "READER_TOKEN_TTL_DAYS",
    "PROXY_EXTRA_HOSTS",
    "HARVEST_ON_START",
    "HARVEST_MAX_PAGES",
    "HARVEST_ENDPOINT",
];

const TIMEOUT_MS_RANGE: RangeInclusive<u64> = 100..=120_000;

/// Configuration failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config file '{path}': {message}")]
    Read {
        /// File path
        path: PathBuf,
        /// I/O error message
        message: String,
    },

    /// Line is not `key = value`
    #[error("invalid config syntax: expected key = value")]
    Syntax,

    /// Key is not a known setting
    #[error("unknown configuration key: '{key}'")]
    UnknownKey {
        /// Offending key
        key: String,
    },

    /// Value could not be parsed
    #[error("invalid value '{value}' for `{key}`: expected {expected}")]
    InvalidValue {
        /// Setting name
        key: String,
        /// Raw value
        value: String,
        /// Description of the accepted form
        expected: &'static str,
    },

    /// Numeric value outside its allowed range
    #[error("invalid value {value} for `{key}`: expected range {min}..={max}")]
    OutOfRange {
        /// Setting name
        key: String,
        /// Parsed value
        value: u64,
        /// Lower bound
        min: u64,
        /// Upper bound
        max: u64,
    },

    /// No signing secret outside dev mode
    #[error("APP_SIGNING_SECRET is required unless APP_ENV=dev")]
    MissingSecret,

    /// Error on a specific config file line
    #[error("config line {line}: {source}")]
    Line {
        /// 1-based line number
        line: usize,
        /// Underlying error
        #[source]
        source: Box<ConfigError>,
    },
}

impl ConfigError {
    fn invalid(key: &str, value: &str, expected: &'static str) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            expected,
        }
    }

    fn at_line(self, line: usize) -> Self {
        Self::Line {
            line,
            source: Box::new(self),
        }
    }
}

/// Resolved engine settings.
#[derive(Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub bind_addr: SocketAddr,
    /// `APP_ENV=dev`: allows a generated signing secret.
    pub dev_mode: bool,
    pub signing_secret: Option<String>,
    pub max_epub_mb: u64,
    pub max_pdf_mb: u64,
    /// Deadline for sources without an override.
    pub source_timeout: Duration,
    /// Per-source deadline overrides, keyed by lowercase connector name.
    pub source_timeouts: HashMap<String, Duration>,
    pub probe_timeout: Duration,
    pub metadata_timeout: Duration,
    pub proxy_timeout: Duration,
    pub probe_budget: usize,
    pub probe_concurrency: usize,
    pub cache_ttl: Duration,
    pub cache_max_entries: usize,
    pub token_ttl: Duration,
    pub proxy_extra_hosts: Vec<String>,
    pub harvest_on_start: bool,
    pub harvest_max_pages: u32,
    pub harvest_endpoint: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            dev_mode: false,
            signing_secret: None,
            max_epub_mb: DEFAULT_MAX_EPUB_MB,
            max_pdf_mb: DEFAULT_MAX_PDF_MB,
            source_timeout: DEFAULT_SOURCE_TIMEOUT,
            source_timeouts: HashMap::new(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            metadata_timeout: DEFAULT_METADATA_TIMEOUT,
            proxy_timeout: DEFAULT_PROXY_TIMEOUT,
            probe_budget: DEFAULT_PROBE_BUDGET,
            probe_concurrency: DEFAULT_PROBE_CONCURRENCY,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            token_ttl: DEFAULT_TOKEN_TTL,
            proxy_extra_hosts: Vec::new(),
            harvest_on_start: false,
            harvest_max_pages: DEFAULT_HARVEST_MAX_PAGES,
            harvest_endpoint: DEFAULT_OAI_ENDPOINT.to_string(),
        }
    }
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("bind_addr", &self.bind_addr)
            .field("dev_mode", &self.dev_mode)
            .field("signing_secret", &self.signing_secret.as_ref().map(|_| "<redacted>"))
            .field("max_epub_mb", &self.max_epub_mb)
            .field("max_pdf_mb", &self.max_pdf_mb)
            .field("source_timeout", &self.source_timeout)
            .field("source_timeouts", &self.source_timeouts)
            .field("probe_budget", &self.probe_budget)
            .field("probe_concurrency", &self.probe_concurrency)
            .field("proxy_extra_hosts", &self.proxy_extra_hosts)
            .field("harvest_on_start", &self.harvest_on_start)
            .finish_non_exhaustive()
    }
}

impl EngineConfig {
    /// Defaults, then the config file (explicit path, or the default path if
    /// it exists), then the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for unreadable files or invalid values.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        match config_path {
            Some(path) => config.apply_file(path)?,
            None => {
                if let Some(path) = resolve_default_config_path()
                    && path.exists()
                {
                    config.apply_file(&path)?;
                }
            }
        }
        config.apply_lookup(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Reads and applies a `key = value` config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or a [`ConfigError::Line`] wrapping the
    /// first bad line.
    pub fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let raw = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        self.apply_config_str(&raw)
    }

    /// Applies `key = value` lines. `#` starts a comment outside quotes;
    /// string values may be double-quoted.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Line`] for the first bad line.
    pub fn apply_config_str(&mut self, raw: &str) -> Result<(), ConfigError> {
        for (index, raw_line) in raw.lines().enumerate() {
            let line = strip_inline_comment(raw_line).trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigError::Syntax.at_line(index + 1));
            };
            let value = unquote(value.trim());
            self.set(&key.trim().to_ascii_lowercase(), value)
                .map_err(|e| e.at_line(index + 1))?;
        }
        Ok(())
    }

    /// Applies every known variable `lookup` yields a non-empty value for.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for the first invalid value.
    pub fn apply_lookup<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let per_source = KNOWN_SOURCES
            .iter()
            .map(|source| format!("SOURCE_TIMEOUT_{}_MS", source.to_ascii_uppercase()));
        for key in ENV_KEYS.iter().map(|k| (*k).to_string()).chain(per_source) {
            if let Some(value) = lookup(&key).filter(|v| !v.trim().is_empty()) {
                self.set(&key.to_ascii_lowercase(), value.trim())?;
            }
        }
        Ok(())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "bind_addr" => {
                self.bind_addr = value
                    .parse()
                    .map_err(|_| ConfigError::invalid(key, value, "a host:port socket address"))?;
            }
            "app_env" => {
                self.dev_mode = matches!(value.to_ascii_lowercase().as_str(), "dev" | "development");
            }
            "app_signing_secret" => {
                self.signing_secret = Some(value.to_string()).filter(|v| !v.is_empty());
            }
            "max_epub_mb" => self.max_epub_mb = parse_ranged(key, value, 1..=10_000)?,
            "max_pdf_mb" => self.max_pdf_mb = parse_ranged(key, value, 1..=10_000)?,
            "source_timeout_ms" => self.source_timeout = parse_millis(key, value)?,
            "probe_timeout_ms" => self.probe_timeout = parse_millis(key, value)?,
            "metadata_timeout_ms" => self.metadata_timeout = parse_millis(key, value)?,
            "proxy_timeout_secs" => {
                self.proxy_timeout = Duration::from_secs(parse_ranged(key, value, 1..=3600)?);
            }
            "probe_budget" => self.probe_budget = parse_usize(key, value, 0..=200)?,
            "probe_concurrency" => self.probe_concurrency = parse_usize(key, value, 1..=64)?,
            "cache_ttl_secs" => self.cache_ttl = Duration::from_secs(parse_ranged(key, value, 1..=86_400)?),
            "cache_max_entries" => self.cache_max_entries = parse_usize(key, value, 1..=1_000_000)?,
            "reader_token_ttl_days" => {
                self.token_ttl = Duration::from_secs(parse_ranged(key, value, 1..=365)? * 24 * 60 * 60);
            }
            "proxy_extra_hosts" => {
                self.proxy_extra_hosts = value
                    .split(',')
                    .map(str::trim)
                    .filter(|h| !h.is_empty())
                    .map(str::to_ascii_lowercase)
                    .collect();
            }
            "harvest_on_start" => self.harvest_on_start = parse_bool(key, value)?,
            "harvest_max_pages" => {
                let pages = parse_ranged(key, value, 1..=1000)?;
                self.harvest_max_pages = u32::try_from(pages).unwrap_or(u32::MAX);
            }
            "harvest_endpoint" => {
                if !(value.starts_with("http://") || value.starts_with("https://")) {
                    return Err(ConfigError::invalid(key, value, "an http(s) URL"));
                }
                self.harvest_endpoint = value.to_string();
            }
            other => {
                let source = other
                    .strip_prefix("source_timeout_")
                    .and_then(|rest| rest.strip_suffix("_ms"))
                    .filter(|s| !s.is_empty());
                let Some(source) = source else {
                    return Err(ConfigError::UnknownKey { key: other.to_string() });
                };
                let timeout = parse_millis(other, value)?;
                self.source_timeouts.insert(source.to_string(), timeout);
            }
        }
        Ok(())
    }

    /// Deadline for one source: its override, or the shared default.
    #[must_use]
    pub fn source_timeout_for(&self, source: &str) -> Duration {
        self.source_timeouts
            .get(&source.to_ascii_lowercase())
            .copied()
            .unwrap_or(self.source_timeout)
    }

    /// Size caps handed to the file analyzer.
    #[must_use]
    pub fn size_limits(&self) -> SizeLimits {
        SizeLimits::from_megabytes(self.max_epub_mb, self.max_pdf_mb)
    }

    /// Bytes used to sign reader tokens.
    ///
    /// In dev mode a missing secret is replaced by a random one, which
    /// invalidates every token on restart.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingSecret`] outside dev mode.
    pub fn signing_secret_bytes(&self) -> Result<Vec<u8>, ConfigError> {
        if let Some(secret) = self.signing_secret.as_deref() {
            return Ok(secret.as_bytes().to_vec());
        }
        if !self.dev_mode {
            return Err(ConfigError::MissingSecret);
        }
        warn!("APP_SIGNING_SECRET not set; using a random development secret (tokens will not survive restarts)");
        let mut secret = vec![0_u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        Ok(secret)
    }
}

/// Default config file location.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/bookloft/config`
/// 2. `$HOME/.config/bookloft/config`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(xdg).join("bookloft").join("config"));
    }
    let home = env::var_os("HOME").filter(|v| !v.is_empty())?;
    Some(PathBuf::from(home).join(".config").join("bookloft").join("config"))
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn parse_ranged(key: &str, value: &str, range: RangeInclusive<u64>) -> Result<u64, ConfigError> {
    let parsed: u64 = value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(key, value, "a non-negative integer"))?;
    if !range.contains(&parsed) {
        return Err(ConfigError::OutOfRange {
            key: key.to_string(),
            value: parsed,
            min: *range.start(),
            max: *range.end(),
        });
    }
    Ok(parsed)
}

fn parse_usize(key: &str, value: &str, range: RangeInclusive<u64>) -> Result<usize, ConfigError> {
    let parsed = parse_ranged(key, value, range)?;
    usize::try_from(parsed).map_err(|_| ConfigError::invalid(key, value, "a platform-sized integer"))
}

fn parse_millis(key: &str, value: &str) -> Result<Duration, ConfigError> {
    parse_ranged(key, value, TIMEOUT_MS_RANGE).map(Duration::from_millis)
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(key, value, "true or false")),
    }
}
