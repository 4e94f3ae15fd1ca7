//! Bookloft Core Library
//!
//! Finds open-access books across public catalogs, decides which of them can
//! actually be read in the browser, and streams the files through a signed,
//! allowlisted proxy.
//!
//! # Architecture
//!
//! - [`connector`] - Per-source catalog clients producing [`record::CandidateRecord`]s
//! - [`search`] - Concurrent fan-out, dedup, ranking, and readability annotation
//! - [`identity`] - Canonical keys that collapse the same scan across sources
//! - [`archive`] - Archive.org metadata analysis and live probing
//! - [`token`] - Signed reader tokens and their issuance
//! - [`proxy`] - Allowlisted streaming proxy with manual redirects
//! - [`catalog`] - OAI-PMH harvested catalog
//! - [`server`] - axum HTTP API
//! - [`config`] - Layered engine configuration
//! - [`cache`] - Injected TTL caches

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod archive;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod connector;
pub mod http_client;
pub mod identity;
pub mod proxy;
pub mod record;
pub mod search;
pub mod server;
pub mod token;

mod user_agent;

// Re-export commonly used types
pub use archive::{ReadabilityChecker, ReadabilityResult};
pub use config::{ConfigError, EngineConfig};
pub use connector::{Connector, ConnectorError};
pub use record::{BookFormat, CandidateRecord, Provider, Readable, ReadabilityReason};
pub use search::{Aggregator, SearchOptions, SearchOutcome};
pub use token::{ReaderToken, TokenSigner};
