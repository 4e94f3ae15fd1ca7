//! HTTP API.
//!
//! | Route | Handler |
//! |---|---|
//! | `GET /api/search` | aggregated, readability-annotated search |
//! | `GET /api/catalog/search` | harvested catalog search |
//! | `POST /api/archive/token` | reader token for an archive item |
//! | `POST /api/external/token` | reader token for a non-archive file |
//! | `GET /api/proxy/epub`, `GET /api/proxy/pdf` | streaming proxy |
//! | `GET /healthz` | liveness |

mod error;
mod handlers;

pub use error::{ApiError, StartupError};

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use crate::archive::ReadabilityChecker;
use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::proxy::{DomainAllowlist, StreamingProxy};
use crate::search::Aggregator;
use crate::token::{TokenIssuer, TokenSigner};

/// Shared state behind every handler.
#[derive(Debug)]
pub struct AppState {
    pub aggregator: Aggregator,
    pub catalog: Arc<Catalog>,
    pub checker: ReadabilityChecker,
    pub issuer: TokenIssuer,
    pub proxy: StreamingProxy,
}

impl AppState {
    /// Wires production collaborators from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError`] when the signing secret is missing or an HTTP
    /// client cannot be built.
    pub fn from_config(config: &EngineConfig, catalog: Arc<Catalog>) -> Result<Self, StartupError> {
        let signer = TokenSigner::with_ttl(config.signing_secret_bytes()?, config.token_ttl);
        let checker = ReadabilityChecker::from_config(config)?;
        let allowlist = DomainAllowlist::new(&config.proxy_extra_hosts);
        let proxy = StreamingProxy::new(allowlist.clone())?.with_timeout(config.proxy_timeout);

        Ok(Self {
            aggregator: Aggregator::from_config(config, checker.clone()),
            catalog,
            issuer: TokenIssuer::new(signer, checker.clone(), allowlist),
            checker,
            proxy,
        })
    }
}

/// Builds the API router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/api/search", get(handlers::search))
        .route("/api/catalog/search", get(handlers::catalog_search))
        .route("/api/archive/token", post(handlers::archive_token))
        .route("/api/external/token", post(handlers::external_token))
        .route("/api/proxy/epub", get(handlers::proxy_epub))
        .route("/api/proxy/pdf", get(handlers::proxy_pdf))
        .with_state(state)
}
