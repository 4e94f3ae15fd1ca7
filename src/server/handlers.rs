//! Route handlers.

use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use super::{ApiError, AppState};
use crate::catalog::CatalogHit;
use crate::archive::{ReadabilityResult, landing_page_url};
use crate::identity::{archive_id_from_url, is_valid_archive_id, strip_archive_prefixes};
use crate::proxy::{ProxyError, ProxyTarget, UpstreamFile};
use crate::record::{BookFormat, Readable, ReadabilityReason};
use crate::search::{SearchOptions, SearchOutcome};
use crate::token::{ArchiveTokenRequest, ExternalTokenRequest, TokenOutcome};

type SharedState = State<Arc<AppState>>;

// ==================== Query Types ====================

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SearchParams {
    q: Option<String>,
    page: Option<u32>,
    ranked: Option<String>,
    probe: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CatalogParams {
    q: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ProxyParams {
    url: Option<String>,
    token: Option<String>,
    archive: Option<String>,
    file: Option<String>,
}

// ==================== Response Types ====================

#[derive(Debug, Serialize)]
pub(crate) struct SearchResponse {
    ok: bool,
    #[serde(flatten)]
    outcome: SearchOutcome,
}

#[derive(Debug, Serialize)]
pub(crate) struct CatalogResponse {
    ok: bool,
    query: String,
    count: usize,
    results: Vec<CatalogHit>,
}

// ==================== Handlers ====================

pub(crate) async fn healthz() -> &'static str {
    "ok"
}

pub(crate) async fn search(
    State(state): SharedState,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let query = required_query(params.q.as_deref())?;
    let options = SearchOptions {
        page: params.page.unwrap_or(1).max(1),
        ranked: flag(params.ranked.as_deref(), false),
        probe: flag(params.probe.as_deref(), true),
    };
    let outcome = state.aggregator.search(query, options).await;
    Ok(Json(SearchResponse { ok: true, outcome }))
}

pub(crate) async fn catalog_search(
    State(state): SharedState,
    Query(params): Query<CatalogParams>,
) -> Result<Json<CatalogResponse>, ApiError> {
    let query = required_query(params.q.as_deref())?;
    let results = state.catalog.search(query, params.limit);
    Ok(Json(CatalogResponse {
        ok: true,
        query: query.to_string(),
        count: results.len(),
        results,
    }))
}

pub(crate) async fn archive_token(
    State(state): SharedState,
    body: Result<Json<ArchiveTokenRequest>, JsonRejection>,
) -> Result<Json<TokenOutcome>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    Ok(Json(state.issuer.archive_token(&request).await?))
}

pub(crate) async fn external_token(
    State(state): SharedState,
    body: Result<Json<ExternalTokenRequest>, JsonRejection>,
) -> Result<Json<TokenOutcome>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    Ok(Json(state.issuer.external_token(&request).await?))
}

pub(crate) async fn proxy_epub(
    State(state): SharedState,
    Query(params): Query<ProxyParams>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if params.archive.is_some() {
        return Err(ApiError::bad_request("archive items are served through /api/proxy/pdf or a token"));
    }
    let target = proxy_target(&state, &params, BookFormat::Epub)?;
    ensure_direct_archive_url_servable(&state, &target).await?;
    stream(&state, &target, &headers).await
}

pub(crate) async fn proxy_pdf(
    State(state): SharedState,
    Query(params): Query<ProxyParams>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let target = match params.archive.as_deref() {
        Some(archive) => {
            if params.url.is_some() || params.token.is_some() {
                return Err(ProxyError::bad_request("use exactly one of archive, url, or token").into());
            }
            archive_pdf_target(&state, archive, params.file.as_deref()).await?
        }
        None => {
            let target = proxy_target(&state, &params, BookFormat::Pdf)?;
            ensure_direct_archive_url_servable(&state, &target).await?;
            target
        }
    };
    stream(&state, &target, &headers).await
}

// ==================== Helpers ====================

fn required_query(q: Option<&str>) -> Result<&str, ApiError> {
    q.map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::bad_request("query parameter `q` is required"))
}

fn flag(value: Option<&str>, default: bool) -> bool {
    match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

fn proxy_target(state: &AppState, params: &ProxyParams, format: BookFormat) -> Result<ProxyTarget, ProxyError> {
    match (params.token.as_deref(), params.url.as_deref()) {
        (Some(_), Some(_)) => Err(ProxyError::bad_request("use either url or token, not both")),
        (Some(token), None) => {
            let token = token.trim();
            if token.is_empty() {
                return Err(ProxyError::MissingToken);
            }
            Ok(ProxyTarget::Token(state.issuer.signer().decode(token)?))
        }
        (None, Some(url)) => Ok(ProxyTarget::Direct {
            url: url.to_string(),
            format,
        }),
        (None, None) => Err(ProxyError::bad_request("url or token is required")),
    }
}

async fn archive_pdf_target(state: &AppState, archive: &str, file: Option<&str>) -> Result<ProxyTarget, ApiError> {
    let identifier = strip_archive_prefixes(archive);
    if !is_valid_archive_id(identifier) {
        return Err(ApiError::bad_request("archive must be a non-numeric archive.org identifier"));
    }

    let result = servable_archive_item(state, identifier).await?;
    let filename = match file.map(str::trim).filter(|f| !f.is_empty()) {
        Some(file) => {
            if BookFormat::from_path(file) != BookFormat::Pdf || !result.all_files.iter().any(|f| f == file) {
                return Err(ApiError::not_found(
                    "no_usable_files",
                    format!("{file} is not a readable PDF in archive item {identifier}"),
                ));
            }
            file.to_string()
        }
        None => result.best_pdf.ok_or_else(|| {
            ApiError::not_found("no_usable_files", format!("no readable PDF in archive item {identifier}"))
        })?,
    };

    debug!(archive_id = identifier, file = %filename, "resolved archive proxy target");
    Ok(ProxyTarget::Direct {
        url: state.checker.download_url(identifier, &filename),
        format: BookFormat::Pdf,
    })
}

/// Runs the metadata checks for an archive item and refuses items the reader
/// must not serve: DRM-only, borrow-only, dark, or unverifiable.
async fn servable_archive_item(state: &AppState, identifier: &str) -> Result<ReadabilityResult, ApiError> {
    let result = state.checker.check(identifier, false).await;
    if result.encrypted_only {
        return Err(ApiError::forbidden(
            "encrypted_only",
            format!("archive item {identifier} only offers DRM-protected files"),
        ));
    }
    if result.borrow_required {
        return Err(ApiError::forbidden(
            "borrow_required",
            format!("archive item {identifier} must be borrowed at {}", landing_page_url(identifier)),
        ));
    }
    match (result.readable, result.reason) {
        (_, ReadabilityReason::MetadataUnavailable) => Err(ApiError::not_found(
            "metadata_unavailable",
            format!("no metadata for archive item {identifier}"),
        )),
        (Readable::False, _) => Err(ApiError::not_found(
            "no_usable_files",
            format!("no readable file in archive item {identifier}"),
        )),
        _ => Ok(result),
    }
}

/// Direct URLs into an archive.org item get the same checks as `archive=`,
/// and may only name one of the item's unprotected files.
async fn ensure_direct_archive_url_servable(state: &AppState, target: &ProxyTarget) -> Result<(), ApiError> {
    let ProxyTarget::Direct { url, .. } = target else {
        return Ok(());
    };
    let Some(identifier) = archive_id_from_url(url) else {
        return Ok(());
    };
    let result = servable_archive_item(state, &identifier).await?;
    if let Some(file) = archive_file_from_url(url, &identifier)
        && !result.all_files.contains(&file)
    {
        return Err(ApiError::not_found(
            "no_usable_files",
            format!("{file} is not a readable file in archive item {identifier}"),
        ));
    }
    Ok(())
}

/// File path following the identifier in a `/download/<id>/<file>` style URL.
fn archive_file_from_url(url: &str, identifier: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let (_, rest) = parsed.path().split_once(&format!("/{identifier}/"))?;
    let file = urlencoding::decode(rest).ok()?.into_owned();
    (!file.is_empty()).then_some(file)
}

async fn stream(state: &AppState, target: &ProxyTarget, headers: &HeaderMap) -> Result<Response, ApiError> {
    let range = headers.get(RANGE).and_then(|v| v.to_str().ok());
    let upstream = state.proxy.open(target, range).await?;
    info!(status = upstream.status, url = %upstream.final_url, "streaming upstream file");
    into_streaming_response(upstream)
}

fn into_streaming_response(upstream: UpstreamFile) -> Result<Response, ApiError> {
    let status = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::OK);
    let mut builder = Response::builder()
        .status(status)
        .header(CONTENT_TYPE, upstream.content_type.as_str())
        .header(ACCEPT_RANGES, "bytes");
    if let Some(length) = upstream.content_length {
        builder = builder.header(CONTENT_LENGTH, length);
    }
    if let Some(range) = upstream.content_range.as_deref() {
        builder = builder.header(CONTENT_RANGE, range);
    }
    let body = Body::from_stream(upstream.into_response().bytes_stream());
    builder.body(body).map_err(|e| ApiError::Internal {
        message: e.to_string(),
    })
}
