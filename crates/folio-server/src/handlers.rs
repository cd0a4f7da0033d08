//! API route handlers.

use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::Utc;
use folio_core::ResolvedIdentity;
use tracing::debug;

use crate::error::{ApiError, Result};
use crate::models::{required, ExtractQuery, ExtractResponse, HealthResponse, ProxyQuery};
use crate::state::AppState;

const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// GET /api/books/proxy/iframe - Fetch a page and rewrite it for embedding.
pub async fn proxy_iframe(
    State(state): State<AppState>,
    identity: Option<Extension<ResolvedIdentity>>,
    Query(query): Query<ProxyQuery>,
) -> Result<Response> {
    let url = required(query.url.as_deref())
        .ok_or_else(|| ApiError::BadRequest("url parameter is required".to_string()))?;

    let page = state
        .proxy
        .proxy(
            url,
            identity.as_ref().map(|Extension(identity)| identity),
            query.token.as_deref(),
        )
        .await?;

    let mut response = page.html.into_response();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(HTML_CONTENT_TYPE));
    for (name, value) in page.headers {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }

    Ok(response)
}

/// GET /api/books/proxy/extract - Extract a chapter number from a URL.
pub async fn extract_chapter(
    State(state): State<AppState>,
    Query(query): Query<ExtractQuery>,
) -> Result<Json<ExtractResponse>> {
    let url = required(query.url.as_deref())
        .ok_or_else(|| ApiError::BadRequest("url parameter is required".to_string()))?;

    let chapter = state
        .proxy
        .extract_chapter(url)
        .map_err(|e| ApiError::Internal(format!("failed to parse url: {}", e)))?;

    debug!(url, ?chapter, "Extracted chapter");

    Ok(Json(ExtractResponse {
        chapter,
        url: url.to_string(),
    }))
}

/// GET /api/health - Liveness check.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Fallback for unknown routes.
pub async fn not_found() -> ApiError {
    ApiError::RouteNotFound
}
