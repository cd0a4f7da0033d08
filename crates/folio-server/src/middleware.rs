//! Bearer header identity for the iframe proxy route.
//!
//! Requests that carry `Authorization: Bearer <token>` and no `token` query
//! parameter get the token resolved up front; on success the
//! [`ResolvedIdentity`] is attached to the request extensions. A bad header
//! is ignored rather than rejected. A user store failure is a 500.

use axum::extract::{Query, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use folio_core::{AuthError, ResolvedIdentity};
use folio_proxy::ProxyError;
use tracing::{debug, error};

use crate::error::ApiError;
use crate::models::{required, ProxyQuery};
use crate::state::AppState;

/// Attaches the bearer identity, if any, to the request.
pub async fn attach_identity(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    // The query token wins, so the header is never looked up
    if has_query_token(request.uri()) {
        return next.run(request).await;
    }

    if let Some(token) = bearer_token(request.headers()) {
        match state.resolver.resolve_token(token) {
            Ok(identity) => {
                request.extensions_mut().insert::<ResolvedIdentity>(identity);
            }
            Err(e @ AuthError::Lookup(_)) => {
                error!(error = %e, "User lookup failed for bearer credential");
                return ApiError::Proxy(ProxyError::Auth(e)).into_response();
            }
            Err(e) => debug!(error = %e, "Ignoring bearer credential"),
        }
    }

    next.run(request).await
}

fn has_query_token(uri: &Uri) -> bool {
    Query::<ProxyQuery>::try_from_uri(uri)
        .map(|Query(query)| required(query.token.as_deref()).is_some())
        .unwrap_or(false)
}

/// Token from an `Authorization: Bearer` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
