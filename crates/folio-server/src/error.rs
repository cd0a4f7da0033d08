//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use folio_core::AuthError;
use folio_proxy::ProxyError;
use serde::Serialize;
use thiserror::Error;

/// API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad request.
    #[error("{0}")]
    BadRequest(String),

    /// No route matched.
    #[error("Route not found")]
    RouteNotFound,

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// Proxy pipeline error.
    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ApiError {
    /// HTTP status and machine-readable code.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::RouteNotFound => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            ApiError::Proxy(e) => proxy_status(e),
        }
    }
}

fn proxy_status(err: &ProxyError) -> (StatusCode, &'static str) {
    match err {
        ProxyError::Auth(AuthError::AuthenticationRequired) => {
            (StatusCode::UNAUTHORIZED, "authentication_required")
        }
        ProxyError::Auth(AuthError::InvalidToken(_)) => (StatusCode::UNAUTHORIZED, "invalid_token"),
        ProxyError::Auth(AuthError::UserNotFound) => (StatusCode::UNAUTHORIZED, "user_not_found"),
        ProxyError::Auth(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        ProxyError::MalformedUrl(_) => (StatusCode::BAD_REQUEST, "invalid_url"),
        ProxyError::DomainNotAllowed { .. } => (StatusCode::FORBIDDEN, "domain_not_allowed"),
        ProxyError::ChallengeBlocked { .. } => (StatusCode::FORBIDDEN, "challenge_blocked"),
        ProxyError::UpstreamUnavailable { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, "upstream_unavailable")
        }
        ProxyError::UpstreamRejected { status, .. } => {
            (upstream_error_status(*status), "upstream_error")
        }
        ProxyError::Client(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    }
}

/// Upstream 4xx and 5xx pass through; anything else is a bad gateway.
fn upstream_error_status(status: u16) -> StatusCode {
    match StatusCode::from_u16(status) {
        Ok(status) if status.is_client_error() || status.is_server_error() => status,
        _ => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let suggestion = match &self {
            ApiError::Proxy(e) => e.suggestion().map(str::to_string),
            _ => None,
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
            suggestion,
        };

        (status, axum::Json(body)).into_response()
    }
}

/// Result type for API operations.
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::{LookupError, TokenRejection};

    fn status(err: ProxyError) -> StatusCode {
        ApiError::from(err).status_and_code().0
    }

    #[test]
    fn auth_errors_are_unauthorized() {
        assert_eq!(
            status(AuthError::AuthenticationRequired.into()),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status(AuthError::InvalidToken(TokenRejection::Expired).into()),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(status(AuthError::UserNotFound.into()), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn store_failure_is_internal() {
        let err = AuthError::Lookup(LookupError("disk gone".into()));
        assert_eq!(status(err.into()), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn proxy_outcomes_map_to_statuses() {
        assert_eq!(
            status(ProxyError::DomainNotAllowed { host: "x".into() }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status(ProxyError::ChallengeBlocked {
                provider: "Cloudflare".into()
            }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status(ProxyError::UpstreamUnavailable { attempts: 3 }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status(ProxyError::UpstreamRejected {
                status: 410,
                snippet: String::new()
            }),
            StatusCode::GONE
        );
    }

    #[test]
    fn invalid_upstream_status_becomes_bad_gateway() {
        assert_eq!(
            status(ProxyError::UpstreamRejected {
                status: 42,
                snippet: String::new()
            }),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn upstream_redirect_or_info_status_becomes_bad_gateway() {
        for upstream in [100, 300, 302, 304] {
            assert_eq!(
                status(ProxyError::UpstreamRejected {
                    status: upstream,
                    snippet: String::new()
                }),
                StatusCode::BAD_GATEWAY,
                "upstream status {upstream}"
            );
        }

        assert_eq!(
            status(ProxyError::UpstreamRejected {
                status: 500,
                snippet: String::new()
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
