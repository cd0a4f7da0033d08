//! API request and response models.

use serde::{Deserialize, Serialize};

/// Query parameters for GET /api/books/proxy/iframe.
#[derive(Debug, Default, Deserialize)]
pub struct ProxyQuery {
    /// Page to proxy.
    pub url: Option<String>,
    /// Signed credential; iframes cannot send headers.
    pub token: Option<String>,
}

/// Query parameters for GET /api/books/proxy/extract.
#[derive(Debug, Default, Deserialize)]
pub struct ExtractQuery {
    pub url: Option<String>,
}

/// Response body for GET /api/books/proxy/extract.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractResponse {
    /// Chapter number, or null when the URL carries none.
    pub chapter: Option<i64>,
    pub url: String,
}

/// Response body for GET /api/health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// RFC 3339 server time.
    pub timestamp: String,
}

/// Non-blank query value, trimmed.
pub(crate) fn required(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
