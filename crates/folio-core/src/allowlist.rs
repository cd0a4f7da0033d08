//! Proxy target validation.
//!
//! The proxy only fetches pages from a fixed set of content-source hosts.
//! Hosts are compared after [`normalize_host`], so `www.example.com` and
//! `example.com` are the same entry.

use std::collections::HashSet;

use thiserror::Error;
use url::Url;

/// Reasons a proxy target URL is rejected before any allowlist check.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    /// Not parseable as an absolute URL.
    #[error("invalid url: {0}")]
    Parse(#[from] url::ParseError),

    /// Scheme other than http or https.
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    /// The URL has no host component.
    #[error("url has no host")]
    MissingHost,
}

/// A parsed absolute http(s) URL with its allowlist key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetUrl {
    url: Url,
    normalized_host: String,
}

impl TargetUrl {
    /// Parse and validate a target URL.
    pub fn parse(raw: &str) -> Result<Self, TargetError> {
        Self::from_url(Url::parse(raw.trim())?)
    }

    /// Validate an already parsed URL.
    pub fn from_url(url: Url) -> Result<Self, TargetError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TargetError::UnsupportedScheme(url.scheme().to_string()));
        }

        let normalized_host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .map(normalize_host)
            .ok_or(TargetError::MissingHost)?;

        Ok(Self {
            url,
            normalized_host,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Host with a leading `www.` removed, lowercased.
    pub fn normalized_host(&self) -> &str {
        &self.normalized_host
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

/// Normalizes a hostname for allowlist comparison.
///
/// Lowercases, drops a port and a trailing dot, and strips one leading `www.`.
///
/// # Examples
///
/// ```
/// use folio_core::allowlist::normalize_host;
///
/// assert_eq!(normalize_host("WWW.RoyalRoad.com"), "royalroad.com");
/// assert_eq!(normalize_host("royalroad.com:443"), "royalroad.com");
/// assert_eq!(normalize_host("api.example.com"), "api.example.com");
/// ```
pub fn normalize_host(host: &str) -> String {
    let host = host.trim().to_ascii_lowercase();

    // Bracketed IPv6 literals keep their colons
    let host = if host.starts_with('[') {
        host.as_str()
    } else {
        host.split(':').next().unwrap_or(&host)
    };
    let host = host.trim_end_matches('.');

    host.strip_prefix("www.").unwrap_or(host).to_string()
}

/// Read-only set of hosts the proxy may fetch from.
#[derive(Debug, Clone, Default)]
pub struct DomainAllowlist {
    hosts: HashSet<String>,
}

impl DomainAllowlist {
    /// Build an allowlist from bare hostnames.
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hosts = hosts
            .into_iter()
            .map(|h| normalize_host(h.as_ref()))
            .filter(|h| !h.is_empty())
            .collect();

        Self { hosts }
    }

    /// Checks a raw URL. Unparseable URLs are never allowed.
    pub fn is_allowed(&self, raw_url: &str) -> bool {
        TargetUrl::parse(raw_url)
            .map(|target| self.is_allowed_target(&target))
            .unwrap_or(false)
    }

    /// Checks an already validated target.
    pub fn is_allowed_target(&self, target: &TargetUrl) -> bool {
        self.hosts.contains(target.normalized_host())
    }

    pub fn contains_host(&self, host: &str) -> bool {
        self.hosts.contains(&normalize_host(host))
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Sorted list of entries, for logging.
    pub fn hosts(&self) -> Vec<&str> {
        let mut hosts: Vec<&str> = self.hosts.iter().map(String::as_str).collect();
        hosts.sort_unstable();
        hosts
    }
}
