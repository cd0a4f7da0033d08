//! Proxy settings loaded once at startup.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::allowlist::DomainAllowlist;
use crate::auth::DEFAULT_TOKEN_TTL_HOURS;

/// Per-tier fetch timeout in seconds.
pub const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 10;

/// Content-source hosts the proxy fetches from when no config says otherwise.
pub const DEFAULT_ALLOWED_DOMAINS: &[&str] = &[
    // Web fiction
    "royalroad.com",
    "scribblehub.com",
    "webnovel.com",
    "wuxiaworld.com",
    "novelupdates.com",
    "archiveofourown.org",
    "fanfiction.net",
    "wattpad.com",
    // Comics
    "webtoons.com",
    "tapas.io",
    "mangadex.org",
    "asuracomic.net",
    "flamecomics.xyz",
];

/// Errors loading a settings file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Proxy configuration.
///
/// Every field has a default, so an empty JSON object is a valid file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    /// Hosts that may be proxied (a leading `www.` is ignored).
    pub allowed_domains: Vec<String>,
    /// Timeout for each fetch tier.
    pub attempt_timeout_secs: u64,
    /// Keep escalating through the fetch tiers after a challenge page.
    pub escalate_on_challenge: bool,
    /// Lifetime of issued tokens.
    pub token_ttl_hours: u64,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            allowed_domains: DEFAULT_ALLOWED_DOMAINS
                .iter()
                .map(|d| d.to_string())
                .collect(),
            attempt_timeout_secs: DEFAULT_ATTEMPT_TIMEOUT_SECS,
            escalate_on_challenge: true,
            token_ttl_hours: DEFAULT_TOKEN_TTL_HOURS,
        }
    }
}

impl ProxySettings {
    /// Load settings from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&raw)?;

        info!(
            "Loaded proxy settings from {:?} ({} allowed domains)",
            path,
            settings.allowed_domains.len()
        );
        Ok(settings)
    }

    pub fn allowlist(&self) -> DomainAllowlist {
        DomainAllowlist::new(&self.allowed_domains)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let settings = ProxySettings::default();
        assert_eq!(settings.attempt_timeout(), Duration::from_secs(10));
        assert!(settings.escalate_on_challenge);
        assert_eq!(settings.token_ttl_hours, 168);
        assert!(settings.allowlist().is_allowed("https://www.royalroad.com/fiction/1"));
    }

    #[test]
    fn empty_object_uses_defaults() {
        let settings: ProxySettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, ProxySettings::default());
    }

    #[test]
    fn partial_override() {
        let settings: ProxySettings = serde_json::from_str(
            r#"{"allowed_domains": ["example.org"], "escalate_on_challenge": false}"#,
        )
        .unwrap();

        let allowlist = settings.allowlist();
        assert!(allowlist.is_allowed("https://www.example.org/"));
        assert!(!allowlist.is_allowed("https://royalroad.com/"));
        assert!(!settings.escalate_on_challenge);
        assert_eq!(settings.attempt_timeout_secs, DEFAULT_ATTEMPT_TIMEOUT_SECS);
    }

    #[test]
    fn from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"attempt_timeout_secs": 3}}"#).unwrap();

        let settings = ProxySettings::from_file(file.path()).unwrap();
        assert_eq!(settings.attempt_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn from_file_errors() {
        assert!(matches!(
            ProxySettings::from_file("/nonexistent/folio.json"),
            Err(ConfigError::Io(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            ProxySettings::from_file(file.path()),
            Err(ConfigError::Json(_))
        ));
    }
}
