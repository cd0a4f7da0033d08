//! Error types for the proxy.

use folio_core::{AuthError, TargetError};
use thiserror::Error;

/// Shown to the user when a page sits behind bot detection.
pub const CHALLENGE_SUGGESTION: &str =
    "This site is protected by bot detection and cannot be shown here. Open the link directly in a new tab instead.";

/// Proxy error type.
///
/// Fetch-tier failures never surface individually; only the final
/// classification of the whole ladder does.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Credential missing, invalid, or its user is gone.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Target URL could not be parsed or is not http(s).
    #[error("invalid url: {0}")]
    MalformedUrl(#[from] TargetError),

    /// Target host is not on the allowlist.
    #[error("domain not allowed: {host}")]
    DomainNotAllowed { host: String },

    /// Upstream served an anti-bot challenge instead of content.
    #[error("page blocked by {provider} bot detection")]
    ChallengeBlocked { provider: String },

    /// Every fetch tier failed at the transport level.
    #[error("upstream unreachable after {attempts} attempts")]
    UpstreamUnavailable { attempts: usize },

    /// Upstream answered, but never with a 2xx.
    #[error("upstream returned HTTP {status}")]
    UpstreamRejected { status: u16, snippet: String },

    /// The outbound HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Client(String),
}

impl ProxyError {
    /// User-facing hint for outcomes the user can act on.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            ProxyError::ChallengeBlocked { .. } => Some(CHALLENGE_SUGGESTION),
            _ => None,
        }
    }

    /// Whether the request was refused (as opposed to failing upstream).
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            ProxyError::UpstreamUnavailable { .. }
                | ProxyError::UpstreamRejected { .. }
                | ProxyError::Client(_)
        )
    }
}

/// Result type for proxy operations.
pub type Result<T> = std::result::Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_challenge_has_suggestion() {
        let challenge = ProxyError::ChallengeBlocked {
            provider: "Cloudflare".into(),
        };
        assert_eq!(challenge.suggestion(), Some(CHALLENGE_SUGGESTION));
        assert!(ProxyError::DomainNotAllowed { host: "x".into() }
            .suggestion()
            .is_none());
    }

    #[test]
    fn rejection_vs_failure() {
        assert!(ProxyError::Auth(AuthError::AuthenticationRequired).is_rejection());
        assert!(ProxyError::ChallengeBlocked {
            provider: "Cloudflare".into()
        }
        .is_rejection());
        assert!(!ProxyError::UpstreamUnavailable { attempts: 3 }.is_rejection());
        assert!(!ProxyError::UpstreamRejected {
            status: 404,
            snippet: String::new()
        }
        .is_rejection());
    }

    #[test]
    fn auth_errors_keep_their_message() {
        let err = ProxyError::from(AuthError::UserNotFound);
        assert_eq!(err.to_string(), "user not found");
    }
}
