//! Escalating upstream fetch.
//!
//! A page is requested with up to three header profiles, most browser-like
//! first. Some sites reject the full browser disguise but accept a plain
//! request, so each failure moves one tier down:
//!
//! ```text
//! Full ──fail──▶ Minimal ──fail──▶ Bare ──fail──▶ classify
//!  │               │                 │
//!  └── 2xx, no challenge ───────────────────────▶ Success
//! ```
//!
//! Tiers run strictly one after another and the first usable response wins.
//! Every response body is decoded to UTF-8 from its declared charset and goes
//! through [`ChallengeDetector`] before it counts as usable. Dropping the
//! future returned by [`FallbackFetcher::fetch`] aborts the in-flight request
//! and no later tier is started.
//!
//! Redirects are followed only to hosts on the [`DomainAllowlist`]. A hop
//! anywhere else ends the whole fetch with [`ProxyOutcome::RedirectBlocked`].

use std::error::Error as _;
use std::time::Duration;

use folio_core::{decode_html, ChallengeDetector, DomainAllowlist, ProxySettings, TargetUrl};
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, CACHE_CONTROL,
    CONTENT_TYPE, REFERER, USER_AGENT,
};
use reqwest::redirect::{Attempt, Policy};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{ProxyError, Result};

/// Desktop browser user agent sent by the header-bearing profiles.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const BROWSER_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";
const BROWSER_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";
const BROWSER_ACCEPT_ENCODING: &str = "gzip, deflate, br";

/// Redirect hops followed per attempt.
pub const MAX_REDIRECTS: usize = 10;

/// Characters of a non-2xx body kept for diagnostics.
pub const SNIPPET_CHARS: usize = 500;

/// Request headers sent by one fetch tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderProfile {
    /// Browser user agent, accept headers, referer and no-cache.
    Full,
    /// Browser user agent and accept headers only.
    Minimal,
    /// Nothing beyond what the HTTP client adds itself.
    Bare,
}

impl HeaderProfile {
    pub fn name(&self) -> &'static str {
        match self {
            HeaderProfile::Full => "full",
            HeaderProfile::Minimal => "minimal",
            HeaderProfile::Bare => "bare",
        }
    }

    /// Headers for a request to `target`.
    pub fn headers(&self, target: &Url) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if matches!(self, HeaderProfile::Full | HeaderProfile::Minimal) {
            headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
            headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
            headers.insert(
                ACCEPT_LANGUAGE,
                HeaderValue::from_static(BROWSER_ACCEPT_LANGUAGE),
            );
        }

        if *self == HeaderProfile::Full {
            headers.insert(
                ACCEPT_ENCODING,
                HeaderValue::from_static(BROWSER_ACCEPT_ENCODING),
            );
            let referer = format!("{}/", target.origin().ascii_serialization());
            if let Ok(value) = HeaderValue::from_str(&referer) {
                headers.insert(REFERER, value);
            }
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        }

        headers
    }
}

/// One rung of the fetch ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchAttempt {
    pub profile: HeaderProfile,
    pub timeout: Duration,
}

impl FetchAttempt {
    /// Full, Minimal, Bare, each with `timeout`.
    pub fn ladder(timeout: Duration) -> Vec<FetchAttempt> {
        [HeaderProfile::Full, HeaderProfile::Minimal, HeaderProfile::Bare]
            .into_iter()
            .map(|profile| FetchAttempt { profile, timeout })
            .collect()
    }
}

/// Why a redirect was not followed.
#[derive(Debug, Error)]
pub enum RedirectError {
    #[error("too many redirects")]
    TooMany,

    #[error("redirect to a host that is not allowed: {host}")]
    NotAllowed { host: String },
}

/// Classification of a whole fetch ladder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyOutcome {
    /// A 2xx response that is not a challenge page.
    Success { html: String, final_url: Url },
    /// At least one tier returned a challenge page.
    ChallengeBlocked { provider: String },
    /// No challenge, but at least one tier got a non-2xx answer.
    /// Carries the last one seen.
    UpstreamError { status: u16, body_snippet: String },
    /// Every tier failed before a response arrived.
    NetworkFailure { attempts: usize },
    /// Upstream redirected to a host outside the allowlist.
    RedirectBlocked { host: String },
}

impl ProxyOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProxyOutcome::Success { .. })
    }

    /// Converts a failed outcome into its error; success yields the page.
    pub fn into_result(self) -> Result<(String, Url)> {
        match self {
            ProxyOutcome::Success { html, final_url } => Ok((html, final_url)),
            ProxyOutcome::ChallengeBlocked { provider } => {
                Err(ProxyError::ChallengeBlocked { provider })
            }
            ProxyOutcome::UpstreamError {
                status,
                body_snippet,
            } => Err(ProxyError::UpstreamRejected {
                status,
                snippet: body_snippet,
            }),
            ProxyOutcome::NetworkFailure { attempts } => {
                Err(ProxyError::UpstreamUnavailable { attempts })
            }
            ProxyOutcome::RedirectBlocked { host } => Err(ProxyError::DomainNotAllowed { host }),
        }
    }
}

/// Result of a single tier.
enum AttemptResult {
    Usable { html: String, final_url: Url },
    Rejected { status: StatusCode, body: String },
    Blocked { host: String },
    Transport(reqwest::Error),
}

/// Runs the fetch ladder against upstream sites.
#[derive(Debug, Clone)]
pub struct FallbackFetcher {
    client: Client,
    allowlist: DomainAllowlist,
    attempts: Vec<FetchAttempt>,
    detector: ChallengeDetector,
    escalate_on_challenge: bool,
}

impl FallbackFetcher {
    /// Fetcher using the allowlist, default ladder and policy from `settings`.
    pub fn new(settings: &ProxySettings) -> Result<Self> {
        Self::with_attempts(
            FetchAttempt::ladder(settings.attempt_timeout()),
            settings.allowlist(),
            ChallengeDetector::new(),
            settings.escalate_on_challenge,
        )
    }

    pub fn with_attempts(
        attempts: Vec<FetchAttempt>,
        allowlist: DomainAllowlist,
        detector: ChallengeDetector,
        escalate_on_challenge: bool,
    ) -> Result<Self> {
        let client = Client::builder()
            .redirect(redirect_policy(allowlist.clone()))
            .build()
            .map_err(|e| ProxyError::Client(e.to_string()))?;

        Ok(Self {
            client,
            allowlist,
            attempts,
            detector,
            escalate_on_challenge,
        })
    }

    pub fn attempts(&self) -> &[FetchAttempt] {
        &self.attempts
    }

    /// Hosts this fetcher may contact, including redirect targets.
    pub fn allowlist(&self) -> &DomainAllowlist {
        &self.allowlist
    }

    /// Fetches `url`, escalating through the ladder until a tier succeeds.
    ///
    /// After the ladder is exhausted the outcome is, in order of precedence:
    /// `ChallengeBlocked` if any tier saw a challenge, `UpstreamError` with
    /// the last non-2xx status, otherwise `NetworkFailure`. With challenge
    /// escalation off, the first challenge page ends the ladder. A redirect to
    /// a host off the allowlist ends it immediately with `RedirectBlocked`.
    pub async fn fetch(&self, url: &Url) -> ProxyOutcome {
        let mut challenge: Option<&'static str> = None;
        let mut last_rejection: Option<(StatusCode, String)> = None;
        let mut tried = 0;

        for (tier, attempt) in self.attempts.iter().enumerate() {
            tried += 1;
            let profile = attempt.profile.name();
            debug!(tier, profile, url = %url, "Fetching upstream page");

            match self.send(url, attempt).await {
                AttemptResult::Usable { html, final_url } => {
                    if let Some(provider) = self.detector.detect(&html) {
                        info!(tier, profile, provider, url = %url, "Challenge page detected");
                        challenge = Some(provider);
                        if !self.escalate_on_challenge {
                            break;
                        }
                        continue;
                    }

                    debug!(tier, profile, final_url = %final_url, bytes = html.len(), "Fetched page");
                    return ProxyOutcome::Success { html, final_url };
                }
                AttemptResult::Rejected { status, body } => {
                    // Challenge interstitials are often served as 403 or 503
                    if let Some(provider) = self.detector.detect(&body) {
                        info!(tier, profile, provider, %status, url = %url, "Challenge page detected");
                        challenge = Some(provider);
                        if !self.escalate_on_challenge {
                            break;
                        }
                    } else {
                        debug!(tier, profile, %status, url = %url, "Upstream rejected request");
                    }
                    last_rejection = Some((status, body));
                }
                AttemptResult::Blocked { host } => {
                    warn!(
                        tier,
                        profile,
                        host = %host,
                        url = %url,
                        "Redirect to disallowed host refused"
                    );
                    return ProxyOutcome::RedirectBlocked { host };
                }
                AttemptResult::Transport(e) => {
                    debug!(tier, profile, error = %e, url = %url, "Upstream request failed");
                }
            }
        }

        let outcome = if let Some(provider) = challenge {
            ProxyOutcome::ChallengeBlocked {
                provider: provider.to_string(),
            }
        } else if let Some((status, body)) = last_rejection {
            ProxyOutcome::UpstreamError {
                status: status.as_u16(),
                body_snippet: snippet(&body),
            }
        } else {
            ProxyOutcome::NetworkFailure { attempts: tried }
        };

        warn!(url = %url, outcome = outcome_kind(&outcome), "All fetch tiers failed");
        outcome
    }

    async fn send(&self, url: &Url, attempt: &FetchAttempt) -> AttemptResult {
        let response = match self
            .client
            .get(url.clone())
            .headers(attempt.profile.headers(url))
            .timeout(attempt.timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return match refused_redirect(&e) {
                    Some(host) => AttemptResult::Blocked { host },
                    None => AttemptResult::Transport(e),
                }
            }
        };

        let status = response.status();
        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => return AttemptResult::Transport(e),
        };

        let page = decode_html(&bytes, content_type.as_deref());
        if page.had_errors {
            debug!(
                encoding = page.encoding.name(),
                url = %final_url,
                "Page has bytes invalid in its encoding"
            );
        }

        if status.is_success() {
            AttemptResult::Usable {
                html: page.html,
                final_url,
            }
        } else {
            AttemptResult::Rejected {
                status,
                body: page.html,
            }
        }
    }
}

/// Follows at most [`MAX_REDIRECTS`] hops, and only to allowlisted hosts.
fn redirect_policy(allowlist: DomainAllowlist) -> Policy {
    Policy::custom(move |attempt| match check_redirect(&allowlist, &attempt) {
        Ok(()) => attempt.follow(),
        Err(e) => attempt.error(e),
    })
}

fn check_redirect(
    allowlist: &DomainAllowlist,
    attempt: &Attempt<'_>,
) -> std::result::Result<(), RedirectError> {
    if attempt.previous().len() > MAX_REDIRECTS {
        return Err(RedirectError::TooMany);
    }

    let next = attempt.url();
    match TargetUrl::from_url(next.clone()) {
        Ok(target) if allowlist.is_allowed_target(&target) => Ok(()),
        Ok(target) => Err(RedirectError::NotAllowed {
            host: target.normalized_host().to_string(),
        }),
        Err(_) => Err(RedirectError::NotAllowed {
            host: next.host_str().unwrap_or_default().to_string(),
        }),
    }
}

/// Host of the redirect the policy refused, if that is why `error` happened.
fn refused_redirect(error: &reqwest::Error) -> Option<String> {
    let mut source = error.source();
    while let Some(cause) = source {
        if let Some(RedirectError::NotAllowed { host }) = cause.downcast_ref::<RedirectError>() {
            return Some(host.clone());
        }
        source = cause.source();
    }
    None
}

fn snippet(body: &str) -> String {
    body.chars().take(SNIPPET_CHARS).collect()
}

fn outcome_kind(outcome: &ProxyOutcome) -> &'static str {
    match outcome {
        ProxyOutcome::Success { .. } => "success",
        ProxyOutcome::ChallengeBlocked { .. } => "challenge_blocked",
        ProxyOutcome::UpstreamError { .. } => "upstream_error",
        ProxyOutcome::NetworkFailure { .. } => "network_failure",
        ProxyOutcome::RedirectBlocked { .. } => "redirect_blocked",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> Url {
        Url::parse("https://www.royalroad.com/fiction/1/chapter-2").unwrap()
    }

    // ==================== Header Profile Tests ====================

    #[test]
    fn full_profile_headers() {
        let headers = HeaderProfile::Full.headers(&target());

        assert_eq!(headers[USER_AGENT], BROWSER_USER_AGENT);
        assert_eq!(headers[REFERER], "https://www.royalroad.com/");
        assert_eq!(headers[CACHE_CONTROL], "no-cache");
        assert_eq!(headers[ACCEPT_ENCODING], BROWSER_ACCEPT_ENCODING);
        assert!(headers.contains_key(ACCEPT));
        assert!(headers.contains_key(ACCEPT_LANGUAGE));
    }

    #[test]
    fn minimal_profile_headers() {
        let headers = HeaderProfile::Minimal.headers(&target());

        assert_eq!(headers.len(), 3);
        assert!(headers.contains_key(USER_AGENT));
        assert!(!headers.contains_key(REFERER));
        assert!(!headers.contains_key(CACHE_CONTROL));
    }

    #[test]
    fn bare_profile_has_no_headers() {
        assert!(HeaderProfile::Bare.headers(&target()).is_empty());
    }

    #[test]
    fn referer_keeps_port() {
        let url = Url::parse("http://127.0.0.1:8080/a/b").unwrap();
        let headers = HeaderProfile::Full.headers(&url);
        assert_eq!(headers[REFERER], "http://127.0.0.1:8080/");
    }

    // ==================== Ladder Tests ====================

    #[test]
    fn default_ladder() {
        let ladder = FetchAttempt::ladder(Duration::from_secs(10));
        let profiles: Vec<_> = ladder.iter().map(|a| a.profile).collect();

        assert_eq!(
            profiles,
            vec![HeaderProfile::Full, HeaderProfile::Minimal, HeaderProfile::Bare]
        );
        assert!(ladder.iter().all(|a| a.timeout == Duration::from_secs(10)));
    }

    #[test]
    fn fetcher_uses_settings() {
        let settings = ProxySettings {
            attempt_timeout_secs: 4,
            ..ProxySettings::default()
        };
        let fetcher = FallbackFetcher::new(&settings).unwrap();

        assert_eq!(fetcher.attempts().len(), 3);
        assert_eq!(fetcher.attempts()[0].timeout, Duration::from_secs(4));
        assert!(fetcher.allowlist().contains_host("royalroad.com"));
    }

    // ==================== Outcome Tests ====================

    #[test]
    fn snippet_truncates_on_char_boundary() {
        let body = "é".repeat(SNIPPET_CHARS + 20);
        let cut = snippet(&body);
        assert_eq!(cut.chars().count(), SNIPPET_CHARS);
    }

    #[test]
    fn outcome_into_result() {
        let ok = ProxyOutcome::Success {
            html: "<p>x</p>".into(),
            final_url: target(),
        };
        assert!(ok.is_success());
        assert_eq!(ok.into_result().unwrap().0, "<p>x</p>");

        let blocked = ProxyOutcome::ChallengeBlocked {
            provider: "Cloudflare".into(),
        };
        assert!(matches!(
            blocked.into_result(),
            Err(ProxyError::ChallengeBlocked { provider }) if provider == "Cloudflare"
        ));

        let network = ProxyOutcome::NetworkFailure { attempts: 3 };
        assert!(matches!(
            network.into_result(),
            Err(ProxyError::UpstreamUnavailable { attempts: 3 })
        ));

        let redirected = ProxyOutcome::RedirectBlocked {
            host: "localhost".into(),
        };
        assert!(matches!(
            redirected.into_result(),
            Err(ProxyError::DomainNotAllowed { host }) if host == "localhost"
        ));
    }
}
