//! Folio Proxy - authenticated page proxy for the reading dashboard.
//!
//! Fetches pages from allowlisted content sites on behalf of a signed-in
//! user and rewrites them so they can be shown in an iframe.
//!
//! ## Features
//!
//! - Query-token or header credentials, resolved through [`folio_core::TokenResolver`]
//! - Host allowlist checked before any network access and on every redirect
//! - Pages decoded from their declared charset to UTF-8
//! - Three-tier fetch ladder with decreasing header fingerprints
//! - Anti-bot challenge pages reported as such, never as content
//! - Frame-blocking meta tags stripped and a base tag injected
//!
//! ## Architecture
//!
//! ```text
//! Request → Resolve Credential → Allowlisted? ──no──▶ 403
//!                │                    │
//!              fail                  yes
//!                ▼                    ▼
//!               401            Fetch Ladder (Full → Minimal → Bare)
//!                                     │
//!                     ┌───────────────┼──────────────────┐
//!                     │ Success       │ Challenge        │ Error
//!                     ▼               ▼                  ▼
//!                  Rewrite      ChallengeBlocked    Upstream status / 503
//! ```

mod error;
pub mod fetcher;
pub mod orchestrator;

pub use error::{ProxyError, Result, CHALLENGE_SUGGESTION};
pub use fetcher::{
    FallbackFetcher, FetchAttempt, HeaderProfile, ProxyOutcome, RedirectError,
    BROWSER_USER_AGENT, MAX_REDIRECTS, SNIPPET_CHARS,
};
pub use orchestrator::{ProxiedPage, ProxyOrchestrator, ProxyStage};
