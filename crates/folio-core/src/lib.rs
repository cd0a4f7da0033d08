//! Folio Core - credential resolution, target validation and page rewriting.
//!
//! This crate holds the I/O-free parts of the reading proxy:
//!
//! - [`auth`] - query-token / header-identity resolution and the JWT codec
//! - [`allowlist`] - target URL validation and the host allowlist
//! - [`charset`] - page encoding detection and decoding to UTF-8
//! - [`challenge`] - anti-bot interstitial detection
//! - [`rewrite`] - frame-directive stripping and base-tag injection
//! - [`chapter`] - chapter number extraction from reading URLs
//! - [`config`] - proxy settings
//!
//! Everything here is built once at startup and shared read-only.

pub mod allowlist;
pub mod auth;
pub mod challenge;
pub mod charset;
pub mod chapter;
pub mod config;
pub mod rewrite;

pub use allowlist::{normalize_host, DomainAllowlist, TargetError, TargetUrl};
pub use auth::{
    AuthError, CredentialSource, JwtCodec, LookupError, ResolvedIdentity, TokenRejection,
    TokenResolver, TokenVerifier, UserLookup, VerifiedClaims,
};
pub use challenge::{ChallengeDetector, ChallengeMarker, CHALLENGE_MARKERS};
pub use charset::{decode_html, DecodedPage};
pub use chapter::{ChapterExtractor, ChapterPattern};
pub use config::{ConfigError, ProxySettings};
pub use rewrite::{ContentRewriter, RewrittenPage, FRAME_HEADERS};
