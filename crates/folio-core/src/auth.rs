//! Credential resolution for proxied page requests.
//!
//! A request can carry its credential on one of two channels:
//!
//! - an `Authorization: Bearer` header, validated by middleware before the
//!   proxy runs and handed over as an already resolved identity
//! - a `token` query parameter, used by iframe `src` URLs which cannot set
//!   headers, verified here
//!
//! Both channels sit behind [`TokenResolver::resolve`]. Token signing and
//! verification is done by [`JwtCodec`]; the user store is reached through
//! the [`UserLookup`] trait.
//!
//! ## Usage
//!
//! ```
//! use std::sync::Arc;
//! use folio_core::auth::{
//!     JwtCodec, LookupError, ResolvedIdentity, TokenResolver, UserLookup,
//! };
//!
//! struct OneUser;
//!
//! impl UserLookup for OneUser {
//!     fn find_user_by_id(&self, id: i64) -> Result<Option<ResolvedIdentity>, LookupError> {
//!         Ok((id == 7).then(|| ResolvedIdentity {
//!             id: 7,
//!             username: "reader".into(),
//!             email: "reader@example.com".into(),
//!         }))
//!     }
//! }
//!
//! let codec = Arc::new(JwtCodec::new("secret"));
//! let token = codec.issue(7).unwrap();
//!
//! let resolver = TokenResolver::new(codec, Arc::new(OneUser));
//! let identity = resolver.resolve(None, Some(&token)).unwrap();
//! assert_eq!(identity.username, "reader");
//! ```

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Default lifetime of an issued token (7 days).
pub const DEFAULT_TOKEN_TTL_HOURS: u64 = 7 * 24;

/// Upper bound on a configured token lifetime (10 years).
pub const MAX_TOKEN_TTL_HOURS: u64 = 10 * 365 * 24;

/// Authentication errors.
///
/// Token failures are reported to callers as a single `InvalidToken`; the
/// concrete [`TokenRejection`] is kept for logging.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Neither a query token nor a header identity was supplied.
    #[error("authentication required")]
    AuthenticationRequired,

    /// The token was malformed, badly signed, or expired.
    #[error("invalid token")]
    InvalidToken(TokenRejection),

    /// The token was valid but its subject does not exist.
    #[error("user not found")]
    UserNotFound,

    /// The user store could not be queried.
    #[error("user lookup failed: {0}")]
    Lookup(#[from] LookupError),

    /// Token signing failed.
    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// Result type for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Why a token failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    /// Signature valid but the `exp` claim is in the past.
    Expired,
    /// Signature does not match the configured secret.
    BadSignature,
    /// Not a decodable token, or required claims are missing.
    Malformed,
}

impl fmt::Display for TokenRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            TokenRejection::Expired => "expired",
            TokenRejection::BadSignature => "bad_signature",
            TokenRejection::Malformed => "malformed",
        };
        f.write_str(reason)
    }
}

/// Failure reported by a [`UserLookup`] implementation.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct LookupError(pub String);

/// The minimal user projection needed to authorize a proxy fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedIdentity {
    pub id: i64,
    pub username: String,
    pub email: String,
}

/// Claims recovered from a verified token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifiedClaims {
    /// The user id the token was issued for.
    pub subject_id: i64,
    /// When the token stops being accepted.
    pub expires_at: DateTime<Utc>,
}

/// Verifies signed tokens.
pub trait TokenVerifier: Send + Sync {
    /// Checks signature and expiry and returns the embedded claims.
    fn verify(&self, token: &str) -> std::result::Result<VerifiedClaims, TokenRejection>;
}

/// Looks users up by id.
pub trait UserLookup: Send + Sync {
    /// Returns the identity for `id`, or `None` if no such user exists.
    fn find_user_by_id(
        &self,
        id: i64,
    ) -> std::result::Result<Option<ResolvedIdentity>, LookupError>;
}

/// On-the-wire claim set.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    #[serde(rename = "userId")]
    user_id: i64,
    iat: i64,
    exp: i64,
}

/// HS256 token signer and verifier.
#[derive(Clone)]
pub struct JwtCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl fmt::Debug for JwtCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtCodec")
            .field("algorithm", &"HS256")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl JwtCodec {
    /// Create a codec with the default token lifetime.
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self::with_ttl_hours(secret, DEFAULT_TOKEN_TTL_HOURS)
    }

    /// Create a codec whose issued tokens live for `hours`.
    pub fn with_ttl_hours(secret: impl AsRef<[u8]>, hours: u64) -> Self {
        let secret = secret.as_ref();
        let hours = hours.min(MAX_TOKEN_TTL_HOURS) as i64;

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
            ttl: Duration::hours(hours),
        }
    }

    /// Issue a token for `user_id`, valid from now.
    pub fn issue(&self, user_id: i64) -> Result<String> {
        self.issue_at(user_id, Utc::now())
    }

    /// Issue a token as if it had been signed at `issued_at`.
    pub fn issue_at(&self, user_id: i64, issued_at: DateTime<Utc>) -> Result<String> {
        let claims = Claims {
            user_id,
            iat: issued_at.timestamp(),
            exp: (issued_at + self.ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }
}

impl TokenVerifier for JwtCodec {
    fn verify(&self, token: &str) -> std::result::Result<VerifiedClaims, TokenRejection> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenRejection::Expired,
                ErrorKind::InvalidSignature => TokenRejection::BadSignature,
                _ => TokenRejection::Malformed,
            }
        })?;

        let expires_at =
            DateTime::from_timestamp(data.claims.exp, 0).ok_or(TokenRejection::Malformed)?;

        Ok(VerifiedClaims {
            subject_id: data.claims.user_id,
            expires_at,
        })
    }
}

/// Which channel a request's credential arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource<'a> {
    /// Signed token from the `token` query parameter.
    Query(&'a str),
    /// Identity already resolved from the `Authorization` header.
    Header(&'a ResolvedIdentity),
    /// No credential at all.
    Missing,
}

impl<'a> CredentialSource<'a> {
    /// Pick the channel to resolve. A non-empty query token wins.
    ///
    /// An empty `token=` parameter counts as absent: embedding pages emit it
    /// when the client has no stored token.
    pub fn select(
        header_identity: Option<&'a ResolvedIdentity>,
        query_token: Option<&'a str>,
    ) -> Self {
        match query_token.map(str::trim).filter(|t| !t.is_empty()) {
            Some(token) => CredentialSource::Query(token),
            None => header_identity.map_or(CredentialSource::Missing, CredentialSource::Header),
        }
    }
}

/// Resolves a request's credential to a user identity.
#[derive(Clone)]
pub struct TokenResolver {
    verifier: Arc<dyn TokenVerifier>,
    users: Arc<dyn UserLookup>,
}

impl fmt::Debug for TokenResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResolver").finish_non_exhaustive()
    }
}

impl TokenResolver {
    /// Create a resolver from a token verifier and a user store.
    pub fn new(verifier: Arc<dyn TokenVerifier>, users: Arc<dyn UserLookup>) -> Self {
        Self { verifier, users }
    }

    /// Resolve whichever credential the request carries.
    pub fn resolve(
        &self,
        header_identity: Option<&ResolvedIdentity>,
        query_token: Option<&str>,
    ) -> Result<ResolvedIdentity> {
        match CredentialSource::select(header_identity, query_token) {
            CredentialSource::Query(token) => self.resolve_token(token),
            CredentialSource::Header(identity) => Ok(identity.clone()),
            CredentialSource::Missing => Err(AuthError::AuthenticationRequired),
        }
    }

    /// Verify a signed token and load its subject.
    pub fn resolve_token(&self, token: &str) -> Result<ResolvedIdentity> {
        let claims = self.verifier.verify(token).map_err(|reason| {
            warn!(%reason, "Rejected credential");
            AuthError::InvalidToken(reason)
        })?;

        match self.users.find_user_by_id(claims.subject_id)? {
            Some(identity) => Ok(identity),
            None => {
                debug!(user_id = claims.subject_id, "Token subject not found");
                Err(AuthError::UserNotFound)
            }
        }
    }
}
