//! Data models for database entities.

use chrono::{DateTime, Utc};
use folio_core::auth::ResolvedIdentity;
use serde::Serialize;

/// A stored user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The projection handed to the proxy.
impl From<User> for ResolvedIdentity {
    fn from(user: User) -> Self {
        ResolvedIdentity {
            id: user.id,
            username: user.username,
            email: user.email,
        }
    }
}

/// Data for creating a user. The hash is produced by the account service.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}
