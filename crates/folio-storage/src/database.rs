//! High-level database interface.

use std::path::PathBuf;

use directories::ProjectDirs;
use folio_core::auth::{LookupError, ResolvedIdentity, UserLookup};
use tracing::info;

use crate::error::{Result, StorageError};
use crate::models::{NewUser, User};
use crate::pool::ConnectionPool;
use crate::repository::UsersRepo;

/// High-level database interface for Folio.
#[derive(Clone)]
pub struct Database {
    pool: ConnectionPool,
}

impl Database {
    /// Create a new database in the default app data directory.
    pub fn new() -> Result<Self> {
        Self::with_path(Self::default_db_path()?)
    }

    /// Create a new database at a specific path.
    pub fn with_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!("Opening database at: {:?}", path);
        let pool = ConnectionPool::new(&path)?;

        Ok(Self { pool })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let pool = ConnectionPool::in_memory()?;
        Ok(Self { pool })
    }

    /// Get the default database path.
    pub fn default_db_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "folio", "folio")
            .ok_or_else(|| StorageError::Config("Could not determine app data directory".into()))?;

        Ok(proj_dirs.data_dir().join("reading_dashboard.db"))
    }

    // === Users ===

    /// Create a user and return the stored record.
    pub fn create_user(&self, user: NewUser) -> Result<User> {
        let conn = self.pool.get()?;
        let id = UsersRepo::insert(&conn, &user)?;

        UsersRepo::get_by_id(&conn, id)?
            .ok_or_else(|| StorageError::NotFound(format!("user {id}")))
    }

    /// Get a user by ID.
    pub fn find_user_by_id(&self, id: i64) -> Result<Option<User>> {
        let conn = self.pool.get()?;
        UsersRepo::get_by_id(&conn, id)
    }

    /// Get a user by email.
    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.pool.get()?;
        UsersRepo::get_by_email(&conn, email)
    }

    /// Count users.
    pub fn count_users(&self) -> Result<i64> {
        let conn = self.pool.get()?;
        UsersRepo::count(&conn)
    }
}

impl UserLookup for Database {
    fn find_user_by_id(
        &self,
        id: i64,
    ) -> std::result::Result<Option<ResolvedIdentity>, LookupError> {
        Database::find_user_by_id(self, id)
            .map(|user| user.map(ResolvedIdentity::from))
            .map_err(|e| LookupError(e.to_string()))
    }
}
