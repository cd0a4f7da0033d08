//! Users repository.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};

use crate::error::{Result, StorageError};
use crate::models::{NewUser, User};

const USER_COLUMNS: &str = "id, username, email, password_hash, created_at, updated_at";

/// Repository for user records.
pub struct UsersRepo;

impl UsersRepo {
    /// Insert a user and return its id.
    pub fn insert(conn: &Connection, user: &NewUser) -> Result<i64> {
        conn.execute(
            "INSERT INTO users (username, email, password_hash) VALUES (?1, ?2, ?3)",
            params![user.username, user.email, user.password_hash],
        )
        .map_err(|e| match e.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => {
                StorageError::Duplicate(format!("user {} / {}", user.username, user.email))
            }
            _ => StorageError::Database(e),
        })?;

        Ok(conn.last_insert_rowid())
    }

    /// Get a user by ID.
    pub fn get_by_id(conn: &Connection, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
        let user = conn.query_row(&sql, [id], Self::row_to_user).optional()?;
        Ok(user)
    }

    /// Get a user by email address.
    pub fn get_by_email(conn: &Connection, email: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1");
        let user = conn.query_row(&sql, [email], Self::row_to_user).optional()?;
        Ok(user)
    }

    /// Count users.
    pub fn count(conn: &Connection) -> Result<i64> {
        let count = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count)
    }

    fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            created_at: parse_datetime(&row.get::<_, String>(4)?),
            updated_at: parse_datetime(&row.get::<_, String>(5)?),
        })
    }
}

/// Parse a datetime from SQLite format.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|dt| dt.and_utc())
        })
        .unwrap_or_else(|_| Utc::now())
}
