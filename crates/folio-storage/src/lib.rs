//! Folio Storage - SQLite persistence layer.
//!
//! Holds the user records the proxy resolves credentials against. Account
//! management lives elsewhere; this crate only stores and reads users.
//!
//! # Example
//!
//! ```no_run
//! use folio_storage::{Database, NewUser};
//!
//! let db = Database::in_memory().unwrap();
//!
//! let user = db.create_user(NewUser {
//!     username: "reader".to_string(),
//!     email: "reader@example.com".to_string(),
//!     password_hash: "$argon2id$...".to_string(),
//! }).unwrap();
//!
//! assert!(db.find_user_by_id(user.id).unwrap().is_some());
//! ```

mod database;
pub mod error;
pub mod models;
mod pool;
pub mod repository;
mod schema;

pub use database::Database;
pub use error::{Result, StorageError};
pub use models::{NewUser, User};
pub use pool::ConnectionPool;
pub use repository::UsersRepo;
