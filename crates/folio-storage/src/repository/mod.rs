//! Database repositories for each table.

pub mod users;

pub use users::UsersRepo;
