//! Repository implementations for database access.
//!
//! Each repository wraps a SQLx connection, provides strongly-typed CRUD
//! operations, and returns domain models from [`crate::db::models`]. The
//! common surface lives on the [`Repository`] trait; entity-specific
//! lookups (like fetching a user by email) are inherent methods.

pub mod repository;
pub mod users;

pub use repository::Repository;
pub use users::Users;
