//! Database layer for data persistence and access.
//!
//! This module implements the data access layer using SQLx with PostgreSQL,
//! following the repository pattern:
//!
//! - [`connect`]: Lazily-initialized, single-flight connection cache
//! - [`handlers`]: Repository implementations for CRUD operations
//! - [`models`]: Database record structures matching table schemas
//! - [`errors`]: Database-specific error types
//!
//! The connection to the backing store is opened on first demand, not at
//! startup. Handlers receive the shared [`connect::ConnectionCache`] through
//! application state and acquire the pool per request.

pub mod connect;
pub mod errors;
pub mod handlers;
pub mod models;
