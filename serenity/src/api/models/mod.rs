//! Request/response data structures for API communication.

pub mod auth;
pub mod pagination;
pub mod users;
