//! REST API: request handlers and wire models.

pub mod handlers;
pub mod models;
