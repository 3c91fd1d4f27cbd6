//! Authentication: password hashing, JWT sessions, and the request
//! extractor that resolves the current user.

pub mod current_user;
pub mod password;
pub mod session;
