//! Request extractor for the authenticated user.
//!
//! Authentication is resolved per handler through this extractor rather than
//! a router-wide middleware layer. Two credential carriers are accepted, in
//! priority order:
//!
//! 1. `Authorization: Bearer <token>` header (API clients)
//! 2. The session cookie set at login (browser clients)
//!
//! The token is self-contained; extraction never touches the database.

use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::instrument;

use crate::{
    AppState,
    api::models::users::CurrentUser,
    auth::session,
    config::Config,
    errors::{Error, Result},
};

/// Extract a bearer token from the Authorization header, if present.
fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Extract the session token from the session cookie if present and valid.
/// Returns:
/// - None: No session cookie present
/// - Some(Ok(user)): Valid token found and verified
/// - Some(Err(error)): Cookie header present but unreadable
#[instrument(skip(parts, config))]
fn try_cookie_session_auth(parts: &Parts, config: &Config) -> Option<Result<CurrentUser>> {
    let cookie_header = parts.headers.get(axum::http::header::COOKIE)?;

    let cookie_str = match cookie_header.to_str() {
        Ok(s) => s,
        Err(e) => {
            return Some(Err(Error::BadRequest {
                message: format!("Invalid cookie header: {e}"),
            }));
        }
    };
    let cookie_name = &config.auth.session.cookie_name;

    for cookie in cookie_str.split(';') {
        let cookie = cookie.trim();
        if let Some((name, value)) = cookie.split_once('=')
            && name == cookie_name
        {
            // Expired or invalid tokens are expected here; keep scanning
            match session::verify_session_token(value, config) {
                Ok(user) => return Some(Ok(user)),
                Err(_) => continue,
            }
        }
    }
    None
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        if let Some(token) = bearer_token(parts) {
            return session::verify_session_token(token, &state.config);
        }

        match try_cookie_session_auth(parts, &state.config) {
            Some(result) => result,
            None => Err(Error::Unauthenticated { message: None }),
        }
    }
}
