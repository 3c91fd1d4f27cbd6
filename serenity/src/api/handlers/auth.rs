//! Login and logout handlers.

use axum::{Json, extract::State};

use crate::{
    AppState,
    api::{
        handlers::db_conn,
        models::{
            auth::{AuthResponse, LoginRequest, LoginResponse, LogoutResponse, MessageResponse},
            users::{CurrentUser, UserResponse},
        },
    },
    auth::{password, session},
    config::Config,
    db::handlers::Users,
    errors::Error,
};

fn invalid_credentials() -> Error {
    // One message for both unknown email and wrong password
    Error::Unauthenticated {
        message: Some("Invalid email or password".to_string()),
    }
}

/// Session cookie carrying the token, valid for the configured timeout.
fn create_session_cookie(token: &str, config: &Config) -> String {
    let session = &config.auth.session;
    let mut cookie = format!(
        "{}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        session.cookie_name,
        session.timeout.as_secs()
    );
    if session.cookie_secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Expired session cookie, instructing the browser to drop the session.
fn clear_session_cookie(config: &Config) -> String {
    let session = &config.auth.session;
    let mut cookie = format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", session.cookie_name);
    if session.cookie_secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Log in with email and password
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
    )
)]
#[tracing::instrument(skip_all, fields(email = %request.email))]
pub async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> Result<LoginResponse, Error> {
    let mut conn = db_conn(&state).await?;
    let mut users = Users::new(&mut conn);

    let user = users.get_user_by_email(&request.email).await?.ok_or_else(invalid_credentials)?;
    let stored_hash = user.password_hash.clone().ok_or_else(invalid_credentials)?;

    let plaintext = request.password;
    let verified = tokio::task::spawn_blocking(move || password::verify_string(&plaintext, &stored_hash))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn password verification task: {e}"),
        })??;
    if !verified {
        return Err(invalid_credentials());
    }

    let current = CurrentUser::from(user.clone());
    let token = session::create_session_token(&current, &state.config)?;
    let cookie = create_session_cookie(&token, &state.config);

    Ok(LoginResponse {
        auth_response: AuthResponse {
            user: UserResponse::from(user),
            token,
            message: "Login successful".to_string(),
        },
        cookie,
    })
}

/// Log out and clear the session cookie
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "authentication",
    responses(
        (status = 200, description = "Logout successful", body = MessageResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn logout(State(state): State<AppState>) -> LogoutResponse {
    LogoutResponse {
        body: MessageResponse {
            message: "Logout successful".to_string(),
        },
        cookie: clear_session_cookie(&state.config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cookie_carries_the_token_and_flags() {
        let mut config = Config {
            secret_key: Some("secret".to_string()),
            ..Default::default()
        };
        config.auth.session.cookie_secure = true;

        let cookie = create_session_cookie("tok123", &config);
        assert!(cookie.starts_with("serenity_session=tok123;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Secure"));

        config.auth.session.cookie_secure = false;
        let cookie = create_session_cookie("tok123", &config);
        assert!(!cookie.contains("Secure"));
    }

    #[test]
    fn clearing_cookie_expires_immediately() {
        let config = Config::default();
        let cookie = clear_session_cookie(&config);
        assert!(cookie.contains("Max-Age=0"));
        assert!(cookie.starts_with("serenity_session=;"));
    }

    #[tokio::test]
    async fn login_with_unreachable_store_is_a_500_not_a_401() {
        // Credential checks need the store; its failure must not be
        // mistaken for bad credentials.
        let server = crate::test_utils::test_server();

        let response = server
            .post("/api/v1/auth/login")
            .json(&serde_json::json!({
                "email": "someone@example.com",
                "password": "whatever123"
            }))
            .await;

        response.assert_status_internal_server_error();
    }

    #[tokio::test]
    async fn logout_clears_the_session_cookie() {
        let server = crate::test_utils::test_server();

        let response = server.post("/api/v1/auth/logout").await;
        response.assert_status_ok();

        let set_cookie = response.header("set-cookie");
        let set_cookie = set_cookie.to_str().unwrap();
        assert!(set_cookie.contains("Max-Age=0"));
    }
}
