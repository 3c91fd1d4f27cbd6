//! Typed HTTP client for the Serenity REST API.
//!
//! One method per endpoint, all funneled through a single response handler:
//! success bodies deserialize into the API model types, failure bodies are
//! normalized into [`ApiError`] carrying the server's `{"error": ...}` text
//! when present and a per-method fallback message otherwise.
//!
//! [`ApiClient::login`] retains the session token; later calls send it as a
//! bearer credential. No retries, no response caching.

use std::time::Duration;

use reqwest::multipart;
use serde::de::DeserializeOwned;

use crate::api::models::{
    auth::{AuthResponse, ChangePasswordRequest, LoginRequest, MessageResponse},
    users::{UserCreate, UserEnvelope, UserUpdate, UsersListResponse},
};
use crate::types::UserId;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Error returned by every [`ApiClient`] method.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    pub message: String,
}

impl ApiError {
    fn transport(err: reqwest::Error) -> Self {
        Self {
            message: format!("Request failed: {err}"),
        }
    }
}

/// Typed client for the REST API.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a client for a server at `base_url` (scheme + host + port).
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(ApiError::transport)?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.base_url)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Unwrap a response: deserialize success bodies, normalize failures
    /// into an [`ApiError`] with the server message or `fallback`.
    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response, fallback: &str) -> Result<T, ApiError> {
        if response.status().is_success() {
            response.json::<T>().await.map_err(|e| ApiError {
                message: format!("Failed to decode response: {e}"),
            })
        } else {
            let message = response
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|body| body.get("error")?.as_str().map(str::to_string))
                .unwrap_or_else(|| fallback.to_string());
            Err(ApiError { message })
        }
    }

    /// Register a new user account.
    pub async fn register(&self, request: &UserCreate) -> Result<UserEnvelope, ApiError> {
        let response = self
            .http
            .post(self.url("/users"))
            .json(request)
            .send()
            .await
            .map_err(ApiError::transport)?;
        Self::handle_response(response, "Registration failed").await
    }

    /// Log in and retain the session token for subsequent calls.
    pub async fn login(&mut self, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response = self
            .http
            .post(self.url("/auth/login"))
            .json(&request)
            .send()
            .await
            .map_err(ApiError::transport)?;

        let auth: AuthResponse = Self::handle_response(response, "Login failed").await?;
        self.token = Some(auth.token.clone());
        Ok(auth)
    }

    /// Log out server-side and drop the retained session token.
    pub async fn logout(&mut self) -> Result<MessageResponse, ApiError> {
        let response = self
            .authorized(self.http.post(self.url("/auth/logout")))
            .send()
            .await
            .map_err(ApiError::transport)?;
        self.token = None;
        Self::handle_response(response, "Logout failed").await
    }

    /// Fetch the currently authenticated user.
    pub async fn current_user(&self) -> Result<UserEnvelope, ApiError> {
        let response = self
            .authorized(self.http.get(self.url("/users/me")))
            .send()
            .await
            .map_err(ApiError::transport)?;
        Self::handle_response(response, "Failed to fetch current user").await
    }

    /// Update the current user's profile attributes.
    pub async fn update_profile(&self, update: &UserUpdate) -> Result<UserEnvelope, ApiError> {
        let response = self
            .authorized(self.http.put(self.url("/users/me")))
            .json(update)
            .send()
            .await
            .map_err(ApiError::transport)?;
        Self::handle_response(response, "Failed to update profile").await
    }

    /// Change the current user's password.
    pub async fn update_password(&self, current_password: &str, new_password: &str) -> Result<MessageResponse, ApiError> {
        let request = ChangePasswordRequest {
            current_password: current_password.to_string(),
            new_password: new_password.to_string(),
        };
        let response = self
            .authorized(self.http.put(self.url("/users/password")))
            .json(&request)
            .send()
            .await
            .map_err(ApiError::transport)?;
        Self::handle_response(response, "Failed to update password").await
    }

    /// List users with optional pagination.
    pub async fn list_users(&self, skip: Option<i64>, limit: Option<i64>) -> Result<UsersListResponse, ApiError> {
        let mut query: Vec<(&str, i64)> = Vec::new();
        if let Some(skip) = skip {
            query.push(("skip", skip));
        }
        if let Some(limit) = limit {
            query.push(("limit", limit));
        }

        let response = self
            .authorized(self.http.get(self.url("/users")).query(&query))
            .send()
            .await
            .map_err(ApiError::transport)?;
        Self::handle_response(response, "Failed to list users").await
    }

    /// Fetch a user by ID.
    pub async fn get_user(&self, id: UserId) -> Result<UserEnvelope, ApiError> {
        let response = self
            .authorized(self.http.get(self.url(&format!("/users/{id}"))))
            .send()
            .await
            .map_err(ApiError::transport)?;
        Self::handle_response(response, "Failed to fetch user").await
    }

    /// Delete a user by ID.
    pub async fn delete_user(&self, id: UserId) -> Result<MessageResponse, ApiError> {
        let response = self
            .authorized(self.http.delete(self.url(&format!("/users/{id}"))))
            .send()
            .await
            .map_err(ApiError::transport)?;
        Self::handle_response(response, "Failed to delete user").await
    }

    /// Upload a profile picture for the current user.
    pub async fn upload_profile_picture(&self, file_name: &str, bytes: Vec<u8>) -> Result<UserEnvelope, ApiError> {
        let mime = mime_guess::from_path(file_name).first_or_octet_stream();
        let part = multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime.essence_str())
            .map_err(ApiError::transport)?;
        let form = multipart::Form::new().part("profilePicture", part);

        let response = self
            .authorized(self.http.post(self.url("/users/profile-picture")).multipart(form))
            .send()
            .await
            .map_err(ApiError::transport)?;
        Self::handle_response(response, "Failed to upload profile picture").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn install_crypto_provider() {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    }

    fn sample_user_json() -> serde_json::Value {
        json!({
            "id": "7b1c9c1e-45cf-4f8e-a5a4-94e1c2d3e4f5",
            "username": "stillwater",
            "email": "stillwater@example.com",
            "display_name": "Still Water",
            "avatar_url": null,
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z"
        })
    }

    #[tokio::test]
    async fn server_error_message_is_surfaced() {
        install_crypto_provider();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/users"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "X"})))
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri()).unwrap();
        let err = client
            .register(&UserCreate {
                username: "a".to_string(),
                email: "a@example.com".to_string(),
                password: "password123".to_string(),
                display_name: None,
            })
            .await
            .unwrap_err();

        assert_eq!(err.message, "X");
    }

    #[tokio::test]
    async fn missing_error_field_uses_the_method_fallback() {
        install_crypto_provider();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/users"))
            .respond_with(ResponseTemplate::new(500).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri()).unwrap();
        let err = client.list_users(None, None).await.unwrap_err();

        assert_eq!(err.message, "Failed to list users");
    }

    #[tokio::test]
    async fn login_retains_the_token_as_a_bearer_credential() {
        install_crypto_provider();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/login"))
            .and(body_json_string(
                json!({"email": "stillwater@example.com", "password": "password123"}).to_string(),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "user": sample_user_json(),
                "token": "tok123",
                "message": "Login successful"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/users/me"))
            .and(header("authorization", "Bearer tok123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"user": sample_user_json()})))
            .mount(&server)
            .await;

        let mut client = ApiClient::new(server.uri()).unwrap();
        let auth = client.login("stillwater@example.com", "password123").await.unwrap();
        assert_eq!(auth.token, "tok123");

        let me = client.current_user().await.unwrap();
        assert_eq!(me.user.username, "stillwater");
    }

    #[tokio::test]
    async fn pagination_is_sent_as_query_parameters() {
        install_crypto_provider();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/users"))
            .and(query_param("skip", "20"))
            .and(query_param("limit", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"users": [sample_user_json()]})))
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri()).unwrap();
        let listed = client.list_users(Some(20), Some(5)).await.unwrap();
        assert_eq!(listed.users.len(), 1);
    }

    #[tokio::test]
    async fn success_bodies_deserialize_into_typed_models() {
        install_crypto_provider();
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/users/7b1c9c1e-45cf-4f8e-a5a4-94e1c2d3e4f5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "User deleted successfully"})))
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri()).unwrap();
        let id: UserId = "7b1c9c1e-45cf-4f8e-a5a4-94e1c2d3e4f5".parse().unwrap();
        let deleted = client.delete_user(id).await.unwrap();
        assert_eq!(deleted.message, "User deleted successfully");
    }
}
