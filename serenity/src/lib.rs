//! Serenity: a small social/support platform backend.
//!
//! The crate exposes user registration, login, profile CRUD and profile
//! picture upload over a REST API under `/api/v1`, backed by PostgreSQL, and
//! ships a typed [`client::ApiClient`] for the same API.
//!
//! The database connection is established lazily: the process starts serving
//! immediately and the first request that needs the store dials it (see
//! [`db::connect::ConnectionCache`]).

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod errors;
pub mod openapi;
pub mod telemetry;
pub mod types;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    routing::{get, post, put},
};
use bon::Builder;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    services::ServeDir,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, info};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use config::Config;
use db::connect::ConnectionCache;
use openapi::ApiDoc;

/// Application state shared across all request handlers.
#[derive(Clone, Builder)]
pub struct AppState {
    /// Lazily-established PostgreSQL pool
    pub db: Arc<ConnectionCache<PgPool>>,
    /// Application configuration loaded from file/environment
    pub config: Config,
}

/// Get the serenity database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Frontend metadata served at the root route.
async fn app_metadata(State(state): State<AppState>) -> Json<config::Metadata> {
    Json(state.config.metadata.clone())
}

/// Build the application router with all endpoints and middleware.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/users", get(api::handlers::users::list_users).post(api::handlers::users::register))
        // Literal segments must be declared before the {id} capture
        .route(
            "/users/me",
            get(api::handlers::users::get_current_user).put(api::handlers::users::update_profile),
        )
        .route("/users/password", put(api::handlers::users::update_password))
        .route("/users/profile-picture", post(api::handlers::users::upload_profile_picture))
        .route(
            "/users/{id}",
            get(api::handlers::users::get_user).delete(api::handlers::users::delete_user),
        )
        .route("/auth/login", post(api::handlers::auth::login))
        .route("/auth/logout", post(api::handlers::auth::logout))
        .with_state(state.clone());

    // Leave headroom over the configured file size for multipart framing
    let body_limit = state.config.uploads.max_file_size as usize + 64 * 1024;
    let upload_dir = state.config.uploads.dir.clone();

    Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/", get(app_metadata))
        .with_state(state)
        .nest("/api/v1", api_routes)
        .nest_service("/uploads", ServeDir::new(upload_dir))
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

/// The assembled application: router plus the configuration it was built
/// from. Construction does not touch the database.
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create a new application instance.
    ///
    /// The connection cache is created here but stays idle until the first
    /// request that needs the store.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let database_url = config
            .database_url
            .clone()
            .ok_or_else(|| anyhow::anyhow!("database_url is not configured"))?;

        let state = AppState::builder()
            .db(Arc::new(ConnectionCache::postgres(database_url)))
            .config(config.clone())
            .build();

        Ok(Self {
            router: build_router(state),
            config,
        })
    }

    /// Start serving the application until `shutdown` resolves.
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("Serenity listening on http://{bind_addr}");

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        // Flush any pending spans before exit
        telemetry::shutdown_telemetry();
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::test_utils::test_server;
    use serde_json::Value;

    #[tokio::test]
    async fn healthz_does_not_need_the_database() {
        let server = test_server();
        let response = server.get("/healthz").await;
        response.assert_status_ok();
        response.assert_text("OK");
    }

    #[tokio::test]
    async fn root_serves_application_metadata() {
        let server = test_server();
        let response = server.get("/").await;
        response.assert_status_ok();

        let body: Value = response.json();
        assert_eq!(body["title"], "Serenity");
        assert_eq!(body["description"], "Find Peace, Share Stories, Seek Support.");
    }

    #[tokio::test]
    async fn unknown_user_route_is_a_404() {
        let server = test_server();
        let response = server.get("/api/v1/users/not-a-uuid/extra").await;
        response.assert_status_not_found();
    }
}
