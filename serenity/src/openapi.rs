//! OpenAPI documentation for the REST API, served through Scalar at `/docs`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::api;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    servers(
        (url = "/api/v1", description = "Serenity REST API")
    ),
    modifiers(&SecurityAddon),
    paths(
        api::handlers::users::register,
        api::handlers::users::list_users,
        api::handlers::users::get_user,
        api::handlers::users::delete_user,
        api::handlers::users::get_current_user,
        api::handlers::users::update_profile,
        api::handlers::users::update_password,
        api::handlers::users::upload_profile_picture,
        api::handlers::auth::login,
        api::handlers::auth::logout,
    ),
    components(
        schemas(
            api::models::users::UserCreate,
            api::models::users::UserUpdate,
            api::models::users::UserResponse,
            api::models::users::UserEnvelope,
            api::models::users::UsersListResponse,
            api::models::users::CurrentUser,
            api::models::auth::LoginRequest,
            api::models::auth::AuthResponse,
            api::models::auth::ChangePasswordRequest,
            api::models::auth::MessageResponse,
        )
    ),
    tags(
        (name = "users", description = "User registration and profile management"),
        (name = "authentication", description = "Session login and logout"),
    )
)]
pub struct ApiDoc;
