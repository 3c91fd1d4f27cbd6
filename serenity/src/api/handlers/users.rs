//! User resource handlers: registration, listing, lookup, profile
//! management and profile picture upload.

use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
};
use uuid::Uuid;

use crate::{
    AppState,
    api::{
        handlers::db_conn,
        models::{
            auth::MessageResponse,
            pagination::Pagination,
            users::{CurrentUser, UserCreate, UserEnvelope, UserResponse, UserUpdate, UsersListResponse},
        },
    },
    auth::password,
    db::{
        handlers::{Repository, Users, users::UserFilter},
        models::users::{UserCreateDBRequest, UserUpdateDBRequest},
    },
    errors::Error,
    types::UserId,
};

/// Reject passwords outside the configured length bounds.
///
/// Runs before any database work so malformed registrations never cost a
/// connection.
fn validate_password(password: &str, state: &AppState) -> Result<(), Error> {
    let bounds = &state.config.auth.password;
    if password.len() < bounds.min_length {
        return Err(Error::BadRequest {
            message: format!("Password must be at least {} characters", bounds.min_length),
        });
    }
    if password.len() > bounds.max_length {
        return Err(Error::BadRequest {
            message: format!("Password must be no more than {} characters", bounds.max_length),
        });
    }
    Ok(())
}

/// Register a new user account
#[utoipa::path(
    post,
    path = "/users",
    request_body = UserCreate,
    tag = "users",
    responses(
        (status = 200, description = "User registered successfully", body = UserEnvelope),
        (status = 400, description = "Invalid input or email already registered"),
    )
)]
#[tracing::instrument(skip_all, fields(email = %request.email))]
pub async fn register(State(state): State<AppState>, Json(request): Json<UserCreate>) -> Result<Json<UserEnvelope>, Error> {
    validate_password(&request.password, &state)?;

    let mut conn = db_conn(&state).await?;
    let mut users = Users::new(&mut conn);

    if users.get_user_by_email(&request.email).await?.is_some() {
        return Err(Error::BadRequest {
            message: "User with this email already exists!".to_string(),
        });
    }

    // Hash on a blocking thread; argon2 is deliberately slow
    let plaintext = request.password.clone();
    let password_hash = tokio::task::spawn_blocking(move || password::hash_string(&plaintext))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn password hashing task: {e}"),
        })??;

    // A registration racing past the pre-check still hits the unique
    // constraint; that maps to the same 400 as the pre-check.
    let created = users
        .create(&UserCreateDBRequest {
            username: request.username,
            email: request.email,
            display_name: request.display_name,
            avatar_url: None,
            password_hash: Some(password_hash),
        })
        .await?;

    Ok(Json(UserEnvelope {
        user: UserResponse::from(created),
    }))
}

/// List users with pagination
#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    params(Pagination),
    responses(
        (status = 200, description = "List of users", body = UsersListResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_users(State(state): State<AppState>, Query(pagination): Query<Pagination>) -> Result<Json<UsersListResponse>, Error> {
    let mut conn = db_conn(&state).await?;
    let mut users = Users::new(&mut conn);

    let listed = users.list(&UserFilter::new(pagination.skip(), pagination.limit())).await?;

    Ok(Json(UsersListResponse {
        users: listed.into_iter().map(UserResponse::from).collect(),
    }))
}

/// Get a user by ID
#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "users",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "The user", body = UserEnvelope),
        (status = 404, description = "User not found"),
    )
)]
#[tracing::instrument(skip_all, fields(user_id = %id))]
pub async fn get_user(State(state): State<AppState>, Path(id): Path<UserId>) -> Result<Json<UserEnvelope>, Error> {
    let mut conn = db_conn(&state).await?;
    let mut users = Users::new(&mut conn);

    let user = users.get_by_id(id).await?.ok_or_else(|| Error::NotFound {
        resource: "User".to_string(),
        id: id.to_string(),
    })?;

    Ok(Json(UserEnvelope {
        user: UserResponse::from(user),
    }))
}

/// Delete a user by ID
#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = "users",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User deleted", body = MessageResponse),
        (status = 404, description = "User not found"),
    )
)]
#[tracing::instrument(skip_all, fields(user_id = %id))]
pub async fn delete_user(State(state): State<AppState>, Path(id): Path<UserId>) -> Result<Json<MessageResponse>, Error> {
    let mut conn = db_conn(&state).await?;
    let mut users = Users::new(&mut conn);

    if !users.delete(id).await? {
        return Err(Error::NotFound {
            resource: "User".to_string(),
            id: id.to_string(),
        });
    }

    Ok(Json(MessageResponse {
        message: "User deleted successfully".to_string(),
    }))
}

/// Get the currently authenticated user
#[utoipa::path(
    get,
    path = "/users/me",
    tag = "users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "The current user", body = UserEnvelope),
        (status = 401, description = "Not authenticated"),
    )
)]
#[tracing::instrument(skip_all, fields(user_id = %current.id))]
pub async fn get_current_user(State(state): State<AppState>, current: CurrentUser) -> Result<Json<UserEnvelope>, Error> {
    let mut conn = db_conn(&state).await?;
    let mut users = Users::new(&mut conn);

    // The token can outlive the account
    let user = users.get_by_id(current.id).await?.ok_or_else(|| Error::NotFound {
        resource: "User".to_string(),
        id: current.id.to_string(),
    })?;

    Ok(Json(UserEnvelope {
        user: UserResponse::from(user),
    }))
}

/// Update the current user's profile
#[utoipa::path(
    put,
    path = "/users/me",
    request_body = UserUpdate,
    tag = "users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Profile updated", body = UserEnvelope),
        (status = 401, description = "Not authenticated"),
    )
)]
#[tracing::instrument(skip_all, fields(user_id = %current.id))]
pub async fn update_profile(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(request): Json<UserUpdate>,
) -> Result<Json<UserEnvelope>, Error> {
    let mut conn = db_conn(&state).await?;
    let mut users = Users::new(&mut conn);

    let updated = users
        .update(
            current.id,
            &UserUpdateDBRequest {
                display_name: request.display_name,
                avatar_url: request.avatar_url,
                ..Default::default()
            },
        )
        .await?;

    Ok(Json(UserEnvelope {
        user: UserResponse::from(updated),
    }))
}

/// Change the current user's password
#[utoipa::path(
    put,
    path = "/users/password",
    request_body = crate::api::models::auth::ChangePasswordRequest,
    tag = "users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Current password incorrect or new password invalid"),
        (status = 401, description = "Not authenticated"),
    )
)]
#[tracing::instrument(skip_all, fields(user_id = %current.id))]
pub async fn update_password(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(request): Json<crate::api::models::auth::ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, Error> {
    validate_password(&request.new_password, &state)?;

    let mut conn = db_conn(&state).await?;
    let mut users = Users::new(&mut conn);

    let user = users.get_by_id(current.id).await?.ok_or_else(|| Error::NotFound {
        resource: "User".to_string(),
        id: current.id.to_string(),
    })?;

    let stored_hash = user.password_hash.ok_or_else(|| Error::BadRequest {
        message: "This account has no password set".to_string(),
    })?;

    let current_password = request.current_password;
    let verified = tokio::task::spawn_blocking(move || password::verify_string(&current_password, &stored_hash))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn password verification task: {e}"),
        })??;
    if !verified {
        return Err(Error::BadRequest {
            message: "Current password is incorrect".to_string(),
        });
    }

    let new_password = request.new_password;
    let new_hash = tokio::task::spawn_blocking(move || password::hash_string(&new_password))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn password hashing task: {e}"),
        })??;

    users
        .update(
            current.id,
            &UserUpdateDBRequest {
                password_hash: Some(new_hash),
                ..Default::default()
            },
        )
        .await?;

    Ok(Json(MessageResponse {
        message: "Password updated successfully".to_string(),
    }))
}

/// File extension to persist an upload under, from the client's filename.
fn upload_extension(file_name: Option<&str>) -> String {
    file_name
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "bin".to_string())
}

/// Upload a profile picture for the current user
#[utoipa::path(
    post,
    path = "/users/profile-picture",
    tag = "users",
    security(("bearer_auth" = [])),
    request_body(content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Profile picture updated", body = UserEnvelope),
        (status = 400, description = "Missing or oversized file"),
        (status = 401, description = "Not authenticated"),
    )
)]
#[tracing::instrument(skip_all, fields(user_id = %current.id))]
pub async fn upload_profile_picture(
    State(state): State<AppState>,
    current: CurrentUser,
    mut multipart: Multipart,
) -> Result<Json<UserEnvelope>, Error> {
    let mut upload: Option<(String, axum::body::Bytes)> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| Error::BadRequest {
        message: format!("Invalid multipart body: {e}"),
    })? {
        if field.name() != Some("profilePicture") {
            continue;
        }
        let extension = upload_extension(field.file_name());
        let bytes = field.bytes().await.map_err(|e| Error::BadRequest {
            message: format!("Failed to read uploaded file: {e}"),
        })?;
        upload = Some((extension, bytes));
        break;
    }

    let (extension, bytes) = upload.ok_or_else(|| Error::BadRequest {
        message: "No profilePicture file provided".to_string(),
    })?;

    if bytes.len() as u64 > state.config.uploads.max_file_size {
        return Err(Error::BadRequest {
            message: format!("File exceeds the maximum size of {} bytes", state.config.uploads.max_file_size),
        });
    }

    let file_name = format!("{}.{extension}", Uuid::new_v4());
    let dir = &state.config.uploads.dir;
    tokio::fs::create_dir_all(dir).await.map_err(|e| Error::Internal {
        operation: format!("create upload directory: {e}"),
    })?;
    tokio::fs::write(dir.join(&file_name), &bytes).await.map_err(|e| Error::Internal {
        operation: format!("store uploaded file: {e}"),
    })?;

    let mut conn = db_conn(&state).await?;
    let mut users = Users::new(&mut conn);

    let updated = users
        .update(
            current.id,
            &UserUpdateDBRequest {
                avatar_url: Some(format!("/uploads/{file_name}")),
                ..Default::default()
            },
        )
        .await?;

    Ok(Json(UserEnvelope {
        user: UserResponse::from(updated),
    }))
}
