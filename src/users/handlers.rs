use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    dto::UpdateUserRequest,
    repo_types::{User, UserChanges},
    services,
};
use crate::{
    auth::{
        extractors::AuthUser,
        password::hash_password,
        services::{normalize_email, validate_email, validate_password, validate_username},
    },
    error::AppError,
    state::AppState,
};

pub fn activation_routes() -> Router<AppState> {
    Router::new().route("/users/activate/:token", put(activate_user))
}

pub fn profile_routes() -> Router<AppState> {
    Router::new().route(
        "/users/:id",
        get(get_user).patch(update_user).delete(delete_user),
    )
}

/// Wrong, used and expired tokens are all reported as 404.
#[instrument(skip(state, token))]
pub async fn activate_user(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = services::activate_user(state.users.as_ref(), state.cache.as_ref(), &token).await?;
    info!(user_id = %id, "user activated");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, AppError> {
    let user = services::get_user(state.users.as_ref(), state.cache.as_ref(), id).await?;
    Ok(Json(user))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<User>, AppError> {
    if caller.id != id {
        return Err(AppError::Forbidden);
    }
    let changes = into_changes(payload)?;
    let user =
        services::update_user(state.users.as_ref(), state.cache.as_ref(), id, &changes).await?;
    Ok(Json(user))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if caller.id != id {
        return Err(AppError::Forbidden);
    }
    services::delete_user(state.users.as_ref(), state.cache.as_ref(), id).await?;
    info!(user_id = %id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

fn into_changes(req: UpdateUserRequest) -> Result<UserChanges, AppError> {
    let username = req.username.map(|u| u.trim().to_owned());
    if let Some(u) = &username {
        validate_username(u)?;
    }
    let email = req.email.map(|e| normalize_email(&e));
    if let Some(e) = &email {
        validate_email(e)?;
    }
    let password_hash = match req.password {
        Some(p) => {
            validate_password(&p)?;
            Some(hash_password(&p)?)
        }
        None => None,
    };
    Ok(UserChanges {
        username,
        email,
        password_hash,
    })
}
