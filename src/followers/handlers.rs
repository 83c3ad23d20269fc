use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::put,
    Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::extractors::AuthUser,
    error::{AppError, StoreError},
    state::AppState,
};

pub fn follower_routes() -> Router<AppState> {
    Router::new()
        .route("/users/:id/follow", put(follow_user))
        .route("/users/:id/unfollow", put(unfollow_user))
}

#[instrument(skip(state))]
pub async fn follow_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let caller = caller.id;
    if caller == id {
        return Err(AppError::validation("cannot follow yourself"));
    }
    state.followers.follow(caller, id).await.map_err(|e| match e {
        StoreError::Conflict => AppError::Conflict("already following".into()),
        other => other.into(),
    })?;
    info!(follower_id = %caller, user_id = %id, "followed");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn unfollow_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let caller = caller.id;
    state.followers.unfollow(caller, id).await?;
    info!(follower_id = %caller, user_id = %id, "unfollowed");
    Ok(StatusCode::NO_CONTENT)
}
