use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    dto::{validate_content, validate_title, CreatePostRequest, UpdatePostRequest},
    repo_types::{NewPost, Post, PostPatch},
    services,
};
use crate::{
    auth::extractors::AuthUser,
    error::{AppError, StoreError},
    state::AppState,
};

pub fn post_routes() -> Router<AppState> {
    Router::new()
        .route("/posts", post(create_post))
        .route(
            "/posts/:id",
            get(get_post).patch(update_post).delete(delete_post),
        )
}

#[instrument(skip(state, payload))]
pub async fn create_post(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Json(payload): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<Post>), AppError> {
    validate_title(&payload.title)?;
    validate_content(&payload.content)?;

    let post = state
        .posts
        .create(&NewPost {
            user_id: caller.id,
            title: payload.title,
            content: payload.content,
            tags: payload.tags,
        })
        .await
        .map_err(|e| match e {
            // author deleted between authentication and insert
            StoreError::NotFound => AppError::Unauthorized,
            other => other.into(),
        })?;
    info!(post_id = %post.id, user_id = %caller.id, "post created");
    Ok((StatusCode::CREATED, Json(post)))
}

#[instrument(skip(state))]
pub async fn get_post(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Post>, AppError> {
    Ok(Json(state.posts.get_by_id(id).await?))
}

#[instrument(skip(state, payload))]
pub async fn update_post(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePostRequest>,
) -> Result<Json<Post>, AppError> {
    if let Some(title) = &payload.title {
        validate_title(title)?;
    }
    if let Some(content) = &payload.content {
        validate_content(content)?;
    }
    let patch = PostPatch {
        title: payload.title,
        content: payload.content,
    };
    let post = services::update_post(
        state.posts.as_ref(),
        state.roles.as_ref(),
        id,
        &caller,
        payload.version,
        patch,
    )
    .await?;
    Ok(Json(post))
}

#[instrument(skip(state))]
pub async fn delete_post(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    services::delete_post(state.posts.as_ref(), state.roles.as_ref(), id, &caller).await?;
    Ok(StatusCode::NO_CONTENT)
}
