use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use tracing::warn;

use crate::{
    error::{AppError, StoreError},
    state::AppState,
    users::{repo_types::User, services::get_user},
};

/// The caller behind a valid `Bearer` token, loaded through the user cache.
///
/// A token whose subject no longer exists is refused like any other bad
/// token.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::Unauthorized)?;

        let token = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .ok_or(AppError::Unauthorized)?;

        let claims = state.keys.verify(token).map_err(|e| {
            warn!(error = %e, "bearer token rejected");
            AppError::Unauthorized
        })?;

        match get_user(state.users.as_ref(), state.cache.as_ref(), claims.sub).await {
            Ok(user) => Ok(AuthUser(user)),
            Err(StoreError::NotFound) => {
                warn!(user_id = %claims.sub, "bearer token for a deleted account");
                Err(AppError::Unauthorized)
            }
            Err(e) => Err(e.into()),
        }
    }
}
