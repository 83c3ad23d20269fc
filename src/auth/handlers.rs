use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use tracing::{info, instrument};

use super::{
    dto::{RegisterRequest, TokenRequest, TokenResponse},
    registration::RegistrationSaga,
    services::{
        issue_token, normalize_email, validate_email, validate_password, validate_username,
    },
};
use crate::{error::AppError, state::AppState};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/authentication/user", post(register))
        .route("/authentication/token", post(create_token))
}

/// Registers an inactive user and mails the activation link. The plaintext
/// invitation token is returned once and never stored.
#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), AppError> {
    payload.email = normalize_email(&payload.email);
    payload.username = payload.username.trim().to_owned();
    validate_username(&payload.username)?;
    validate_email(&payload.email)?;
    validate_password(&payload.password)?;

    let mail = &state.config.mail;
    let registered = RegistrationSaga::new(
        state.users.as_ref(),
        state.mailer.as_ref(),
        mail.invitation_ttl(),
        &mail.frontend_url,
    )
    .run(&payload.username, &payload.email, &payload.password)
    .await?;

    info!(user_id = %registered.user.id, "registration complete");
    Ok((
        StatusCode::CREATED,
        Json(TokenResponse {
            token: registered.token.into_plaintext(),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn create_token(
    State(state): State<AppState>,
    Json(payload): Json<TokenRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), AppError> {
    let email = normalize_email(&payload.email);
    validate_email(&email)?;
    validate_password(&payload.password)?;

    let token = issue_token(state.users.as_ref(), &state.keys, &email, &payload.password).await?;
    Ok((StatusCode::CREATED, Json(TokenResponse { token })))
}
