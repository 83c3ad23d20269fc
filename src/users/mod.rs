pub mod cache;
mod dto;
pub mod handlers;
pub mod invitations;
pub mod repo;
pub mod repo_types;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::activation_routes())
        .merge(handlers::profile_routes())
}
