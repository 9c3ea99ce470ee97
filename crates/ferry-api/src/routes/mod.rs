//! HTTP routes.

pub mod commits;
pub mod health;
pub mod hooks;

use crate::AppState;
use axum::Router;

/// Build the main router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/hook", hooks::router())
        .merge(commits::router())
        .merge(health::router())
        .with_state(state)
}
