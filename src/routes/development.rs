use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Development Router Module
///
/// Only merged when running with `APP_ENV=local`.
pub fn development_routes() -> Router<AppState> {
    Router::new()
        // GET /auth/dev-authorize?state
        // Plays the provider's consent page and bounces back to the callback.
        .route("/auth/dev-authorize", get(handlers::dev_authorize))
}
