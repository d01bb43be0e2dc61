use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a credential: every list and get-by-id, the
/// credential exchange and both legs of the OAuth2 redirect flow.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /users, GET /users/{id}
        .route("/users", get(handlers::get_users))
        .route("/users/{id}", get(handlers::get_user))
        // GET /categories, GET /categories/{id}
        .route("/categories", get(handlers::get_categories))
        .route("/categories/{id}", get(handlers::get_category))
        // GET /articles, GET /articles/{id}
        .route("/articles", get(handlers::get_articles))
        .route("/articles/{id}", get(handlers::get_article))
        // POST /auth
        // Trades a provider access token for the local credential.
        .route("/auth", post(handlers::exchange_credential))
        // GET /auth/google-login
        // Issues a fresh state and redirects to the consent page.
        .route("/auth/google-login", get(handlers::google_login))
        // GET /auth/google-callback?state&code
        // Consumes the state, exchanges the code and answers with the credential.
        .route("/auth/google-callback", get(handlers::google_callback))
}
