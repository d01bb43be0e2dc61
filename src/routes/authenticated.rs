use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Authenticated Router Module
///
/// Every route here sits behind the auth layer added in `create_router`, so
/// handlers always receive a resolved `AuthUser`. Role and ownership checks
/// happen inside the handlers through the policy module.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /auth
        // The identity behind the credential header.
        .route("/auth", get(handlers::get_current_user))
        // PUT /users/{id}
        // Self for profile fields, Administrator for the role.
        .route("/users/{id}", put(handlers::update_user))
        // --- Categories (Administrator only) ---
        .route("/categories", post(handlers::create_category))
        .route(
            "/categories/{id}",
            put(handlers::update_category).delete(handlers::delete_category),
        )
        // --- Articles ---
        // POST requires Writer or Administrator; PUT/DELETE require the owner
        // or an Administrator.
        .route("/articles", post(handlers::create_article))
        .route(
            "/articles/{id}",
            put(handlers::update_article).delete(handlers::delete_article),
        )
}
