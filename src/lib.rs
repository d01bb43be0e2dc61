use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
    routing::get,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod oauth;
pub mod policy;
pub mod provider;
pub mod repository;

// Module for routing segregation (Public, Authenticated, Development).
pub mod routes;
use auth::AuthUser;
use config::Env;
use routes::{authenticated, development, public};

// --- Public Re-exports ---

pub use auth::{CredentialIdentityResolver, ProviderIdentityResolver, ResolverState};
pub use config::AppConfig;
pub use oauth::{OAuthStateState, OAuthStateStore};
pub use provider::{LiveIdentityProvider, ProviderState, TestIdentityProvider};
pub use repository::{MemoryRepository, PostgresRepository, RepositoryState};

/// ApiDoc
///
/// Aggregates every `#[utoipa::path]` handler and `ToSchema` model into the
/// OpenAPI document served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::get_users, handlers::get_user, handlers::update_user,
        handlers::get_categories, handlers::get_category, handlers::create_category,
        handlers::update_category, handlers::delete_category,
        handlers::get_articles, handlers::get_article, handlers::create_article,
        handlers::update_article, handlers::delete_article,
        handlers::get_current_user, handlers::exchange_credential,
        handlers::google_login, handlers::google_callback, handlers::dev_authorize
    ),
    components(
        schemas(
            models::Role, models::User, models::Category, models::Article,
            models::CreateCategoryRequest, models::UpdateCategoryRequest,
            models::CreateArticleRequest, models::UpdateArticleRequest,
            models::UpdateUserRequest, models::CredentialExchangeRequest,
            models::TokenResponse, error::ApiErrorBody,
        )
    ),
    tags(
        (name = "users", description = "Identities and their profiles"),
        (name = "categories", description = "Article categories"),
        (name = "articles", description = "Articles"),
        (name = "auth", description = "Google OAuth2 and credential exchange")
    )
)]
pub struct ApiDoc;

/// AppState
///
/// The single container of shared services handed to every request.
#[derive(Clone)]
pub struct AppState {
    pub repo: RepositoryState,
    /// Turns the credential header into an identity.
    pub identity: ResolverState,
    /// Google in production, the deterministic stand-in locally.
    pub provider: ProviderState,
    pub oauth_states: OAuthStateState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for ResolverState {
    fn from_ref(app_state: &AppState) -> ResolverState {
        app_state.identity.clone()
    }
}

impl FromRef<AppState> for ProviderState {
    fn from_ref(app_state: &AppState) -> ProviderState {
        app_state.provider.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Guards the authenticated router. Resolving `AuthUser` here rejects the
/// request with the 403 envelope before any handler runs; on success the
/// identity is stashed in the request extensions so the handler's own
/// extractor does not resolve it a second time.
async fn auth_middleware(auth_user: AuthUser, mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(auth_user);
    next.run(request).await
}

/// create_router
///
/// Assembles the routing tree under `/v1`, applies the auth layer to the
/// authenticated routes and wraps everything in the observability layers.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Versioned API
    let mut api = public::public_routes().merge(
        authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        )),
    );
    if state.config.env == Env::Local {
        api = api.merge(development::development_routes());
    }

    let base_router = Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/v1", api)
        .with_state(state);

    // 3. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span factory for `TraceLayer`: method, URI and the request id, so every
/// log line of one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
