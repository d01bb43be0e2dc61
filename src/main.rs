use quillboard::{
    AppState, CredentialIdentityResolver, MemoryRepository, OAuthStateStore, PostgresRepository,
    ProviderIdentityResolver, ProviderState, ResolverState,
    config::{AppConfig, AuthMode, Env},
    create_router,
    provider::{LiveIdentityProvider, TestIdentityProvider},
    repository::RepositoryState,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, initializes logging, connects storage, wires the
/// identity provider and resolver, then serves the router.
#[tokio::main]
async fn main() {
    // 1. Configuration & Environment Loading (Fail-Fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging Filter Setup
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "quillboard=debug,tower_http=info".into());

    // 3. Pretty output locally, JSON for log aggregation in production.
    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 4. Storage: Postgres when configured, otherwise in-memory (local only).
    let repo: RepositoryState = match &config.db_url {
        Some(db_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(db_url)
                .await
                .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .expect("FATAL: Failed to run database migrations.");

            Arc::new(PostgresRepository::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory storage");
            Arc::new(MemoryRepository::new())
        }
    };

    // 5. Identity Provider and Resolver
    let provider: ProviderState = match config.env {
        Env::Local => Arc::new(TestIdentityProvider::new(&config.hostname)),
        Env::Production => Arc::new(LiveIdentityProvider::new(
            &config.google_client_id,
            &config.google_client_secret,
            &config.hostname,
        )),
    };

    let identity: ResolverState = match (config.env, config.auth_mode) {
        (Env::Local, _) | (Env::Production, AuthMode::Provider) => {
            Arc::new(ProviderIdentityResolver::new(repo.clone(), provider.clone()))
        }
        (Env::Production, AuthMode::Credential) => {
            Arc::new(CredentialIdentityResolver::new(repo.clone()))
        }
    };

    let port = config.port;
    let hostname = config.hostname.clone();

    // 6. Unified State Assembly
    let app_state = AppState {
        repo,
        identity,
        provider,
        oauth_states: Arc::new(OAuthStateStore::new()),
        config,
    };

    // 7. Router and Server Startup
    let app = create_router(app_state);

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .expect("FATAL: Failed to bind the HTTP listener.");

    tracing::info!("Listening on {}", addr);
    tracing::info!("API Documentation (Swagger UI) available at: {}/swagger-ui", hostname);

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly.");
}
