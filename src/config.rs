use std::env;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_ACCESS_TOKEN_HEADER: &str = "AccessToken";

/// AppConfig
///
/// Holds the application's configuration state. Immutable once loaded and
/// pulled into handlers and extractors through `FromRef`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Controls the development identity flow.
    pub env: Env,
    // Postgres connection string. `None` in local runs means in-memory storage.
    pub db_url: Option<String>,
    pub port: u16,
    // Public base URL of this server, used to build the OAuth redirect.
    pub hostname: String,
    pub google_client_id: String,
    pub google_client_secret: String,
    // Name of the request header carrying the access credential.
    pub access_token_header: String,
    pub auth_mode: AuthMode,
}

/// Env
///
/// Local runs get the mocked identity provider and the development consent
/// route; production talks to Google.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Env {
    Local,
    Production,
}

/// AuthMode
///
/// How production resolves the credential header: as a locally issued
/// credential, or as a Google access token checked against user-info.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AuthMode {
    Credential,
    Provider,
}

impl Default for AppConfig {
    /// default
    ///
    /// Non-panicking configuration for test state setup.
    fn default() -> Self {
        Self {
            env: Env::Local,
            db_url: None,
            port: DEFAULT_PORT,
            hostname: format!("http://127.0.0.1:{DEFAULT_PORT}"),
            google_client_id: "test-client-id".to_string(),
            google_client_secret: "test-client-secret".to_string(),
            access_token_header: DEFAULT_ACCESS_TOKEN_HEADER.to_string(),
            auth_mode: AuthMode::Credential,
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration from environment variables at startup.
    ///
    /// # Panics
    /// Panics if a variable required in production is missing, or if `PORT`
    /// is not a valid port number.
    pub fn load() -> Self {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        let port = match env::var("PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .expect("FATAL: PORT must be a valid port number."),
            Err(_) => DEFAULT_PORT,
        };

        let hostname =
            env::var("APP_HOSTNAME").unwrap_or_else(|_| format!("http://127.0.0.1:{port}"));

        let access_token_header = env::var("ACCESS_TOKEN_HEADER")
            .ok()
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ACCESS_TOKEN_HEADER.to_string());

        let auth_mode = match env::var("AUTH_MODE").as_deref() {
            Ok("provider") => AuthMode::Provider,
            _ => AuthMode::Credential,
        };

        match env {
            Env::Local => Self {
                env,
                // Without a database the in-memory repository is used.
                db_url: env::var("DATABASE_URL").ok(),
                port,
                hostname,
                google_client_id: env::var("GOOGLE_CLIENT_ID").unwrap_or_default(),
                google_client_secret: env::var("GOOGLE_CLIENT_SECRET").unwrap_or_default(),
                access_token_header,
                auth_mode,
            },
            Env::Production => Self {
                env,
                db_url: Some(
                    env::var("DATABASE_URL").expect("FATAL: DATABASE_URL required in prod"),
                ),
                port,
                hostname,
                google_client_id: env::var("GOOGLE_CLIENT_ID")
                    .expect("FATAL: GOOGLE_CLIENT_ID required in prod"),
                google_client_secret: env::var("GOOGLE_CLIENT_SECRET")
                    .expect("FATAL: GOOGLE_CLIENT_SECRET required in prod"),
                access_token_header,
                auth_mode,
            },
        }
    }
}
