use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

use crate::models::Role;

const GOOGLE_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";
const GOOGLE_SCOPES: &str = "openid profile email";

/// The path the provider sends the browser back to after consent.
pub const CALLBACK_PATH: &str = "/v1/auth/google-callback";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("invalid access token")]
    InvalidToken,
    #[error("identity provider rejected the request with status {0}")]
    Rejected(StatusCode),
    #[error("identity provider unreachable: {0}")]
    Transport(String),
    #[error("invalid provider url: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Transport(err.to_string())
    }
}

/// ProviderUserInfo
///
/// The subset of the OpenID Connect user-info document we keep.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct ProviderUserInfo {
    pub sub: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub picture: String,
}

// 1. IdentityProvider Contract
/// IdentityProvider
///
/// The three steps of the authorization-code flow: build the consent URL,
/// trade the code for a provider access token, and look up who that token
/// belongs to. The live Google client and the deterministic development
/// client both satisfy it, and `main` decides which one is wired in.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Consent page URL carrying the given CSRF `state`.
    fn authorize_url(&self, state: &str) -> Result<String, ProviderError>;

    async fn exchange_code(&self, code: &str) -> Result<String, ProviderError>;

    async fn user_info(&self, access_token: &str) -> Result<ProviderUserInfo, ProviderError>;

    /// Role given to an identity the first time its subject is seen.
    fn initial_role(&self, _info: &ProviderUserInfo) -> Role {
        Role::Reader
    }
}

// 2. The Real Implementation (Google)
/// LiveIdentityProvider
///
/// Talks to Google's OAuth2 and user-info endpoints over `reqwest`. The
/// redirect URL is fixed at construction so the consent request and the code
/// exchange always present the same value.
#[derive(Clone)]
pub struct LiveIdentityProvider {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_url: String,
}

impl LiveIdentityProvider {
    pub fn new(client_id: &str, client_secret: &str, hostname: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            redirect_url: format!("{}{}", hostname.trim_end_matches('/'), CALLBACK_PATH),
        }
    }
}

#[derive(Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
}

#[async_trait]
impl IdentityProvider for LiveIdentityProvider {
    fn authorize_url(&self, state: &str) -> Result<String, ProviderError> {
        let url = Url::parse_with_params(
            GOOGLE_AUTHORIZE_URL,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_url.as_str()),
                ("response_type", "code"),
                ("scope", GOOGLE_SCOPES),
                ("access_type", "offline"),
                ("state", state),
            ],
        )
        .map_err(|e| ProviderError::InvalidUrl(e.to_string()))?;
        Ok(url.into())
    }

    async fn exchange_code(&self, code: &str) -> Result<String, ProviderError> {
        let response = self
            .http
            .post(GOOGLE_TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.redirect_url.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "google token exchange rejected");
            return Err(ProviderError::Rejected(response.status()));
        }

        let token = response.json::<GoogleTokenResponse>().await?;
        Ok(token.access_token)
    }

    async fn user_info(&self, access_token: &str) -> Result<ProviderUserInfo, ProviderError> {
        let response = self
            .http
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await?;

        // Anything but 200 means Google did not accept the token.
        if response.status() != StatusCode::OK {
            return Err(ProviderError::InvalidToken);
        }

        Ok(response.json::<ProviderUserInfo>().await?)
    }
}

// 3. The Development Implementation (no network)
/// TestIdentityProvider
///
/// Deterministic stand-in for Google. The literal tokens `Administrator`,
/// `Writer` and `Reader` resolve to fixed synthetic subjects that are created
/// with the matching role; any other non-empty token is the Reader
/// `dev-user`. The consent step is served by this process at
/// `/v1/auth/dev-authorize`.
#[derive(Clone)]
pub struct TestIdentityProvider {
    base_url: String,
}

pub const DEV_ACCESS_TOKEN: &str = "AccessToken";

impl TestIdentityProvider {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn role_for_subject(sub: &str) -> Role {
        match sub {
            "dev-administrator" => Role::Administrator,
            "dev-writer" => Role::Writer,
            _ => Role::Reader,
        }
    }
}

#[async_trait]
impl IdentityProvider for TestIdentityProvider {
    fn authorize_url(&self, state: &str) -> Result<String, ProviderError> {
        let url = Url::parse_with_params(
            &format!("{}/v1/auth/dev-authorize", self.base_url),
            &[("state", state)],
        )
        .map_err(|e| ProviderError::InvalidUrl(e.to_string()))?;
        Ok(url.into())
    }

    async fn exchange_code(&self, code: &str) -> Result<String, ProviderError> {
        if code.is_empty() {
            return Err(ProviderError::InvalidToken);
        }
        Ok(DEV_ACCESS_TOKEN.to_string())
    }

    async fn user_info(&self, access_token: &str) -> Result<ProviderUserInfo, ProviderError> {
        let (sub, name) = match access_token {
            "" => return Err(ProviderError::InvalidToken),
            "Administrator" => ("dev-administrator", "Mock Administrator"),
            "Writer" => ("dev-writer", "Mock Writer"),
            "Reader" => ("dev-reader", "Mock Reader"),
            _ => ("dev-user", "Mock User"),
        };
        Ok(ProviderUserInfo {
            sub: sub.to_string(),
            name: name.to_string(),
            email: format!("{sub}@example.com"),
            picture: String::new(),
        })
    }

    fn initial_role(&self, info: &ProviderUserInfo) -> Role {
        Self::role_for_subject(&info.sub)
    }
}

/// ProviderState
///
/// The concrete type used to share the identity provider across the application state.
pub type ProviderState = Arc<dyn IdentityProvider>;
