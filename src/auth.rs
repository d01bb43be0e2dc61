use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use rand::RngCore;
use std::sync::Arc;

use crate::{
    config::AppConfig,
    error::{AppError, AppResult},
    models::User,
    policy::Actor,
    provider::{IdentityProvider, ProviderState, ProviderUserInfo},
    repository::{Repository, RepositoryError, RepositoryState},
};

/// Number of random bytes in an issued access credential (hex encoded on the wire).
pub const TOKEN_LENGTH: usize = 40;

/// generate_access_token
///
/// A fresh opaque credential: `TOKEN_LENGTH` bytes from the thread-local CSPRNG,
/// hex encoded.
pub fn generate_access_token() -> String {
    let mut bytes = [0u8; TOKEN_LENGTH];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// identity_for_subject
///
/// Looks up the local identity bound to a provider subject, creating it on
/// first sight. Only a genuine miss creates; a storage failure is returned as
/// such so a broken connection never mints a duplicate identity. Losing the
/// insert to a concurrent request for the same subject falls back to that
/// request's identity.
pub async fn identity_for_subject(
    repo: &dyn Repository,
    provider: &dyn IdentityProvider,
    info: &ProviderUserInfo,
) -> AppResult<User> {
    match repo.get_user_by_google_sub(&info.sub).await {
        Ok(user) => Ok(user),
        Err(RepositoryError::NotFound) => {
            let role = provider.initial_role(info);
            let created = repo
                .create_user(User {
                    google_sub: info.sub.clone(),
                    access_token: generate_access_token(),
                    name: info.name.clone(),
                    email: info.email.clone(),
                    profile_picture_url: info.picture.clone(),
                    role,
                    ..User::default()
                })
                .await;
            match created {
                Ok(user) => {
                    tracing::info!(user_id = user.id, %role, "created identity on first sign-in");
                    Ok(user)
                }
                // A concurrent first request bound the subject in between.
                Err(RepositoryError::Conflict(detail)) => {
                    tracing::debug!(sub = %info.sub, %detail, "identity created concurrently");
                    Ok(repo.get_user_by_google_sub(&info.sub).await?)
                }
                Err(e) => Err(e.into()),
            }
        }
        Err(e) => Err(e.into()),
    }
}

// --- Identity resolution ---

/// IdentityResolver
///
/// Turns the raw credential header value into a stored identity. Which
/// strategy runs is decided once, when the application state is assembled.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, access_token: &str) -> AppResult<User>;
}

pub type ResolverState = Arc<dyn IdentityResolver>;

/// CredentialIdentityResolver
///
/// The header value is a credential issued by this server.
pub struct CredentialIdentityResolver {
    repo: RepositoryState,
}

impl CredentialIdentityResolver {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl IdentityResolver for CredentialIdentityResolver {
    async fn resolve(&self, access_token: &str) -> AppResult<User> {
        match self.repo.get_user_by_access_token(access_token).await {
            Ok(user) => Ok(user),
            Err(RepositoryError::NotFound) => {
                Err(AppError::Authentication("invalid access token".to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// ProviderIdentityResolver
///
/// The header value is an identity-provider access token. With the live
/// provider this costs a user-info round trip per request; with the test
/// provider it is the development identity shortcut.
pub struct ProviderIdentityResolver {
    repo: RepositoryState,
    provider: ProviderState,
}

impl ProviderIdentityResolver {
    pub fn new(repo: RepositoryState, provider: ProviderState) -> Self {
        Self { repo, provider }
    }
}

#[async_trait]
impl IdentityResolver for ProviderIdentityResolver {
    async fn resolve(&self, access_token: &str) -> AppResult<User> {
        let info = self.provider.user_info(access_token).await.map_err(|e| {
            tracing::debug!(error = %e, "provider rejected access token");
            AppError::Authentication("invalid access token".to_string())
        })?;
        identity_for_subject(self.repo.as_ref(), self.provider.as_ref(), &info).await
    }
}

// --- Extractor ---

/// AuthUser
///
/// The resolved identity of an authenticated request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
}

impl AuthUser {
    pub fn actor(&self) -> Actor {
        Actor {
            id: self.user.id,
            role: self.user.role,
        }
    }
}

/// AuthUser Extractor Implementation
///
/// Reads the credential from the configured header and hands it to the
/// resolver in the application state. A missing or empty header is rejected
/// before any resolver runs. Every failure is a 403 in the error envelope,
/// except storage failures which stay 500.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    ResolverState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // Already resolved by the auth layer for this request.
        if let Some(auth) = parts.extensions.get::<AuthUser>() {
            return Ok(auth.clone());
        }

        let resolver = ResolverState::from_ref(state);
        let config = AppConfig::from_ref(state);

        let token = parts
            .headers
            .get(config.access_token_header.as_str())
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AppError::Authentication("invalid access token".to_string()))?;

        let user = resolver.resolve(token).await?;
        Ok(AuthUser { user })
    }
}
