use crate::{
    AppState,
    auth::{AuthUser, identity_for_subject},
    error::{ApiErrorBody, AppError, AppResult, parse_id},
    models::{
        Article, Category, CreateArticleRequest, CreateCategoryRequest,
        CredentialExchangeRequest, TokenResponse, UpdateArticleRequest, UpdateCategoryRequest,
        UpdateUserRequest, User,
    },
    policy::{Action, Decision, authorize},
    provider::CALLBACK_PATH,
    repository::RepositoryError,
};
use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::Redirect,
};
use reqwest::Url;
use serde::Deserialize;

// --- Helpers ---

/// Maps a repository miss to a 404 naming the resource.
fn missing(resource: &'static str) -> impl Fn(RepositoryError) -> AppError {
    move |err| match err {
        RepositoryError::NotFound => AppError::NotFound(format!("{resource} not found")),
        other => other.into(),
    }
}

fn enforce(auth: &AuthUser, action: Action) -> AppResult<()> {
    match authorize(Some(&auth.actor()), action) {
        Decision::Allow => Ok(()),
        Decision::Deny(reason) => {
            tracing::warn!(user_id = auth.user.id, ?action, %reason, "request denied");
            Err(AppError::Forbidden(reason))
        }
    }
}

/// Articles must point at an existing category when created or moved.
async fn ensure_category_exists(state: &AppState, category_id: i64) -> AppResult<()> {
    match state.repo.get_category(category_id).await {
        Ok(_) => Ok(()),
        Err(RepositoryError::NotFound) => Err(AppError::Validation(format!(
            "category {category_id} does not exist"
        ))),
        Err(e) => Err(e.into()),
    }
}

// --- Users ---

/// get_users
///
/// [Public Route] Lists every identity in id order.
#[utoipa::path(
    get,
    path = "/v1/users",
    tag = "users",
    responses(
        (status = 200, description = "All users", body = [User]),
        (status = 500, description = "Storage failure", body = ApiErrorBody)
    )
)]
pub async fn get_users(State(state): State<AppState>) -> AppResult<Json<Vec<User>>> {
    Ok(Json(state.repo.list_users().await?))
}

#[utoipa::path(
    get,
    path = "/v1/users/{id}",
    tag = "users",
    params(("id" = i64, Path, description = "User ID")),
    responses(
        (status = 200, description = "Found", body = User),
        (status = 400, description = "Non-numeric id", body = ApiErrorBody),
        (status = 404, description = "Not Found", body = ApiErrorBody)
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> AppResult<Json<User>> {
    let Path(id) = path?;
    let id = parse_id(&id)?;
    let user = state.repo.get_user(id).await.map_err(missing("user"))?;
    Ok(Json(user))
}

/// update_user
///
/// [Authenticated Route] Partial update of an identity.
///
/// *Authorization*: the identity itself may change its profile and nutrition
/// fields; an Administrator may change anyone's role. When an Administrator
/// updates someone else only the role is applied and every other submitted
/// field is ignored. Anyone else gets a 403.
#[utoipa::path(
    put,
    path = "/v1/users/{id}",
    tag = "users",
    params(("id" = i64, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated", body = User),
        (status = 400, description = "Invalid body or id", body = ApiErrorBody),
        (status = 403, description = "Not self and not Administrator", body = ApiErrorBody),
        (status = 404, description = "Not Found", body = ApiErrorBody)
    )
)]
pub async fn update_user(
    auth: AuthUser,
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> AppResult<Json<User>> {
    let Path(id) = path?;
    let id = parse_id(&id)?;
    let actor = auth.actor();

    let profile = authorize(Some(&actor), Action::UpdateProfile { target: id });
    let role = authorize(Some(&actor), Action::UpdateRole { target: id });
    if let (Decision::Deny(reason), false) = (&profile, role.is_allowed()) {
        tracing::warn!(user_id = actor.id, target = id, %reason, "user update denied");
        return Err(AppError::Forbidden(reason.clone()));
    }

    let mut user = state.repo.get_user(id).await.map_err(missing("user"))?;

    let Json(payload) = payload?;

    // Fields that will be ignored are not validated either.
    if profile.is_allowed() {
        payload.validate().map_err(AppError::Validation)?;
        payload.apply_profile(&mut user);
    }
    if let (true, Some(new_role)) = (role.is_allowed(), payload.role) {
        user.role = new_role;
    }

    let updated = state.repo.update_user(user).await?;
    tracing::info!(user_id = actor.id, target = id, "user updated");
    Ok(Json(updated))
}

// --- Categories ---

#[utoipa::path(
    get,
    path = "/v1/categories",
    tag = "categories",
    responses((status = 200, description = "All categories", body = [Category]))
)]
pub async fn get_categories(State(state): State<AppState>) -> AppResult<Json<Vec<Category>>> {
    Ok(Json(state.repo.list_categories().await?))
}

#[utoipa::path(
    get,
    path = "/v1/categories/{id}",
    tag = "categories",
    params(("id" = i64, Path, description = "Category ID")),
    responses(
        (status = 200, description = "Found", body = Category),
        (status = 400, description = "Non-numeric id", body = ApiErrorBody),
        (status = 404, description = "Not Found", body = ApiErrorBody)
    )
)]
pub async fn get_category(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> AppResult<Json<Category>> {
    let Path(id) = path?;
    let id = parse_id(&id)?;
    let category = state
        .repo
        .get_category(id)
        .await
        .map_err(missing("category"))?;
    Ok(Json(category))
}

/// create_category
///
/// [Authenticated Route] Administrators only.
#[utoipa::path(
    post,
    path = "/v1/categories",
    tag = "categories",
    request_body = CreateCategoryRequest,
    responses(
        (status = 200, description = "Created", body = Category),
        (status = 400, description = "Invalid body", body = ApiErrorBody),
        (status = 403, description = "Not Administrator", body = ApiErrorBody)
    )
)]
pub async fn create_category(
    auth: AuthUser,
    State(state): State<AppState>,
    payload: Result<Json<CreateCategoryRequest>, JsonRejection>,
) -> AppResult<Json<Category>> {
    enforce(&auth, Action::CreateCategory)?;

    let Json(payload) = payload?;
    payload.validate().map_err(AppError::Validation)?;

    let category = state.repo.create_category(payload).await?;
    tracing::info!(user_id = auth.user.id, category_id = category.id, "category created");
    Ok(Json(category))
}

/// update_category
///
/// [Authenticated Route] Administrators only. Absent fields keep their value.
#[utoipa::path(
    put,
    path = "/v1/categories/{id}",
    tag = "categories",
    params(("id" = i64, Path, description = "Category ID")),
    request_body = UpdateCategoryRequest,
    responses(
        (status = 200, description = "Updated", body = Category),
        (status = 400, description = "Invalid body or id", body = ApiErrorBody),
        (status = 403, description = "Not Administrator", body = ApiErrorBody),
        (status = 404, description = "Not Found", body = ApiErrorBody)
    )
)]
pub async fn update_category(
    auth: AuthUser,
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    payload: Result<Json<UpdateCategoryRequest>, JsonRejection>,
) -> AppResult<Json<Category>> {
    enforce(&auth, Action::UpdateCategory)?;
    let Path(id) = path?;
    let id = parse_id(&id)?;

    let mut category = state
        .repo
        .get_category(id)
        .await
        .map_err(missing("category"))?;

    let Json(payload) = payload?;
    payload.validate().map_err(AppError::Validation)?;
    payload.apply_to(&mut category);

    let updated = state.repo.update_category(category).await?;
    tracing::info!(user_id = auth.user.id, category_id = id, "category updated");
    Ok(Json(updated))
}

/// delete_category
///
/// [Authenticated Route] Administrators only. Articles pointing at the
/// category are left as they are.
#[utoipa::path(
    delete,
    path = "/v1/categories/{id}",
    tag = "categories",
    params(("id" = i64, Path, description = "Category ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not Administrator", body = ApiErrorBody),
        (status = 404, description = "Not Found", body = ApiErrorBody)
    )
)]
pub async fn delete_category(
    auth: AuthUser,
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> AppResult<StatusCode> {
    enforce(&auth, Action::DeleteCategory)?;
    let Path(id) = path?;
    let id = parse_id(&id)?;

    state
        .repo
        .get_category(id)
        .await
        .map_err(missing("category"))?;
    state
        .repo
        .delete_category(id)
        .await
        .map_err(missing("category"))?;

    tracing::info!(user_id = auth.user.id, category_id = id, "category deleted");
    Ok(StatusCode::NO_CONTENT)
}

// --- Articles ---

#[utoipa::path(
    get,
    path = "/v1/articles",
    tag = "articles",
    responses((status = 200, description = "All articles", body = [Article]))
)]
pub async fn get_articles(State(state): State<AppState>) -> AppResult<Json<Vec<Article>>> {
    Ok(Json(state.repo.list_articles().await?))
}

#[utoipa::path(
    get,
    path = "/v1/articles/{id}",
    tag = "articles",
    params(("id" = i64, Path, description = "Article ID")),
    responses(
        (status = 200, description = "Found", body = Article),
        (status = 400, description = "Non-numeric id", body = ApiErrorBody),
        (status = 404, description = "Not Found", body = ApiErrorBody)
    )
)]
pub async fn get_article(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> AppResult<Json<Article>> {
    let Path(id) = path?;
    let id = parse_id(&id)?;
    let article = state
        .repo
        .get_article(id)
        .await
        .map_err(missing("article"))?;
    Ok(Json(article))
}

/// create_article
///
/// [Authenticated Route] Writers and Administrators. The owner is always the
/// caller; the referenced category must exist.
#[utoipa::path(
    post,
    path = "/v1/articles",
    tag = "articles",
    request_body = CreateArticleRequest,
    responses(
        (status = 200, description = "Created", body = Article),
        (status = 400, description = "Invalid body or unknown category", body = ApiErrorBody),
        (status = 403, description = "Reader or unauthenticated", body = ApiErrorBody)
    )
)]
pub async fn create_article(
    auth: AuthUser,
    State(state): State<AppState>,
    payload: Result<Json<CreateArticleRequest>, JsonRejection>,
) -> AppResult<Json<Article>> {
    enforce(&auth, Action::CreateArticle)?;

    let Json(payload) = payload?;
    payload.validate().map_err(AppError::Validation)?;
    ensure_category_exists(&state, payload.category_id).await?;

    let article = state.repo.create_article(payload, auth.user.id).await?;
    tracing::info!(user_id = auth.user.id, article_id = article.id, "article created");
    Ok(Json(article))
}

/// update_article
///
/// [Authenticated Route] Owner or Administrator. Moving the article to
/// another category re-checks that the category exists.
#[utoipa::path(
    put,
    path = "/v1/articles/{id}",
    tag = "articles",
    params(("id" = i64, Path, description = "Article ID")),
    request_body = UpdateArticleRequest,
    responses(
        (status = 200, description = "Updated", body = Article),
        (status = 400, description = "Invalid body, id or category", body = ApiErrorBody),
        (status = 403, description = "Not owner and not Administrator", body = ApiErrorBody),
        (status = 404, description = "Not Found", body = ApiErrorBody)
    )
)]
pub async fn update_article(
    auth: AuthUser,
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    payload: Result<Json<UpdateArticleRequest>, JsonRejection>,
) -> AppResult<Json<Article>> {
    let Path(id) = path?;
    let id = parse_id(&id)?;
    let mut article = state
        .repo
        .get_article(id)
        .await
        .map_err(missing("article"))?;
    enforce(
        &auth,
        Action::UpdateArticle {
            owner: article.user_id,
        },
    )?;

    let Json(payload) = payload?;
    payload.validate().map_err(AppError::Validation)?;
    if let Some(category_id) = payload.category_id.filter(|c| *c != article.category_id) {
        ensure_category_exists(&state, category_id).await?;
    }
    payload.apply_to(&mut article);

    let updated = state.repo.update_article(article).await?;
    tracing::info!(user_id = auth.user.id, article_id = id, "article updated");
    Ok(Json(updated))
}

/// delete_article
///
/// [Authenticated Route] Owner or Administrator.
#[utoipa::path(
    delete,
    path = "/v1/articles/{id}",
    tag = "articles",
    params(("id" = i64, Path, description = "Article ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not owner and not Administrator", body = ApiErrorBody),
        (status = 404, description = "Not Found", body = ApiErrorBody)
    )
)]
pub async fn delete_article(
    auth: AuthUser,
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> AppResult<StatusCode> {
    let Path(id) = path?;
    let id = parse_id(&id)?;
    let article = state
        .repo
        .get_article(id)
        .await
        .map_err(missing("article"))?;
    enforce(
        &auth,
        Action::DeleteArticle {
            owner: article.user_id,
        },
    )?;

    state
        .repo
        .delete_article(id)
        .await
        .map_err(missing("article"))?;
    tracing::info!(user_id = auth.user.id, article_id = id, "article deleted");
    Ok(StatusCode::NO_CONTENT)
}

// --- Auth ---

/// OAuthCallbackParams
///
/// Query string Google (or the development consent route) sends back.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct OAuthCallbackParams {
    pub state: Option<String>,
    pub code: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct DevAuthorizeParams {
    pub state: Option<String>,
}

/// get_current_user
///
/// [Authenticated Route] The identity the credential header resolves to.
#[utoipa::path(
    get,
    path = "/v1/auth",
    tag = "auth",
    responses(
        (status = 200, description = "Current identity", body = User),
        (status = 403, description = "Invalid access token", body = ApiErrorBody)
    )
)]
pub async fn get_current_user(auth: AuthUser) -> Json<User> {
    Json(auth.user)
}

/// exchange_credential
///
/// [Public Route] Trades a provider access token for the local credential,
/// creating the identity on first sight.
#[utoipa::path(
    post,
    path = "/v1/auth",
    tag = "auth",
    request_body = CredentialExchangeRequest,
    responses(
        (status = 200, description = "Local credential", body = TokenResponse),
        (status = 400, description = "Invalid body", body = ApiErrorBody),
        (status = 403, description = "Provider rejected the token", body = ApiErrorBody)
    )
)]
pub async fn exchange_credential(
    State(state): State<AppState>,
    payload: Result<Json<CredentialExchangeRequest>, JsonRejection>,
) -> AppResult<Json<TokenResponse>> {
    let Json(payload) = payload?;
    if payload.provider_access_token.trim().is_empty() {
        return Err(AppError::Validation(
            "providerAccessToken must not be blank".to_string(),
        ));
    }

    let info = state
        .provider
        .user_info(&payload.provider_access_token)
        .await
        .map_err(|_| AppError::Authentication("invalid access token".to_string()))?;
    let user = identity_for_subject(state.repo.as_ref(), state.provider.as_ref(), &info).await?;

    Ok(Json(TokenResponse::bearer(user.access_token)))
}

/// google_login
///
/// [Public Route] Entry point of the OAuth2 flow. Issues a single-use state
/// and redirects to the provider's consent page.
#[utoipa::path(
    get,
    path = "/v1/auth/google-login",
    tag = "auth",
    responses((status = 307, description = "Redirect to the consent page"))
)]
pub async fn google_login(State(state): State<AppState>) -> AppResult<Redirect> {
    let oauth_state = state.oauth_states.issue().await;
    let url = state
        .provider
        .authorize_url(&oauth_state)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(Redirect::temporary(&url))
}

/// google_callback
///
/// [Public Route] End of the OAuth2 flow. The state must be one this server
/// issued, still fresh and unused; it is consumed by the check.
#[utoipa::path(
    get,
    path = "/v1/auth/google-callback",
    tag = "auth",
    params(OAuthCallbackParams),
    responses(
        (status = 200, description = "Local credential", body = TokenResponse),
        (status = 400, description = "Bad state, code or provider response", body = ApiErrorBody)
    )
)]
pub async fn google_callback(
    State(state): State<AppState>,
    query: Result<Query<OAuthCallbackParams>, QueryRejection>,
) -> AppResult<Json<TokenResponse>> {
    let Query(params) = query?;
    let oauth_state = params.state.unwrap_or_default();
    if !state.oauth_states.consume(&oauth_state).await {
        return Err(AppError::Validation("state did not match".to_string()));
    }

    let code = params.code.unwrap_or_default();
    let provider_token = state
        .provider
        .exchange_code(&code)
        .await
        .map_err(|e| AppError::Validation(format!("failed to exchange token: {e}")))?;

    let info = state
        .provider
        .user_info(&provider_token)
        .await
        .map_err(|e| AppError::Validation(format!("failed to get user info: {e}")))?;

    let user = identity_for_subject(state.repo.as_ref(), state.provider.as_ref(), &info).await?;
    tracing::info!(user_id = user.id, "oauth sign-in completed");
    Ok(Json(TokenResponse::bearer(user.access_token)))
}

/// dev_authorize
///
/// [Development Route] Stands in for the provider's consent page: sends the
/// browser straight back to the callback with a fixed code.
#[utoipa::path(
    get,
    path = "/v1/auth/dev-authorize",
    tag = "auth",
    params(DevAuthorizeParams),
    responses((status = 307, description = "Redirect to the OAuth callback"))
)]
pub async fn dev_authorize(
    State(state): State<AppState>,
    query: Result<Query<DevAuthorizeParams>, QueryRejection>,
) -> AppResult<Redirect> {
    let Query(params) = query?;
    let callback = format!(
        "{}{}",
        state.config.hostname.trim_end_matches('/'),
        CALLBACK_PATH
    );
    let url = Url::parse_with_params(
        &callback,
        &[
            ("code", "code"),
            ("state", params.state.as_deref().unwrap_or_default()),
        ],
    )
    .map_err(|e| AppError::Internal(format!("invalid callback url: {e}")))?;
    Ok(Redirect::temporary(url.as_str()))
}
