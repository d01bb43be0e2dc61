use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use quillboard::{
    AppState, CredentialIdentityResolver, MemoryRepository, OAuthStateStore,
    ProviderIdentityResolver, ResolverState, TestIdentityProvider,
    config::{AppConfig, Env},
    create_router,
    error::ApiErrorBody,
    models::{Article, Category, Role, TokenResponse, User},
    provider::ProviderState,
    repository::RepositoryState,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::util::ServiceExt;

const HOST: &str = "http://127.0.0.1:8080";

// --- Test App ---

struct TestApp {
    router: Router,
    repo: RepositoryState,
}

/// Local wiring: in-memory storage and the development identity provider.
fn spawn_app() -> TestApp {
    spawn_app_with(AppConfig::default(), |repo, provider| {
        Arc::new(ProviderIdentityResolver::new(repo, provider))
    })
}

fn spawn_app_with(
    config: AppConfig,
    resolver: impl FnOnce(RepositoryState, ProviderState) -> ResolverState,
) -> TestApp {
    let repo: RepositoryState = Arc::new(MemoryRepository::new());
    let provider: ProviderState = Arc::new(TestIdentityProvider::new(HOST));
    let state = AppState {
        identity: resolver(repo.clone(), provider.clone()),
        provider,
        oauth_states: Arc::new(OAuthStateStore::new()),
        config,
        repo: repo.clone(),
    };
    TestApp {
        router: create_router(state),
        repo,
    }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, bytes.to_vec())
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header("AccessToken", token);
        }
        let (status, _, body) = self.send(builder.body(Body::empty()).unwrap()).await;
        (status, body)
    }

    async fn send_json(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Value,
    ) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header("AccessToken", token);
        }
        let (status, _, body) = self
            .send(builder.body(Body::from(body.to_string())).unwrap())
            .await;
        (status, body)
    }
}

fn location(headers: &axum::http::HeaderMap) -> String {
    headers
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string()
}

fn query_param(url: &str, name: &str) -> String {
    reqwest::Url::parse(url)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
        .unwrap()
}

// --- Tests ---

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app();
    let (status, body) = app.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = spawn_app();
    let (status, body) = app.get("/api-docs/openapi.json", None).await;
    assert_eq!(status, StatusCode::OK);

    let doc: Value = serde_json::from_slice(&body).unwrap();
    assert!(doc["paths"]["/v1/articles/{id}"].is_object());
}

#[tokio::test]
async fn test_lists_need_no_credential() {
    let app = spawn_app();
    for uri in ["/v1/users", "/v1/categories", "/v1/articles"] {
        let (status, body) = app.get(uri, None).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert_eq!(body, b"[]");
    }
}

#[tokio::test]
async fn test_path_and_query_rejections_use_the_envelope() {
    let app = spawn_app();
    let cases = [
        ("/v1/articles/%FF", "invalid path"),
        ("/v1/auth/google-callback?state=a&state=b&code=c", "invalid query"),
    ];
    for (uri, prefix) in cases {
        let (status, body) = app.get(uri, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");

        let envelope: ApiErrorBody = serde_json::from_slice(&body).unwrap();
        assert_eq!(envelope.code, 400);
        assert!(envelope.message.starts_with(prefix), "{}", envelope.message);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_requests_share_one_identity() {
    let app = Arc::new(spawn_app());

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..16 {
        let app = app.clone();
        tasks.spawn(async move { app.get("/v1/auth", Some("Writer")).await.0 });
    }
    while let Some(status) = tasks.join_next().await {
        assert_eq!(status.unwrap(), StatusCode::OK);
    }

    assert_eq!(app.repo.list_users().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_mutation_without_credential_is_forbidden_envelope() {
    let app = spawn_app();
    let (status, body) = app
        .send_json("POST", "/v1/categories", None, json!({ "name": "Recipes" }))
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    let error: ApiErrorBody = serde_json::from_slice(&body).unwrap();
    assert_eq!(error.code, 403);
    assert_eq!(error.message, "invalid access token");
}

#[tokio::test]
async fn test_dev_tokens_drive_the_full_article_flow() {
    let app = spawn_app();

    let (status, body) = app
        .send_json(
            "POST",
            "/v1/categories",
            Some("Administrator"),
            json!({ "name": "Recipes", "imageUrl": "https://img.example.com/r.png" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let category: Category = serde_json::from_slice(&body).unwrap();

    let (status, body) = app
        .send_json(
            "POST",
            "/v1/articles",
            Some("Writer"),
            json!({
                "categoryId": category.id,
                "title": "Overnight oats",
                "body": "Soak them.",
                "tags": ["breakfast", "oats"]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let article: Article = serde_json::from_slice(&body).unwrap();
    assert_eq!(article.tags, vec!["breakfast".to_string(), "oats".to_string()]);

    let (status, body) = app.get(&format!("/v1/articles/{}", article.id), None).await;
    assert_eq!(status, StatusCode::OK);
    let fetched: Article = serde_json::from_slice(&body).unwrap();
    assert_eq!(fetched, article);

    // A Reader is not the owner.
    let (status, _) = app
        .send_json(
            "PUT",
            &format!("/v1/articles/{}", article.id),
            Some("Reader"),
            json!({ "title": "Nope" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/v1/articles/{}", article.id))
        .header("AccessToken", "Administrator")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = app.send(request).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_malformed_body_is_bad_request_envelope() {
    let app = spawn_app();
    let request = Request::builder()
        .method("POST")
        .uri("/v1/categories")
        .header("AccessToken", "Administrator")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{ not json"))
        .unwrap();
    let (status, _, body) = app.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: ApiErrorBody = serde_json::from_slice(&body).unwrap();
    assert_eq!(error.code, 400);
}

#[tokio::test]
async fn test_unknown_role_is_rejected() {
    let app = spawn_app();
    let (_, body) = app.get("/v1/auth", Some("Reader")).await;
    let reader: User = serde_json::from_slice(&body).unwrap();

    let (status, _) = app
        .send_json(
            "PUT",
            &format!("/v1/users/{}", reader.id),
            Some("Administrator"),
            json!({ "role": "Superuser" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_changes_another_users_role() {
    let app = spawn_app();
    let (_, body) = app.get("/v1/auth", Some("Reader")).await;
    let reader: User = serde_json::from_slice(&body).unwrap();
    assert_eq!(reader.role, Role::Reader);

    let (status, body) = app
        .send_json(
            "PUT",
            &format!("/v1/users/{}", reader.id),
            Some("Administrator"),
            json!({ "role": "Writer", "name": "Ignored" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let updated: User = serde_json::from_slice(&body).unwrap();
    assert_eq!(updated.role, Role::Writer);
    assert_eq!(updated.name, reader.name);
    assert_eq!(updated.email, reader.email);
}

#[tokio::test]
async fn test_user_json_never_exposes_credential() {
    let app = spawn_app();
    let (status, body) = app.get("/v1/auth", Some("Writer")).await;
    assert_eq!(status, StatusCode::OK);

    let json: Value = serde_json::from_slice(&body).unwrap();
    assert!(json.get("accessToken").is_none());
    assert!(json.get("googleSub").is_none());
    assert_eq!(json["role"], "Writer");

    let stored = &app.repo.list_users().await.unwrap()[0];
    assert_eq!(stored.access_token.len(), 80);
}

// --- OAuth ---

#[tokio::test]
async fn test_google_login_redirects_with_fresh_state() {
    let app = spawn_app();
    let request = Request::builder()
        .uri("/v1/auth/google-login")
        .body(Body::empty())
        .unwrap();
    let (status, headers, _) = app.send(request).await;

    assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
    let target = location(&headers);
    assert!(target.starts_with(&format!("{HOST}/v1/auth/dev-authorize?state=")));
}

#[tokio::test]
async fn test_oauth_round_trip_and_state_reuse() {
    let app = spawn_app();

    let login = Request::builder()
        .uri("/v1/auth/google-login")
        .body(Body::empty())
        .unwrap();
    let (_, headers, _) = app.send(login).await;
    let state = query_param(&location(&headers), "state");

    // The development consent page bounces straight back to the callback.
    let authorize = Request::builder()
        .uri(format!("/v1/auth/dev-authorize?state={state}"))
        .body(Body::empty())
        .unwrap();
    let (status, headers, _) = app.send(authorize).await;
    assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
    let callback = location(&headers);
    assert!(callback.starts_with(&format!("{HOST}/v1/auth/google-callback")));
    assert_eq!(query_param(&callback, "code"), "code");
    assert_eq!(query_param(&callback, "state"), state);

    let callback_uri = format!("/v1/auth/google-callback?state={state}&code=code");
    let (status, body) = app.get(&callback_uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let token: TokenResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(token.token_type, "Bearer");
    assert_eq!(token.access_token.len(), 80);

    // Single use.
    let (status, body) = app.get(&callback_uri, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: ApiErrorBody = serde_json::from_slice(&body).unwrap();
    assert_eq!(error.message, "state did not match");
}

#[tokio::test]
async fn test_callback_with_unknown_state_is_rejected() {
    let app = spawn_app();
    let (status, _) = app
        .get("/v1/auth/google-callback?state=pseudo-random&code=code", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(app.repo.list_users().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_credential_exchange_then_credential_mode_lookup() {
    let config = AppConfig {
        env: Env::Production,
        ..AppConfig::default()
    };
    let app = spawn_app_with(config, |repo, _| {
        Arc::new(CredentialIdentityResolver::new(repo))
    });

    let (status, body) = app
        .send_json(
            "POST",
            "/v1/auth",
            None,
            json!({ "providerAccessToken": "Writer" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let token: TokenResponse = serde_json::from_slice(&body).unwrap();

    // Exchanging again returns the same credential for the same subject.
    let (_, body) = app
        .send_json(
            "POST",
            "/v1/auth",
            None,
            json!({ "providerAccessToken": "Writer" }),
        )
        .await;
    let again: TokenResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(again.access_token, token.access_token);

    let (status, body) = app.get("/v1/auth", Some(&token.access_token)).await;
    assert_eq!(status, StatusCode::OK);
    let me: User = serde_json::from_slice(&body).unwrap();
    assert_eq!(me.role, Role::Writer);

    let (status, _) = app.get("/v1/auth", Some("not-a-credential")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_dev_authorize_is_not_mounted_in_production() {
    let config = AppConfig {
        env: Env::Production,
        ..AppConfig::default()
    };
    let app = spawn_app_with(config, |repo, _| {
        Arc::new(CredentialIdentityResolver::new(repo))
    });

    let (status, _) = app.get("/v1/auth/dev-authorize?state=abc", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_custom_credential_header() {
    let config = AppConfig {
        access_token_header: "X-Api-Token".to_string(),
        ..AppConfig::default()
    };
    let app = spawn_app_with(config, |repo, provider| {
        Arc::new(ProviderIdentityResolver::new(repo, provider))
    });

    let (status, _) = app.get("/v1/auth", Some("Administrator")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let request = Request::builder()
        .uri("/v1/auth")
        .header("X-Api-Token", "Administrator")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_responses_carry_request_id() {
    let app = spawn_app();
    let request = Request::builder()
        .uri("/v1/categories")
        .body(Body::empty())
        .unwrap();
    let (_, headers, _) = app.send(request).await;
    assert!(headers.contains_key("x-request-id"));
}
