use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use splinter::auth::TokenAuthenticator;
use splinter::handler::{AppState, app};
use splinter::highlighter::{Dispatcher, DispatcherOptions, PygmentsRenderer};
use splinter::service::Splinter;
use splinter::storage::{Backend, MemoryStore};
use tower::ServiceExt;

fn test_app(queue_size: usize) -> Router {
    let store = Arc::new(Backend::Memory(MemoryStore::new()));
    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        PygmentsRenderer::default(),
        DispatcherOptions {
            queue_size,
            ..Default::default()
        },
    ));
    let service = Splinter::new(
        store,
        dispatcher,
        TokenAuthenticator::new("http-tests", chrono::Duration::minutes(5)).unwrap(),
    );
    app(AppState {
        service: Arc::new(service),
    })
}

async fn call(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, token);
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn sign_up(app: &Router, username: &str) -> (u64, String) {
    let credentials = json!({"username": username, "password": "secret123"});
    let (status, body) = call(app, "POST", "/api/v1/create_account", None, Some(credentials.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["data"]["id"].as_u64().unwrap();

    let (status, body) = call(app, "POST", "/api/v1/authenticate", None, Some(credentials)).await;
    assert_eq!(status, StatusCode::OK);
    (id, body["data"]["token"].as_str().unwrap().to_string())
}

#[tokio::test]
async fn healthcheck_reports_highlighter_stats() {
    let app = test_app(4);
    let (status, body) = call(&app, "GET", "/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["highlighter"]["pending"], 0);
}

#[tokio::test]
async fn account_flow() {
    let app = test_app(4);
    let (id, token) = sign_up(&app, "alice").await;
    assert_eq!(id, 1);

    let (status, body) = call(&app, "GET", "/api/v1/users/current", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["username"], "alice");
    assert!(body["data"].get("password_hash").is_none());

    let (status, _) = call(
        &app,
        "POST",
        "/api/v1/create_account",
        None,
        Some(json!({"username": "alice", "password": "another123"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call(
        &app,
        "POST",
        "/api/v1/authenticate",
        None,
        Some(json!({"username": "alice", "password": "wrong1234"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(
        &app,
        "POST",
        "/api/v1/create_account",
        None,
        Some(json!({"username": "x!", "password": "secret123"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn protected_routes_require_a_token() {
    let app = test_app(4);
    let (status, body) = call(&app, "GET", "/api/v1/users/current", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "missing token");

    let (status, _) = call(&app, "GET", "/api/v1/snippets/1", Some("1.2.3"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn snippet_vote_and_comment_flow() {
    let app = test_app(4);
    let (alice, alice_token) = sign_up(&app, "alice").await;
    let (_, bob_token) = sign_up(&app, "bob").await;

    let (status, body) = call(
        &app,
        "POST",
        "/api/v1/snippets",
        Some(&alice_token),
        Some(json!({"contents": "print(1)", "language": "python"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["data"].get("warning").is_none());
    assert_eq!(body["data"]["snippet"]["highlight"]["state"], "pending");
    let snippet = body["data"]["snippet"]["id"].as_u64().unwrap();

    let vote_uri = format!("/api/v1/snippets/{snippet}/vote");
    let (status, _) = call(&app, "POST", &vote_uri, Some(&bob_token), Some(json!({"vote": 1}))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, "POST", &vote_uri, Some(&bob_token), Some(json!({"vote": 3}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(&app, "GET", &format!("/api/v1/snippets/{snippet}"), Some(&bob_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["rating"]["likes"], 1);
    assert_eq!(body["data"]["current_user_vote"], 1);

    let (status, body) = call(&app, "GET", "/api/v1/snippets/language/python", Some(&bob_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, body) = call(
        &app,
        "GET",
        &format!("/api/v1/users/{alice}/snippets"),
        Some(&bob_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["contents"], "print(1)");

    let comments_uri = format!("/api/v1/snippets/{snippet}/comments");
    let (status, body) = call(&app, "POST", &comments_uri, Some(&bob_token), Some(json!({"contents": "neat"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    let comment = body["data"]["id"].as_u64().unwrap();

    let (status, body) = call(&app, "GET", &comments_uri, Some(&alice_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["contents"], "neat");

    let comment_uri = format!("/api/v1/comments/{comment}");
    let (status, _) = call(&app, "DELETE", &comment_uri, Some(&alice_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&app, "DELETE", &comment_uri, Some(&bob_token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let snippet_uri = format!("/api/v1/snippets/{snippet}");
    let (status, _) = call(&app, "DELETE", &snippet_uri, Some(&bob_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&app, "DELETE", &snippet_uri, Some(&alice_token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, "GET", &snippet_uri, Some(&alice_token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_requests_get_json_errors() {
    let app = test_app(4);
    let (_, token) = sign_up(&app, "alice").await;

    let (status, body) = call(&app, "GET", "/api/v1/snippets/abc", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/create_account")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"username\": "))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["error"].is_string());

    let (status, body) = call(
        &app,
        "POST",
        "/api/v1/snippets/1/vote",
        Some(&token),
        Some(json!({"vote": "up"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn full_highlight_queue_is_reported_as_warning() {
    let app = test_app(1);
    let (_, token) = sign_up(&app, "alice").await;
    let body = json!({"contents": "print(1)", "language": "python"});

    let (status, first) = call(&app, "POST", "/api/v1/snippets", Some(&token), Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(first["data"].get("warning").is_none());

    let (status, second) = call(&app, "POST", "/api/v1/snippets", Some(&token), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(second["data"]["warning"].as_str().unwrap().contains("queue is full"));

    let (_, health) = call(&app, "GET", "/", None, None).await;
    assert_eq!(health["highlighter"]["rejected"], 1);
    assert_eq!(health["highlighter"]["pending"], 1);
}
