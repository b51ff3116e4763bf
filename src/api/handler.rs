//! HTTP handlers for the v1 API

use axum::{
    Json,
    extract::{
        FromRequest, FromRequestParts, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, ServiceError, StoreError};
use crate::handler::AppState;
use crate::model::{CommentId, SnippetId, UserId};

// ============================================================================
// Extractors
// ============================================================================

/// `axum::Json` whose rejection uses the API error shape.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(BadRequest))]
pub struct ApiJson<T>(pub T);

/// `axum::extract::Path` whose rejection uses the API error shape.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(BadRequest))]
pub struct ApiPath<T>(pub T);

/// Malformed path parameter or request body.
#[derive(Debug)]
pub struct BadRequest(String);

impl From<JsonRejection> for BadRequest {
    fn from(rejection: JsonRejection) -> Self {
        BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for BadRequest {
    fn from(rejection: PathRejection) -> Self {
        BadRequest(rejection.body_text())
    }
}

impl IntoResponse for BadRequest {
    fn into_response(self) -> Response {
        tracing::info!(error = %self.0, "rejected malformed request");
        (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: self.0 })).into_response()
    }
}

// ============================================================================
// Request Bodies
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct PostSnippetBody {
    pub contents: String,
    pub language: String,
}

#[derive(Debug, Deserialize)]
pub struct VoteBody {
    pub vote: i32,
}

#[derive(Debug, Deserialize)]
pub struct PostCommentBody {
    pub contents: String,
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn success<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse { data })).into_response()
}

fn created<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(ApiResponse { data })).into_response()
}

fn no_content() -> Response {
    (StatusCode::NO_CONTENT, ()).into_response()
}

pub fn status_for(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::Store(e) if e.is_not_found() => StatusCode::NOT_FOUND,
        ServiceError::Store(StoreError::AlreadyExists(_)) => StatusCode::CONFLICT,
        ServiceError::Store(StoreError::InvalidVote(_)) => StatusCode::BAD_REQUEST,
        ServiceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        ServiceError::Auth(AuthError::MalformedHash | AuthError::Hashing(_) | AuthError::InvalidSecret) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        ServiceError::Auth(_) => StatusCode::UNAUTHORIZED,
        ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
        ServiceError::InvalidLogin | ServiceError::InvalidPassword => StatusCode::UNAUTHORIZED,
        ServiceError::MustBeSnippetAuthor(_) | ServiceError::MustBeCommentAuthor(_) => StatusCode::FORBIDDEN,
    }
}

fn failure(action: &str, err: ServiceError) -> Response {
    let status = status_for(&err);
    if status.is_server_error() {
        tracing::error!(error = %crate::unpack_error(&err), "failed to {}", action);
    } else {
        tracing::info!(error = %err, status = status.as_u16(), "rejected {}", action);
    }
    (status, Json(ErrorResponse { error: err.to_string() })).into_response()
}

// ============================================================================
// Authentication
// ============================================================================

/// The user owning the token in the `Authorization` header.
pub struct CurrentUser(pub UserId);

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();

        state
            .service
            .user_id_by_token(token)
            .map(CurrentUser)
            .map_err(|e| failure("authenticate request", e))
    }
}

// ============================================================================
// Account Handlers
// ============================================================================

pub async fn create_account(State(state): State<AppState>, ApiJson(payload): ApiJson<Credentials>) -> Response {
    match state
        .service
        .create_account(&payload.username, &payload.password)
        .await
    {
        Ok(user) => created(user),
        Err(e) => failure("create account", e),
    }
}

pub async fn authenticate(State(state): State<AppState>, ApiJson(payload): ApiJson<Credentials>) -> Response {
    match state
        .service
        .authenticate(&payload.username, &payload.password)
        .await
    {
        Ok(session) => success(session),
        Err(e) => failure("authenticate", e),
    }
}

pub async fn get_current_user(State(state): State<AppState>, CurrentUser(current): CurrentUser) -> Response {
    match state.service.get_user(current).await {
        Ok(user) => success(user),
        Err(e) => failure("get current user", e),
    }
}

pub async fn get_user(
    State(state): State<AppState>,
    CurrentUser(_): CurrentUser,
    ApiPath(user): ApiPath<u64>,
) -> Response {
    match state.service.get_user(UserId(user)).await {
        Ok(user) => success(user),
        Err(e) => failure("get user", e),
    }
}

// ============================================================================
// Snippet Handlers
// ============================================================================

pub async fn post_snippet(
    State(state): State<AppState>,
    CurrentUser(current): CurrentUser,
    ApiJson(payload): ApiJson<PostSnippetBody>,
) -> Response {
    match state
        .service
        .post_snippet(current, &payload.contents, &payload.language)
        .await
    {
        Ok(posted) => created(posted),
        Err(e) => failure("post snippet", e),
    }
}

pub async fn get_snippets_by_user(
    State(state): State<AppState>,
    CurrentUser(current): CurrentUser,
    ApiPath(user): ApiPath<u64>,
) -> Response {
    match state.service.get_snippets_by_user(UserId(user), current).await {
        Ok(snippets) => success(snippets),
        Err(e) => failure("get snippets by user", e),
    }
}

pub async fn get_snippets_by_language(
    State(state): State<AppState>,
    CurrentUser(current): CurrentUser,
    ApiPath(language): ApiPath<String>,
) -> Response {
    match state.service.get_snippets_by_language(&language, current).await {
        Ok(snippets) => success(snippets),
        Err(e) => failure("get snippets by language", e),
    }
}

pub async fn get_snippet(
    State(state): State<AppState>,
    CurrentUser(current): CurrentUser,
    ApiPath(snippet): ApiPath<u64>,
) -> Response {
    match state.service.get_snippet(current, SnippetId(snippet)).await {
        Ok(snippet) => success(snippet),
        Err(e) => failure("get snippet", e),
    }
}

pub async fn delete_snippet(
    State(state): State<AppState>,
    CurrentUser(current): CurrentUser,
    ApiPath(snippet): ApiPath<u64>,
) -> Response {
    match state.service.delete_snippet(current, SnippetId(snippet)).await {
        Ok(()) => no_content(),
        Err(e) => failure("delete snippet", e),
    }
}

pub async fn vote(
    State(state): State<AppState>,
    CurrentUser(current): CurrentUser,
    ApiPath(snippet): ApiPath<u64>,
    ApiJson(payload): ApiJson<VoteBody>,
) -> Response {
    match state.service.vote(current, SnippetId(snippet), payload.vote).await {
        Ok(()) => no_content(),
        Err(e) => failure("vote", e),
    }
}

// ============================================================================
// Comment Handlers
// ============================================================================

pub async fn get_comments(
    State(state): State<AppState>,
    CurrentUser(_): CurrentUser,
    ApiPath(snippet): ApiPath<u64>,
) -> Response {
    match state.service.get_comments(SnippetId(snippet)).await {
        Ok(comments) => success(comments),
        Err(e) => failure("get comments", e),
    }
}

pub async fn post_comment(
    State(state): State<AppState>,
    CurrentUser(current): CurrentUser,
    ApiPath(snippet): ApiPath<u64>,
    ApiJson(payload): ApiJson<PostCommentBody>,
) -> Response {
    match state
        .service
        .post_comment(current, &payload.contents, SnippetId(snippet))
        .await
    {
        Ok(comment) => created(comment),
        Err(e) => failure("post comment", e),
    }
}

pub async fn delete_comment(
    State(state): State<AppState>,
    CurrentUser(current): CurrentUser,
    ApiPath(comment): ApiPath<u64>,
) -> Response {
    match state.service.delete_comment(current, CommentId(comment)).await {
        Ok(()) => no_content(),
        Err(e) => failure("delete comment", e),
    }
}
