use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::Method,
    response::IntoResponse,
    routing::get,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use tracing::info;

use crate::highlighter::{DispatchStats, PygmentsRenderer};
use crate::service::Splinter;
use crate::storage::Backend;

pub type AppService = Splinter<Backend, PygmentsRenderer>;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AppService>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub highlighter: DispatchStats,
}

pub async fn healthcheck(State(state): State<AppState>) -> impl IntoResponse {
    info!("got healthcheck request");
    Json(HealthResponse {
        status: "ok".to_string(),
        highlighter: state.service.highlighter().stats(),
    })
}

/// Full router: healthcheck, the v1 API and CORS.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/", get(healthcheck))
        .nest("/api/v1", crate::api::routes())
        .layer(cors)
        .with_state(state)
}
