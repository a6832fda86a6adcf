use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::cache::NewsCache;
use crate::heuristics::build_digest;

pub struct AppState {
    pub cache: NewsCache,
}

// Custom error type
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("Request failed: {}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "error": "Failed to aggregate news.",
                "details": self.0.to_string(),
            })),
        )
            .into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        AppError(err.into())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct NewsQuery {
    pub refresh: Option<String>,
}

impl NewsQuery {
    /// Only `refresh=1` forces a recomputation.
    pub fn force_refresh(&self) -> bool {
        self.refresh.as_deref() == Some("1")
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/news", get(news))
        .route("/api/digest", get(digest))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Route handlers
pub async fn news(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NewsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let result = state.cache.get(query.force_refresh()).await?;
    Ok(Json(result))
}

pub async fn digest(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NewsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let result = state.cache.get(query.force_refresh()).await?;
    Ok(Json(build_digest(&result, Utc::now())))
}

pub async fn health() -> impl IntoResponse {
    "OK"
}
