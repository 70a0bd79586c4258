// src/api.rs
use std::any::Any;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{error, warn};

use crate::orchestrator::{Orchestrator, ProcessedPost, TransformError};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/get_random_post", get(get_random_post))
        .layer(CorsLayer::very_permissive())
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `{ "error": "..." }` with a non-2xx status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<TransformError> for ApiError {
    fn from(e: TransformError) -> Self {
        let status = match e {
            TransformError::NoContentAvailable | TransformError::MetadataMissing { .. } => {
                StatusCode::NOT_FOUND
            }
            TransformError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

async fn get_random_post(State(state): State<AppState>) -> Result<Json<ProcessedPost>, ApiError> {
    match state.orchestrator.process_random_post().await {
        Ok(out) => Ok(Json(out)),
        Err(e) => {
            if matches!(e, TransformError::Storage(_)) {
                error!(target: "transform", error = ?e, "transform request failed");
            } else {
                warn!(target: "transform", error = %e, "transform request rejected");
            }
            Err(e.into())
        }
    }
}

/// A panicking handler still answers with the JSON error shape.
fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(target: "transform", panic = detail, "request handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal error" })),
    )
        .into_response()
}
