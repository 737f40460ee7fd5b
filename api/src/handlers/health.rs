use axum::Json;
use serde_json::{json, Value};

/// Health check endpoint, process liveness only
#[tracing::instrument]
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
