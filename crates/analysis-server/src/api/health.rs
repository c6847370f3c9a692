//! Liveness endpoints.

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::db;
use crate::error::ApiError;
use crate::AppState;

/// Health check endpoint.
///
/// Returns "ok" to indicate the server is running.
pub async fn health() -> &'static str {
    "ok"
}

/// Database health check.
///
/// # Endpoint
///
/// `GET /health/db`
///
/// # Response
///
/// - `200 OK`: `{"status": "ok"}`
/// - `503 Service Unavailable`: The database did not answer
pub async fn health_db(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    db::ping(&state.db)
        .map_err(|e| ApiError::Unavailable(format!("Database unavailable: {}", e)))?;
    Ok(Json(json!({ "status": "ok" })))
}
