//! # API Handlers
//!
//! This module contains all the HTTP endpoint handlers for the DM ingestion
//! service.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde_json::{Value as JsonValue, json};
use tracing::error;

use crate::db;
use crate::error::ApiError;
use crate::models::ServiceInfo;
use crate::server::AppState;

pub mod webhooks;

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Liveness endpoint with a database ping
#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, description = "Service healthy", body = JsonValue),
        (status = 503, description = "Database unavailable", body = ApiError)
    ),
    tag = "root"
)]
pub async fn healthz(State(state): State<AppState>) -> Result<Json<JsonValue>, ApiError> {
    db::health_check(&state.db).await.map_err(|e| {
        error!(error = ?e, "Health check failed");
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
            "Database unavailable",
        )
    })?;

    Ok(Json(json!({ "status": "ok" })))
}
