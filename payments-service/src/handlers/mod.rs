//! HTTP handlers for the payments service.

pub mod payments;
pub mod transactions;
pub mod webhook;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "payments-service",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// JSON 404 for unknown routes.
pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "success": false,
            "message": "API endpoint not found"
        })),
    )
}
