//! Payment creation and gateway health handlers.

use axum::{extract::State, http::StatusCode, Json};
use service_core::error::AppError;
use service_core::middleware::auth::AuthUser;

use crate::dtos::{ApiResponse, CreatePaymentRequest, PaymentCreated};
use crate::services::gateway::HealthProbe;
use crate::AppState;

/// Create a payment order and return the gateway redirect.
pub async fn create_payment(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(payload): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PaymentCreated>>), AppError> {
    tracing::info!(
        user = %claims.sub,
        school_id = %payload.school_id,
        gateway = %payload.gateway_name,
        amount = payload.order_amount,
        "Creating payment"
    );

    let created = state.orchestrator.create_payment(payload).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Payment initiated successfully", created)),
    ))
}

/// Probe gateway connectivity and return the raw result.
pub async fn test_connection(
    State(state): State<AppState>,
    AuthUser(_claims): AuthUser,
) -> Json<serde_json::Value> {
    let probe: HealthProbe = state.orchestrator.test_connection().await;

    let message = if probe.connected {
        "Payment gateway connection successful"
    } else {
        "Payment gateway connection failed"
    };

    Json(serde_json::json!({
        "success": probe.connected,
        "message": message,
        "data": probe,
    }))
}
