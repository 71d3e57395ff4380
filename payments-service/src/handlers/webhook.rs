//! Webhook ingestion handler.
//!
//! No bearer auth here: the provider is not a token-holding caller. Integrity
//! comes from the signature policy inside the reconciler.

use axum::{extract::State, http::HeaderMap, Json};
use service_core::error::AppError;

use crate::services::reconciler::WebhookOutcome;
use crate::AppState;

pub const SIGNATURE_HEADER: &str = "x-payment-signature";

/// Accept a provider status callback and reconcile it onto the order.
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<serde_json::Value>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let outcome = state.reconciler.process(signature, &body).await?;

    // Stale deliveries are acked as well: redelivery would not change the
    // decision, and the event is already flagged in the logs.
    let message = match outcome {
        WebhookOutcome::Applied { .. } => "Webhook processed successfully",
        WebhookOutcome::Unchanged { .. } => "Webhook already processed",
        WebhookOutcome::Stale { .. } => "Webhook ignored as out-of-date",
    };

    Ok(Json(serde_json::json!({
        "success": true,
        "message": message,
    })))
}
