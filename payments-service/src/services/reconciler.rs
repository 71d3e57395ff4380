//! Webhook reconciliation.
//!
//! Maps an asynchronous provider callback onto the OrderStatus row of the
//! order it references. The upsert is guarded: a per-order `version` counter
//! and the [`decide_transition`] rule keep a late or replayed delivery from
//! silently regressing a terminal state, since the provider gives no ordering
//! guarantee.

use chrono::{DateTime as ChronoDateTime, Utc};
use mongodb::bson::DateTime;
use serde::Deserialize;
use service_core::error::AppError;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{decide_transition, OrderStatus, Transition, WebhookLog};
use crate::services::gateway::CollectGateway;
use crate::services::repository::OrderStore;

/// Provider webhook envelope. Everything of interest lives in `order_info`.
#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    pub order_info: OrderInfo,
}

/// Canonical shape of the provider's order report.
///
/// `Payment_message` is a live casing variant in provider deliveries and is
/// accepted alongside the lowercase spelling.
#[derive(Debug, Deserialize)]
pub struct OrderInfo {
    /// The order's `custom_order_id`.
    pub order_id: String,
    pub order_amount: f64,
    pub transaction_amount: f64,
    pub status: String,
    pub payment_mode: Option<String>,
    pub bank_reference: Option<String>,
    #[serde(alias = "Payment_message")]
    pub payment_message: Option<String>,
    pub error_message: Option<String>,
    pub payment_time: Option<String>,
}

/// What the reconciler did with a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The status row was created or overwritten.
    Applied { collect_id: Uuid, version: i64 },
    /// A byte-for-byte replay; the row already holds these fields.
    Unchanged { collect_id: Uuid },
    /// The delivery would regress a terminal state; flagged and dropped.
    Stale {
        collect_id: Uuid,
        current: String,
        incoming: String,
    },
}

pub struct WebhookReconciler {
    store: Arc<dyn OrderStore>,
    gateway: Arc<dyn CollectGateway>,
    require_signature: bool,
}

impl WebhookReconciler {
    pub fn new(
        store: Arc<dyn OrderStore>,
        gateway: Arc<dyn CollectGateway>,
        require_signature: bool,
    ) -> Self {
        Self {
            store,
            gateway,
            require_signature,
        }
    }

    /// Ingest one webhook delivery.
    pub async fn process(
        &self,
        signature: Option<&str>,
        raw_body: &str,
    ) -> Result<WebhookOutcome, AppError> {
        match signature {
            Some(signature) => {
                if !self.gateway.verify_webhook_signature(raw_body, signature) {
                    return Err(AppError::InvalidSignature(anyhow::anyhow!(
                        "Invalid signature"
                    )));
                }
            }
            None if self.require_signature => {
                return Err(AppError::InvalidSignature(anyhow::anyhow!(
                    "Missing webhook signature"
                )));
            }
            None => {
                tracing::debug!("Webhook delivered without signature header");
            }
        }

        let payload: serde_json::Value = serde_json::from_str(raw_body)
            .map_err(|_| AppError::BadRequest(anyhow::anyhow!("Invalid webhook payload")))?;

        let log_id = self.audit(&payload).await;

        let envelope: WebhookEnvelope = serde_json::from_value(payload)
            .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Malformed order_info: {}", e)))?;
        let info = envelope.order_info;

        let status = info.status.trim().to_lowercase();
        let payment_time = info.payment_time.as_deref().and_then(parse_payment_time);

        let order = self
            .store
            .find_order_by_custom_id(&info.order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Order not found")))?;

        let now = DateTime::now();
        let current = self.store.find_status_by_collect_id(order.id).await?;

        let outcome = match current {
            // Webhook won the race against the orchestrator's seed write;
            // create the row from the delivery alone.
            None => {
                let row = OrderStatus {
                    id: Uuid::new_v4(),
                    collect_id: order.id,
                    order_amount: info.order_amount,
                    transaction_amount: info.transaction_amount,
                    status: status.clone(),
                    payment_mode: info.payment_mode,
                    bank_reference: info.bank_reference,
                    payment_message: info.payment_message,
                    error_message: info.error_message,
                    payment_time,
                    version: 1,
                    created_at: now,
                    updated_at: now,
                };
                self.store.replace_status(&row).await?;
                WebhookOutcome::Applied {
                    collect_id: order.id,
                    version: 1,
                }
            }
            Some(existing) => match decide_transition(&existing.status, &status) {
                Transition::Stale => {
                    tracing::warn!(
                        collect_id = %order.id,
                        custom_order_id = %order.custom_order_id,
                        current = %existing.status,
                        incoming = %status,
                        "Out-of-order webhook would regress terminal state; dropped"
                    );
                    WebhookOutcome::Stale {
                        collect_id: order.id,
                        current: existing.status,
                        incoming: status.clone(),
                    }
                }
                Transition::Apply => {
                    let row = OrderStatus {
                        id: existing.id,
                        collect_id: order.id,
                        order_amount: info.order_amount,
                        transaction_amount: info.transaction_amount,
                        status: status.clone(),
                        payment_mode: info.payment_mode,
                        bank_reference: info.bank_reference,
                        payment_message: info.payment_message,
                        error_message: info.error_message,
                        payment_time,
                        version: existing.version + 1,
                        created_at: existing.created_at,
                        updated_at: now,
                    };

                    if same_fields(&existing, &row) {
                        WebhookOutcome::Unchanged {
                            collect_id: order.id,
                        }
                    } else {
                        self.store.replace_status(&row).await?;
                        WebhookOutcome::Applied {
                            collect_id: order.id,
                            version: row.version,
                        }
                    }
                }
            },
        };

        if let (Some(log_id), WebhookOutcome::Applied { version, .. }) = (log_id, &outcome) {
            tracing::info!(
                collect_id = %order.id,
                custom_order_id = %order.custom_order_id,
                status = %status,
                version = version,
                "Webhook applied"
            );
            if let Err(e) = self.store.mark_webhook_processed(log_id).await {
                tracing::warn!(error = %e, "Failed to mark webhook log processed");
            }
        }

        Ok(outcome)
    }

    /// Persist the raw payload for diagnostics. Failures never abort
    /// reconciliation.
    async fn audit(&self, payload: &serde_json::Value) -> Option<Uuid> {
        let log = WebhookLog {
            id: Uuid::new_v4(),
            payload: payload.clone(),
            received_at: DateTime::now(),
            processed: false,
        };

        match self.store.insert_webhook_log(&log).await {
            Ok(()) => Some(log.id),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to persist webhook log");
                None
            }
        }
    }
}

/// True when a replacement carries the same provider-reported fields as the
/// stored row, i.e. the delivery is a replay.
fn same_fields(existing: &OrderStatus, incoming: &OrderStatus) -> bool {
    existing.order_amount == incoming.order_amount
        && existing.transaction_amount == incoming.transaction_amount
        && existing.status == incoming.status
        && existing.payment_mode == incoming.payment_mode
        && existing.bank_reference == incoming.bank_reference
        && existing.payment_message == incoming.payment_message
        && existing.error_message == incoming.error_message
        && existing.payment_time == incoming.payment_time
}

fn parse_payment_time(raw: &str) -> Option<DateTime> {
    match ChronoDateTime::parse_from_rfc3339(raw) {
        Ok(parsed) => Some(DateTime::from_chrono(parsed.with_timezone(&Utc))),
        Err(e) => {
            tracing::warn!(payment_time = %raw, error = %e, "Unparseable payment_time");
            None
        }
    }
}
