//! Payment orchestration.
//!
//! Creates the Order + seed OrderStatus pair, then asks the gateway for a
//! redirect URL. Both records are durably written before the gateway call and
//! are never rolled back if it fails: a payment intent must outlive a failed
//! collect attempt so operators can reconcile or retry out-of-band.

use mongodb::bson::DateTime;
use service_core::error::AppError;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{CreatePaymentRequest, PaymentCreated};
use crate::models::{Order, OrderStatus, StudentInfo, STATUS_PENDING};
use crate::services::gateway::{CollectGateway, CollectRequest, GatewayError, HealthProbe};
use crate::services::order_id::OrderIdGenerator;
use crate::services::repository::OrderStore;

pub struct PaymentOrchestrator {
    store: Arc<dyn OrderStore>,
    gateway: Arc<dyn CollectGateway>,
    order_ids: OrderIdGenerator,
}

impl PaymentOrchestrator {
    pub fn new(store: Arc<dyn OrderStore>, gateway: Arc<dyn CollectGateway>) -> Self {
        Self {
            store,
            gateway,
            order_ids: OrderIdGenerator::new(),
        }
    }

    /// Create a payment intent and obtain the gateway redirect.
    pub async fn create_payment(
        &self,
        request: CreatePaymentRequest,
    ) -> Result<PaymentCreated, AppError> {
        request.validate()?;

        let student_info = StudentInfo {
            name: request.student_info.name.clone(),
            id: request.student_info.id.clone(),
            email: request.student_info.email.clone(),
        };

        let order = self.persist_order(&request, student_info.clone()).await?;

        // Seed status row: placeholder amounts until the webhook reports the
        // authoritative outcome.
        let now = DateTime::now();
        let seed = OrderStatus {
            id: Uuid::new_v4(),
            collect_id: order.id,
            order_amount: request.order_amount,
            transaction_amount: request.order_amount,
            status: STATUS_PENDING.to_string(),
            payment_mode: Some(STATUS_PENDING.to_string()),
            bank_reference: None,
            payment_message: Some("initiated".to_string()),
            error_message: None,
            payment_time: None,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        match self.store.insert_status(&seed).await {
            Ok(()) => {}
            // The webhook can land between the two writes and create the row
            // first; its data is authoritative, so the seed simply yields.
            Err(AppError::Conflict(_)) => {
                tracing::warn!(
                    collect_id = %order.id,
                    custom_order_id = %order.custom_order_id,
                    "Status row already exists; webhook arrived before seed"
                );
            }
            Err(e) => return Err(e),
        }

        let collect = self
            .gateway
            .create_collect_request(CollectRequest {
                order_id: order.custom_order_id.clone(),
                amount: request.order_amount,
                student_info,
            })
            .await
            .map_err(map_gateway_error)?;

        tracing::info!(
            custom_order_id = %order.custom_order_id,
            transaction_id = %collect.transaction_id,
            amount = request.order_amount,
            "Payment initiated"
        );

        Ok(PaymentCreated {
            payment_url: collect.payment_url,
            order_id: order.custom_order_id,
            transaction_id: collect.transaction_id,
        })
    }

    /// Probe gateway connectivity.
    pub async fn test_connection(&self) -> HealthProbe {
        self.gateway.health_check().await
    }

    async fn persist_order(
        &self,
        request: &CreatePaymentRequest,
        student_info: StudentInfo,
    ) -> Result<Order, AppError> {
        let mut attempts = 0;
        loop {
            let now = DateTime::now();
            let order = Order {
                id: Uuid::new_v4(),
                school_id: request.school_id.clone(),
                trustee_id: request.trustee_id.clone(),
                student_info: student_info.clone(),
                gateway_name: request.gateway_name.clone(),
                custom_order_id: self.order_ids.next(),
                created_at: now,
                updated_at: now,
            };

            match self.store.insert_order(&order).await {
                Ok(()) => return Ok(order),
                // The unique index is the final guard on id generation;
                // regenerate once before giving up.
                Err(AppError::Conflict(e)) if attempts == 0 => {
                    attempts += 1;
                    tracing::warn!(
                        custom_order_id = %order.custom_order_id,
                        error = %e,
                        "Order id collision, regenerating"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn map_gateway_error(error: GatewayError) -> AppError {
    match error {
        GatewayError::AuthFailed => AppError::AuthError(anyhow::anyhow!(
            "Authentication failed. Please check your API credentials."
        )),
        GatewayError::Timeout | GatewayError::Network(_) => AppError::GatewayUnavailable(
            "Payment service temporarily unavailable. Please try again later.".to_string(),
        ),
        GatewayError::Protocol { status, body } => AppError::InternalError(anyhow::anyhow!(
            "Unexpected gateway response (status {}): {}",
            status,
            body
        )),
    }
}
