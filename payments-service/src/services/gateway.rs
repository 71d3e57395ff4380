//! Collect-gateway client.
//!
//! The gateway is modeled as an injected capability (`CollectGateway`) so the
//! orchestrator and the webhook reconciler never touch a process-wide
//! singleton, and tests can substitute a scripted implementation. Failures
//! are structured variants, not message strings to pattern-match on.

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::GatewayConfig;
use crate::models::StudentInfo;

/// Failure modes of a gateway call.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway rejected credentials")]
    AuthFailed,
    #[error("gateway call timed out")]
    Timeout,
    #[error("network failure contacting gateway: {0}")]
    Network(String),
    #[error("unexpected gateway response (status {status}): {body}")]
    Protocol { status: u16, body: String },
}

/// Input to a collect request.
#[derive(Debug, Clone)]
pub struct CollectRequest {
    /// The order's `custom_order_id`.
    pub order_id: String,
    pub amount: f64,
    pub student_info: StudentInfo,
}

/// What the provider returns for a collect request.
///
/// Field names vary between provider API revisions; both spellings are
/// accepted.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CollectResponse {
    #[serde(alias = "url")]
    pub payment_url: String,
    #[serde(alias = "txn_id")]
    pub transaction_id: String,
}

/// Result of the connectivity probe, returned raw to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct HealthProbe {
    pub connected: bool,
    pub status: Option<u16>,
    pub detail: Option<String>,
}

/// Capability handed to the orchestrator and the webhook reconciler.
#[async_trait]
pub trait CollectGateway: Send + Sync {
    /// Ask the provider to begin collecting payment for an order.
    async fn create_collect_request(
        &self,
        request: CollectRequest,
    ) -> Result<CollectResponse, GatewayError>;

    /// Verify a webhook delivery against its signature header.
    fn verify_webhook_signature(&self, payload: &str, signature: &str) -> bool;

    /// Connectivity health check against the provider.
    async fn health_check(&self) -> HealthProbe;
}

/// Claims signed into the collect-request bearer token.
#[derive(Debug, Serialize)]
struct CollectClaims<'a> {
    pg_key: &'a str,
    school_id: &'a str,
    order_id: &'a str,
    amount: f64,
    callback_url: &'a str,
    student_info: &'a StudentInfo,
    timestamp: String,
}

/// HTTP implementation over the provider's collect API.
#[derive(Clone)]
pub struct HttpCollectGateway {
    client: Client,
    config: GatewayConfig,
}

impl HttpCollectGateway {
    pub fn new(config: GatewayConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client, config }
    }

    /// Sign the collect payload with the API key (HS256), as the provider
    /// requires the body claims in the Authorization token.
    fn sign(&self, claims: &CollectClaims<'_>) -> Result<String, GatewayError> {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(self.config.api_key.expose_secret().as_bytes()),
        )
        .map_err(|e| GatewayError::Protocol {
            status: 0,
            body: format!("failed to sign collect request: {}", e),
        })
    }

    fn map_transport_error(e: reqwest::Error) -> GatewayError {
        if e.is_timeout() {
            GatewayError::Timeout
        } else {
            GatewayError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl CollectGateway for HttpCollectGateway {
    async fn create_collect_request(
        &self,
        request: CollectRequest,
    ) -> Result<CollectResponse, GatewayError> {
        let claims = CollectClaims {
            pg_key: self.config.pg_key.expose_secret(),
            school_id: &self.config.school_id,
            order_id: &request.order_id,
            amount: request.amount,
            callback_url: &self.config.callback_url,
            student_info: &request.student_info,
            timestamp: Utc::now().to_rfc3339(),
        };

        let token = self.sign(&claims)?;
        let url = format!("{}/create-collect-request", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&claims)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(Self::map_transport_error)?;

        tracing::debug!(status = %status, body = %body, "Gateway collect-request response");

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(GatewayError::AuthFailed);
        }

        if !status.is_success() {
            return Err(GatewayError::Protocol {
                status: status.as_u16(),
                body,
            });
        }

        let collect: CollectResponse =
            serde_json::from_str(&body).map_err(|_| GatewayError::Protocol {
                status: status.as_u16(),
                body,
            })?;

        tracing::info!(
            order_id = %request.order_id,
            transaction_id = %collect.transaction_id,
            "Collect request created"
        );

        Ok(collect)
    }

    fn verify_webhook_signature(&self, payload: &str, signature: &str) -> bool {
        service_core::utils::signature::verify_signature(
            self.config.webhook_secret.expose_secret(),
            payload,
            signature,
        )
        .unwrap_or(false)
    }

    async fn health_check(&self) -> HealthProbe {
        let url = format!("{}/health", self.config.base_url);

        match self.client.get(&url).send().await {
            Ok(response) => {
                let status = response.status();
                HealthProbe {
                    connected: status.is_success(),
                    status: Some(status.as_u16()),
                    detail: response.text().await.ok(),
                }
            }
            Err(e) => HealthProbe {
                connected: false,
                status: None,
                detail: Some(e.to_string()),
            },
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_response_accepts_both_field_spellings() {
        let canonical: CollectResponse = serde_json::from_str(
            r#"{"payment_url":"https://pay.example/p/1","transaction_id":"txn_1"}"#,
        )
        .unwrap();
        let aliased: CollectResponse =
            serde_json::from_str(r#"{"url":"https://pay.example/p/1","txn_id":"txn_1"}"#).unwrap();

        assert_eq!(canonical, aliased);
    }
}
