use anyhow::Result;
use dotenvy::dotenv;
use secrecy::Secret;
use serde::Deserialize;
use std::env;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub gateway: GatewayConfig,
    pub auth: AuthConfig,
    pub service_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub db_name: String,
}

/// Credentials and endpoints for the external collect gateway.
#[derive(Deserialize, Clone, Debug)]
pub struct GatewayConfig {
    pub base_url: String,
    /// API key used to sign outbound collect requests (JWT HS256).
    pub api_key: Secret<String>,
    /// Provider-issued merchant key, sent in the collect payload.
    pub pg_key: Secret<String>,
    /// School identity registered with the provider.
    pub school_id: String,
    /// Where the provider redirects the payer after checkout.
    pub callback_url: String,
    /// Secret for webhook HMAC verification.
    pub webhook_secret: Secret<String>,
    /// Reject webhook deliveries that carry no signature header.
    pub require_webhook_signature: bool,
    /// Upper bound on any single call to the provider.
    pub timeout_secs: u64,
}

#[derive(Deserialize, Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: Secret<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let host = env::var("PAYMENT_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PAYMENT_SERVICE_PORT")
            .unwrap_or_else(|_| "3003".to_string())
            .parse()?;

        let db_url = env::var("PAYMENT_DATABASE_URL")
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
        let db_name =
            env::var("PAYMENT_DATABASE_NAME").unwrap_or_else(|_| "school_payments".to_string());

        let gateway_base_url =
            env::var("PAYMENT_GATEWAY_BASE_URL").unwrap_or_else(|_| "http://localhost:9100".to_string());
        let api_key = env::var("PAYMENT_GATEWAY_API_KEY").unwrap_or_else(|_| "dev-api-key".to_string());
        let pg_key = env::var("PAYMENT_GATEWAY_PG_KEY").unwrap_or_else(|_| "dev-pg-key".to_string());
        let school_id = env::var("PAYMENT_GATEWAY_SCHOOL_ID").unwrap_or_default();
        let callback_url = env::var("PAYMENT_CALLBACK_URL").unwrap_or_default();
        let webhook_secret =
            env::var("PAYMENT_WEBHOOK_SECRET").unwrap_or_else(|_| "dev-webhook-secret".to_string());
        let require_webhook_signature = env::var("PAYMENT_REQUIRE_WEBHOOK_SIGNATURE")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);
        let gateway_timeout_secs = env::var("PAYMENT_GATEWAY_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        let jwt_secret = env::var("JWT_SECRET").unwrap_or_else(|_| "dev-secret".to_string());

        Ok(Self {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                url: Secret::new(db_url),
                db_name,
            },
            gateway: GatewayConfig {
                base_url: gateway_base_url,
                api_key: Secret::new(api_key),
                pg_key: Secret::new(pg_key),
                school_id,
                callback_url,
                webhook_secret: Secret::new(webhook_secret),
                require_webhook_signature,
                timeout_secs: gateway_timeout_secs,
            },
            auth: AuthConfig {
                jwt_secret: Secret::new(jwt_secret),
            },
            service_name: "payments-service".to_string(),
        })
    }
}
