pub mod config;
pub mod dtos;
pub mod handlers;
pub mod models;
pub mod services;

use axum::middleware::{from_fn, from_fn_with_state};
use axum::{
    routing::{get, post},
    Router,
};
use mongodb::{options::ClientOptions, Client};
use secrecy::ExposeSecret;
use service_core::middleware::{
    auth::{auth_middleware, JwtVerifier},
    tracing::request_id_middleware,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use config::Config;
use services::{
    CollectGateway, HttpCollectGateway, MongoOrderStore, OrderStore, PaymentOrchestrator,
    WebhookReconciler,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub jwt: JwtVerifier,
    pub store: Arc<dyn OrderStore>,
    pub orchestrator: Arc<PaymentOrchestrator>,
    pub reconciler: Arc<WebhookReconciler>,
}

impl AppState {
    /// Wire the service graph over the given store and gateway capabilities.
    pub fn new(
        config: Config,
        store: Arc<dyn OrderStore>,
        gateway: Arc<dyn CollectGateway>,
    ) -> Self {
        let jwt = JwtVerifier::new(config.auth.jwt_secret.expose_secret());
        let orchestrator = Arc::new(PaymentOrchestrator::new(store.clone(), gateway.clone()));
        let reconciler = Arc::new(WebhookReconciler::new(
            store.clone(),
            gateway,
            config.gateway.require_webhook_signature,
        ));

        Self {
            config,
            jwt,
            store,
            orchestrator,
            reconciler,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/payment/create", post(handlers::payments::create_payment))
        .route(
            "/payment/test-connection",
            get(handlers::payments::test_connection),
        )
        .route(
            "/transactions",
            get(handlers::transactions::list_transactions),
        )
        .route(
            "/transactions/school/:school_id",
            get(handlers::transactions::list_transactions_by_school),
        )
        .route(
            "/transactions/status/:custom_order_id",
            get(handlers::transactions::transaction_status),
        )
        .route_layer(from_fn_with_state(state.jwt.clone(), auth_middleware));

    Router::new()
        .route("/health", get(handlers::health_check))
        // Webhooks come from the provider, not a token-holding caller.
        .route("/webhook", post(handlers::webhook::handle_webhook))
        .merge(protected)
        .fallback(handlers::not_found)
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub struct Application {
    port: u16,
    router: Router,
}

impl Application {
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let mut client_options = ClientOptions::parse(config.database.url.expose_secret()).await?;
        client_options.app_name = Some(config.service_name.clone());

        let client = Client::with_options(client_options)?;
        let db = client.database(&config.database.db_name);

        let store = MongoOrderStore::new(&db);
        store.init_indexes().await?;

        let gateway = HttpCollectGateway::new(config.gateway.clone());

        let port = config.server.port;
        let state = AppState::new(config, Arc::new(store), Arc::new(gateway));
        let router = build_router(state);

        Ok(Self { port, router })
    }

    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        tracing::info!("Listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.router).await?;

        Ok(())
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

#[cfg(test)]
mod router_tests {
    use super::*;
    use crate::services::gateway::mock::{MockGateway, Script};
    use crate::services::repository::memory::MemoryOrderStore;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use secrecy::Secret;
    use serde_json::Value;
    use service_core::middleware::auth::Claims;
    use tower::ServiceExt;

    const JWT_SECRET: &str = "test-jwt-secret";

    fn test_config() -> Config {
        Config {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            database: config::DatabaseConfig {
                url: Secret::new("mongodb://localhost:27017".to_string()),
                db_name: "school_payments_test".to_string(),
            },
            gateway: config::GatewayConfig {
                base_url: "http://localhost:9100".to_string(),
                api_key: Secret::new("test-api-key".to_string()),
                pg_key: Secret::new("test-pg-key".to_string()),
                school_id: "school_1".to_string(),
                callback_url: "http://localhost:3003/callback".to_string(),
                webhook_secret: Secret::new("test-webhook-secret".to_string()),
                require_webhook_signature: false,
                timeout_secs: 2,
            },
            auth: config::AuthConfig {
                jwt_secret: Secret::new(JWT_SECRET.to_string()),
            },
            service_name: "payments-service".to_string(),
        }
    }

    fn test_router() -> (Arc<MemoryOrderStore>, Router) {
        let store = Arc::new(MemoryOrderStore::new());
        let gateway = Arc::new(MockGateway::new(Script::Succeed));
        let state = AppState::new(test_config(), store.clone(), gateway);
        (store, build_router(state))
    }

    fn bearer_token() -> String {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        let claims = Claims {
            sub: "user_1".to_string(),
            exp: now + 3600,
            iat: now,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
        )
        .unwrap()
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn authed_post(uri: &str, body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {}", bearer_token()))
            .body(Body::from(body))
            .unwrap()
    }

    fn authed_get(uri: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", bearer_token()))
            .body(Body::empty())
            .unwrap()
    }

    fn create_payment_body() -> String {
        serde_json::json!({
            "school_id": "school_1",
            "trustee_id": "trustee_1",
            "student_info": {
                "name": "Asha",
                "id": "stu_1",
                "email": "asha@example.com"
            },
            "gateway_name": "edviron",
            "order_amount": 500.0
        })
        .to_string()
    }

    #[tokio::test]
    async fn create_payment_then_webhook_then_status() {
        let (_store, router) = test_router();

        // Create the payment intent.
        let (status, body) = send(
            router.clone(),
            authed_post("/payment/create", create_payment_body()),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["success"], true);
        let order_id = body["data"]["order_id"].as_str().unwrap().to_string();
        assert!(body["data"]["payment_url"].as_str().unwrap().contains(&order_id));

        // Seed status is pending with the placeholder amount.
        let (status, body) = send(
            router.clone(),
            authed_get(&format!("/transactions/status/{}", order_id)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "pending");
        assert_eq!(body["data"]["transaction_amount"], 500.0);

        // Provider reports the outcome out-of-band.
        let webhook = serde_json::json!({
            "order_info": {
                "order_id": order_id,
                "order_amount": 500.0,
                "transaction_amount": 480.0,
                "status": "success",
                "payment_mode": "upi"
            }
        })
        .to_string();
        let request = Request::builder()
            .method("POST")
            .uri("/webhook")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(webhook))
            .unwrap();
        let (status, body) = send(router.clone(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        // The status row now reflects the webhook.
        let (status, body) = send(
            router.clone(),
            authed_get(&format!("/transactions/status/{}", order_id)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "success");
        assert_eq!(body["data"]["transaction_amount"], 480.0);

        // And the listing joins it.
        let (status, body) = send(router, authed_get("/transactions")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["pages"], 1);
        assert_eq!(body["data"][0]["status"], "success");
        assert_eq!(body["data"][0]["custom_order_id"], order_id);
    }

    #[tokio::test]
    async fn create_payment_requires_auth() {
        let (_store, router) = test_router();

        let request = Request::builder()
            .method("POST")
            .uri("/payment/create")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(create_payment_body()))
            .unwrap();
        let (status, body) = send(router, request).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn invalid_body_is_rejected_with_400() {
        let (store, router) = test_router();

        let body = serde_json::json!({
            "school_id": "",
            "student_info": {"name": "Asha", "id": "stu_1", "email": "asha@example.com"},
            "gateway_name": "edviron",
            "order_amount": 500.0
        })
        .to_string();
        let (status, body) = send(router, authed_post("/payment/create", body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(store.orders.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn webhook_for_unknown_order_is_404() {
        let (_store, router) = test_router();

        let webhook = serde_json::json!({
            "order_info": {
                "order_id": "ORD0000000000000",
                "order_amount": 100.0,
                "transaction_amount": 100.0,
                "status": "success"
            }
        })
        .to_string();
        let request = Request::builder()
            .method("POST")
            .uri("/webhook")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(webhook))
            .unwrap();
        let (status, body) = send(router, request).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Order not found");
    }

    #[tokio::test]
    async fn empty_listing_has_zero_pages() {
        let (_store, router) = test_router();

        let (status, body) = send(router, authed_get("/transactions?page=1&limit=10")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 0);
        assert_eq!(body["pages"], 0);
        assert_eq!(body["count"], 0);
        assert!(body["data"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn school_listing_filters_by_school() {
        let (_store, router) = test_router();

        send(
            router.clone(),
            authed_post("/payment/create", create_payment_body()),
        )
        .await;

        let (status, body) = send(
            router.clone(),
            authed_get("/transactions/school/school_1"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);

        let (status, body) = send(router, authed_get("/transactions/school/other")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 0);
        assert!(body["data"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn health_and_fallback_routes() {
        let (_store, router) = test_router();

        let request = Request::builder()
            .method("GET")
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(router.clone(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = send(router, authed_get("/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "API endpoint not found");
    }

    #[tokio::test]
    async fn gateway_test_connection_reports_probe() {
        let (_store, router) = test_router();

        let (status, body) = send(router, authed_get("/payment/test-connection")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["connected"], true);
    }
}
