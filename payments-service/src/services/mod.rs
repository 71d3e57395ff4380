pub mod gateway;
pub mod order_id;
pub mod orchestrator;
pub mod reconciler;
pub mod repository;

pub use gateway::{CollectGateway, HttpCollectGateway};
pub use orchestrator::PaymentOrchestrator;
pub use reconciler::WebhookReconciler;
pub use repository::{MongoOrderStore, OrderStore};
