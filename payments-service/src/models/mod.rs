//! Persistent documents for the payment flow.
//!
//! `Order` and `OrderStatus` are deliberately separate, eventually-consistent
//! records: the order is the immutable payment intent, the status row is the
//! mutable lifecycle state the gateway reports back out-of-band. They join on
//! `OrderStatus.collect_id == Order._id`.

use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Student the payment is collected for, copied verbatim at order creation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StudentInfo {
    pub name: String,
    pub id: String,
    pub email: String,
}

/// Immutable payment intent. Created by the orchestrator, never mutated.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Order {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub school_id: String,
    pub trustee_id: String,
    pub student_info: StudentInfo,
    pub gateway_name: String,
    /// Externally shareable order id, unique across all orders.
    pub custom_order_id: String,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

/// Mutable lifecycle record for one order, keyed by `collect_id`.
///
/// `status` stores whatever the latest accepted webhook reported; lifecycle
/// decisions go through [`StatusKind`] instead of constraining the column.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OrderStatus {
    #[serde(rename = "_id")]
    pub id: Uuid,
    /// The owning order's id. Unique index: at most one status row per order.
    pub collect_id: Uuid,
    pub order_amount: f64,
    pub transaction_amount: f64,
    pub status: String,
    pub payment_mode: Option<String>,
    pub bank_reference: Option<String>,
    pub payment_message: Option<String>,
    pub error_message: Option<String>,
    pub payment_time: Option<DateTime>,
    /// Monotonic per-order sequence, incremented on every applied webhook.
    pub version: i64,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

pub const STATUS_PENDING: &str = "pending";

/// Lifecycle classification of a status value.
///
/// The provider defines its own terminal vocabulary (`success`, `failed`,
/// `user_dropped`, ...); anything that is not `pending` is terminal for
/// transition purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Pending,
    Terminal,
}

impl StatusKind {
    pub fn classify(status: &str) -> Self {
        if status.eq_ignore_ascii_case(STATUS_PENDING) {
            StatusKind::Pending
        } else {
            StatusKind::Terminal
        }
    }
}

/// What the reconciler should do with an incoming status value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Overwrite the row with the incoming fields.
    Apply,
    /// The write would regress a terminal state; reject and flag it.
    Stale,
}

/// Transition rule for the guarded upsert.
///
/// Identical statuses always apply (replaying a webhook is idempotent);
/// a terminal state never moves to a different value; everything else is
/// last-write-wins. Provider delivery order is assumed to be unguaranteed.
pub fn decide_transition(current: &str, incoming: &str) -> Transition {
    if current.eq_ignore_ascii_case(incoming) {
        return Transition::Apply;
    }
    match StatusKind::classify(current) {
        StatusKind::Terminal => Transition::Stale,
        StatusKind::Pending => Transition::Apply,
    }
}

/// Raw webhook payload, persisted append-only for diagnostics.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WebhookLog {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub payload: serde_json::Value,
    pub received_at: DateTime,
    pub processed: bool,
}

/// Joined Order + latest OrderStatus row returned by the query endpoints.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TransactionView {
    pub collect_id: Uuid,
    pub school_id: String,
    pub gateway: String,
    pub order_amount: f64,
    pub transaction_amount: f64,
    pub status: String,
    pub custom_order_id: String,
    pub payment_time: Option<DateTime>,
}
