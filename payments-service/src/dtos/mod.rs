//! Request/response types for the HTTP surface.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::TransactionView;

/// Body of `POST /payment/create`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePaymentRequest {
    #[validate(length(min = 1, message = "School ID is required"))]
    pub school_id: String,
    #[serde(default)]
    pub trustee_id: String,
    #[validate(nested)]
    pub student_info: StudentInfoDto,
    #[validate(length(min = 1, message = "Gateway name is required"))]
    pub gateway_name: String,
    #[validate(range(exclusive_min = 0.0, message = "Order amount must be greater than 0"))]
    pub order_amount: f64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct StudentInfoDto {
    #[validate(length(min = 1, message = "Student name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "Student ID is required"))]
    pub id: String,
    #[validate(email(message = "Please provide a valid student email"))]
    pub email: String,
}

/// Successful create-payment payload; the caller redirects to `payment_url`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentCreated {
    pub payment_url: String,
    /// The externally shareable `custom_order_id`.
    pub order_id: String,
    /// Provider-side transaction id.
    pub transaction_id: String,
}

/// Standard success envelope: `{success, message, data}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }
}

/// Query parameters for the transaction listings.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub status: Option<String>,
}

impl ListQuery {
    pub fn page(&self) -> i64 {
        self.page.filter(|p| *p >= 1).unwrap_or(1)
    }

    pub fn limit(&self) -> i64 {
        self.limit.filter(|l| *l >= 1).unwrap_or(10)
    }

    pub fn skip(&self) -> u64 {
        ((self.page() - 1) * self.limit()) as u64
    }

    pub fn sort_field(&self) -> &str {
        self.sort.as_deref().unwrap_or("created_at")
    }

    pub fn descending(&self) -> bool {
        matches!(self.order.as_deref(), Some("desc"))
    }
}

/// `pages = ceil(total / limit)`; an empty collection has zero pages.
pub fn total_pages(total: u64, limit: i64) -> u64 {
    if limit <= 0 {
        return 0;
    }
    total.div_ceil(limit as u64)
}

/// Paged listing envelope.
#[derive(Debug, Serialize)]
pub struct PagedTransactions {
    pub success: bool,
    pub count: usize,
    pub total: u64,
    pub page: i64,
    pub pages: u64,
    pub data: Vec<TransactionView>,
}

impl PagedTransactions {
    pub fn new(data: Vec<TransactionView>, total: u64, page: i64, limit: i64) -> Self {
        Self {
            success: true,
            count: data.len(),
            total,
            page,
            pages: total_pages(total, limit),
            data,
        }
    }
}

/// Payload of `GET /transactions/status/:custom_order_id`.
#[derive(Debug, Serialize)]
pub struct TransactionStatusData {
    pub custom_order_id: String,
    pub status: String,
    pub order_amount: f64,
    pub transaction_amount: f64,
    pub payment_time: Option<mongodb::bson::DateTime>,
}
