//! Transaction query handlers: read-only joins of Order and OrderStatus.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use service_core::error::AppError;
use service_core::middleware::auth::AuthUser;

use crate::dtos::{ApiResponse, ListQuery, PagedTransactions, TransactionStatusData};
use crate::services::repository::{PageParams, TransactionFilter};
use crate::AppState;

fn page_params(query: &ListQuery) -> PageParams {
    PageParams {
        skip: query.skip(),
        limit: query.limit(),
        sort_field: query.sort_field().to_string(),
        descending: query.descending(),
    }
}

/// List all transactions, optionally filtered by status.
pub async fn list_transactions(
    State(state): State<AppState>,
    AuthUser(_claims): AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<PagedTransactions>, AppError> {
    let filter = TransactionFilter {
        school_id: None,
        status: query.status.clone(),
    };

    let (transactions, total) = state
        .store
        .list_transactions(filter, page_params(&query))
        .await?;

    Ok(Json(PagedTransactions::new(
        transactions,
        total,
        query.page(),
        query.limit(),
    )))
}

/// List transactions for one school.
pub async fn list_transactions_by_school(
    State(state): State<AppState>,
    AuthUser(_claims): AuthUser,
    Path(school_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<PagedTransactions>, AppError> {
    tracing::info!(school_id = %school_id, "Fetching school transactions");

    let filter = TransactionFilter {
        school_id: Some(school_id),
        status: None,
    };

    let (transactions, total) = state
        .store
        .list_transactions(filter, page_params(&query))
        .await?;

    Ok(Json(PagedTransactions::new(
        transactions,
        total,
        query.page(),
        query.limit(),
    )))
}

/// Current status of a single order, by its external id.
pub async fn transaction_status(
    State(state): State<AppState>,
    AuthUser(_claims): AuthUser,
    Path(custom_order_id): Path<String>,
) -> Result<Json<ApiResponse<TransactionStatusData>>, AppError> {
    let order = state
        .store
        .find_order_by_custom_id(&custom_order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Order not found")))?;

    let status = state
        .store
        .find_status_by_collect_id(order.id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Transaction status not found")))?;

    Ok(Json(ApiResponse::ok(
        "Transaction status fetched",
        TransactionStatusData {
            custom_order_id: order.custom_order_id,
            status: status.status,
            order_amount: status.order_amount,
            transaction_amount: status.transaction_amount,
            payment_time: status.payment_time,
        },
    )))
}
