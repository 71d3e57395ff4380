//! Order / OrderStatus persistence.
//!
//! The store is a capability trait so the orchestrator and the reconciler can
//! be exercised against an in-memory implementation; `MongoOrderStore` is the
//! production implementation. Uniqueness of `custom_order_id` and of one
//! status row per order is enforced by unique indexes, not by callers.

use anyhow::Result;
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, from_document, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{IndexOptions, ReplaceOptions};
use mongodb::{Collection, Database, IndexModel};
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{Order, OrderStatus, TransactionView, WebhookLog};

/// Filter for the joined transaction listings. The HTTP surface never
/// combines the two, mirroring the query endpoints.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub school_id: Option<String>,
    pub status: Option<String>,
}

/// Pagination/sort parameters, already normalized by the DTO layer.
#[derive(Debug, Clone)]
pub struct PageParams {
    pub skip: u64,
    pub limit: i64,
    pub sort_field: String,
    pub descending: bool,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert a new order. A `custom_order_id` collision maps to
    /// [`AppError::Conflict`].
    async fn insert_order(&self, order: &Order) -> Result<(), AppError>;

    async fn find_order_by_custom_id(
        &self,
        custom_order_id: &str,
    ) -> Result<Option<Order>, AppError>;

    /// Insert a status row. A `collect_id` collision maps to
    /// [`AppError::Conflict`].
    async fn insert_status(&self, status: &OrderStatus) -> Result<(), AppError>;

    async fn find_status_by_collect_id(
        &self,
        collect_id: Uuid,
    ) -> Result<Option<OrderStatus>, AppError>;

    /// Insert-or-replace the status row keyed by `collect_id`.
    async fn replace_status(&self, status: &OrderStatus) -> Result<(), AppError>;

    async fn insert_webhook_log(&self, log: &WebhookLog) -> Result<(), AppError>;

    async fn mark_webhook_processed(&self, id: Uuid) -> Result<(), AppError>;

    /// Joined Order + OrderStatus listing with the matching total count.
    async fn list_transactions(
        &self,
        filter: TransactionFilter,
        page: PageParams,
    ) -> Result<(Vec<TransactionView>, u64), AppError>;
}

#[derive(Clone)]
pub struct MongoOrderStore {
    orders: Collection<Order>,
    statuses: Collection<OrderStatus>,
    webhook_logs: Collection<WebhookLog>,
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(&*err.kind, ErrorKind::Write(WriteFailure::WriteError(we)) if we.code == 11000)
}

impl MongoOrderStore {
    pub fn new(db: &Database) -> Self {
        Self {
            orders: db.collection("orders"),
            statuses: db.collection("order_statuses"),
            webhook_logs: db.collection("webhook_logs"),
        }
    }

    /// Create the indexes the reconciliation core relies on.
    pub async fn init_indexes(&self) -> Result<()> {
        let custom_order_idx = IndexModel::builder()
            .keys(doc! { "custom_order_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("custom_order_id_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        let school_idx = IndexModel::builder()
            .keys(doc! { "school_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("school_order_idx".to_string())
                    .build(),
            )
            .build();

        self.orders
            .create_indexes([custom_order_idx, school_idx], None)
            .await?;

        // One current status row per order.
        let collect_idx = IndexModel::builder()
            .keys(doc! { "collect_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("collect_id_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        let status_idx = IndexModel::builder()
            .keys(doc! { "status": 1 })
            .options(
                IndexOptions::builder()
                    .name("status_idx".to_string())
                    .build(),
            )
            .build();

        self.statuses
            .create_indexes([collect_idx, status_idx], None)
            .await?;

        tracing::info!("Payment store indexes initialized");
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MongoOrderStore {
    async fn insert_order(&self, order: &Order) -> Result<(), AppError> {
        self.orders.insert_one(order, None).await.map_err(|e| {
            if is_duplicate_key(&e) {
                AppError::Conflict(anyhow::anyhow!(
                    "Order id {} already exists",
                    order.custom_order_id
                ))
            } else {
                AppError::from(e)
            }
        })?;
        Ok(())
    }

    async fn find_order_by_custom_id(
        &self,
        custom_order_id: &str,
    ) -> Result<Option<Order>, AppError> {
        let filter = doc! { "custom_order_id": custom_order_id };
        Ok(self.orders.find_one(filter, None).await?)
    }

    async fn insert_status(&self, status: &OrderStatus) -> Result<(), AppError> {
        self.statuses.insert_one(status, None).await.map_err(|e| {
            if is_duplicate_key(&e) {
                AppError::Conflict(anyhow::anyhow!(
                    "Status row for order {} already exists",
                    status.collect_id
                ))
            } else {
                AppError::from(e)
            }
        })?;
        Ok(())
    }

    async fn find_status_by_collect_id(
        &self,
        collect_id: Uuid,
    ) -> Result<Option<OrderStatus>, AppError> {
        let filter = doc! { "collect_id": collect_id.to_string() };
        Ok(self.statuses.find_one(filter, None).await?)
    }

    async fn replace_status(&self, status: &OrderStatus) -> Result<(), AppError> {
        let filter = doc! { "collect_id": status.collect_id.to_string() };
        let options = ReplaceOptions::builder().upsert(true).build();
        self.statuses.replace_one(filter, status, options).await?;
        Ok(())
    }

    async fn insert_webhook_log(&self, log: &WebhookLog) -> Result<(), AppError> {
        self.webhook_logs.insert_one(log, None).await?;
        Ok(())
    }

    async fn mark_webhook_processed(&self, id: Uuid) -> Result<(), AppError> {
        let filter = doc! { "_id": id.to_string() };
        let update = doc! { "$set": { "processed": true } };
        self.webhook_logs.update_one(filter, update, None).await?;
        Ok(())
    }

    async fn list_transactions(
        &self,
        filter: TransactionFilter,
        page: PageParams,
    ) -> Result<(Vec<TransactionView>, u64), AppError> {
        let mut pipeline: Vec<Document> = Vec::new();

        if let Some(school_id) = &filter.school_id {
            pipeline.push(doc! { "$match": { "school_id": school_id } });
        }

        pipeline.push(doc! {
            "$lookup": {
                "from": "order_statuses",
                "localField": "_id",
                "foreignField": "collect_id",
                "as": "status_info"
            }
        });
        pipeline.push(doc! { "$unwind": "$status_info" });

        if let Some(status) = &filter.status {
            pipeline.push(doc! { "$match": { "status_info.status": status } });
        }

        pipeline.push(doc! {
            "$project": {
                "_id": 0,
                "collect_id": "$_id",
                "school_id": 1,
                "gateway": "$gateway_name",
                "order_amount": "$status_info.order_amount",
                "transaction_amount": "$status_info.transaction_amount",
                "status": "$status_info.status",
                "custom_order_id": 1,
                "payment_time": "$status_info.payment_time",
                "created_at": 1
            }
        });

        let direction = if page.descending { -1 } else { 1 };
        pipeline.push(doc! { "$sort": { page.sort_field.as_str(): direction } });
        pipeline.push(doc! { "$skip": page.skip as i64 });
        pipeline.push(doc! { "$limit": page.limit });

        let cursor = self.orders.aggregate(pipeline, None).await?;
        let documents: Vec<Document> = cursor.try_collect().await?;

        let mut transactions = Vec::with_capacity(documents.len());
        for document in documents {
            let view: TransactionView = from_document(document)
                .map_err(|e| AppError::DatabaseError(anyhow::Error::new(e)))?;
            transactions.push(view);
        }

        // Totals mirror the listing scope: school listings count orders,
        // status-filtered listings count status rows.
        let total = if let Some(school_id) = &filter.school_id {
            self.orders
                .count_documents(doc! { "school_id": school_id }, None)
                .await?
        } else if let Some(status) = &filter.status {
            self.statuses
                .count_documents(doc! { "status": status }, None)
                .await?
        } else {
            self.orders.count_documents(None, None).await?
        };

        Ok((transactions, total))
    }
}

/// In-memory store used by the core-flow tests.
#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryOrderStore {
        pub orders: Mutex<Vec<Order>>,
        pub statuses: Mutex<Vec<OrderStatus>>,
        pub webhook_logs: Mutex<Vec<WebhookLog>>,
        /// When set, webhook-log inserts fail, to exercise best-effort logging.
        pub fail_webhook_logs: AtomicBool,
    }

    impl MemoryOrderStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl OrderStore for MemoryOrderStore {
        async fn insert_order(&self, order: &Order) -> Result<(), AppError> {
            let mut orders = self.orders.lock().unwrap();
            if orders
                .iter()
                .any(|o| o.custom_order_id == order.custom_order_id)
            {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Order id {} already exists",
                    order.custom_order_id
                )));
            }
            orders.push(order.clone());
            Ok(())
        }

        async fn find_order_by_custom_id(
            &self,
            custom_order_id: &str,
        ) -> Result<Option<Order>, AppError> {
            Ok(self
                .orders
                .lock()
                .unwrap()
                .iter()
                .find(|o| o.custom_order_id == custom_order_id)
                .cloned())
        }

        async fn insert_status(&self, status: &OrderStatus) -> Result<(), AppError> {
            let mut statuses = self.statuses.lock().unwrap();
            if statuses.iter().any(|s| s.collect_id == status.collect_id) {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Status row for order {} already exists",
                    status.collect_id
                )));
            }
            statuses.push(status.clone());
            Ok(())
        }

        async fn find_status_by_collect_id(
            &self,
            collect_id: Uuid,
        ) -> Result<Option<OrderStatus>, AppError> {
            Ok(self
                .statuses
                .lock()
                .unwrap()
                .iter()
                .find(|s| s.collect_id == collect_id)
                .cloned())
        }

        async fn replace_status(&self, status: &OrderStatus) -> Result<(), AppError> {
            let mut statuses = self.statuses.lock().unwrap();
            if let Some(existing) = statuses.iter_mut().find(|s| s.collect_id == status.collect_id)
            {
                *existing = status.clone();
            } else {
                statuses.push(status.clone());
            }
            Ok(())
        }

        async fn insert_webhook_log(&self, log: &WebhookLog) -> Result<(), AppError> {
            if self.fail_webhook_logs.load(Ordering::Relaxed) {
                return Err(AppError::DatabaseError(anyhow::anyhow!(
                    "webhook log insert failed"
                )));
            }
            self.webhook_logs.lock().unwrap().push(log.clone());
            Ok(())
        }

        async fn mark_webhook_processed(&self, id: Uuid) -> Result<(), AppError> {
            if let Some(log) = self
                .webhook_logs
                .lock()
                .unwrap()
                .iter_mut()
                .find(|l| l.id == id)
            {
                log.processed = true;
            }
            Ok(())
        }

        async fn list_transactions(
            &self,
            filter: TransactionFilter,
            page: PageParams,
        ) -> Result<(Vec<TransactionView>, u64), AppError> {
            let orders = self.orders.lock().unwrap();
            let statuses = self.statuses.lock().unwrap();

            let mut joined: Vec<(Order, OrderStatus)> = orders
                .iter()
                .filter_map(|order| {
                    statuses
                        .iter()
                        .find(|s| s.collect_id == order.id)
                        .map(|status| (order.clone(), status.clone()))
                })
                .filter(|(order, status)| {
                    filter
                        .school_id
                        .as_ref()
                        .map_or(true, |sid| &order.school_id == sid)
                        && filter.status.as_ref().map_or(true, |st| &status.status == st)
                })
                .collect();

            joined.sort_by_key(|(order, _)| order.created_at);
            if page.descending {
                joined.reverse();
            }

            let total = if let Some(school_id) = &filter.school_id {
                orders.iter().filter(|o| &o.school_id == school_id).count() as u64
            } else if let Some(status) = &filter.status {
                statuses.iter().filter(|s| &s.status == status).count() as u64
            } else {
                orders.len() as u64
            };

            let views = joined
                .into_iter()
                .skip(page.skip as usize)
                .take(page.limit.max(0) as usize)
                .map(|(order, status)| TransactionView {
                    collect_id: order.id,
                    school_id: order.school_id,
                    gateway: order.gateway_name,
                    order_amount: status.order_amount,
                    transaction_amount: status.transaction_amount,
                    status: status.status,
                    custom_order_id: order.custom_order_id,
                    payment_time: status.payment_time,
                })
                .collect();

            Ok((views, total))
        }
    }
}
