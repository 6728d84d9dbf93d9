use crate::{
    db::DbPool,
    entities::client_inventory::{self, Entity as ClientInventoryEntity},
    entities::order::{self, Entity as OrderEntity},
    entities::order_item::{self, Entity as OrderItemEntity},
    entities::product::{self, Entity as ProductEntity},
    entities::purchase_request::{self, Entity as PurchaseRequestEntity, RequestStatus},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, DbErr, EntityTrait, QueryFilter, Set,
    SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Request/Response types for the transfer engine
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct SubmitRequestCommand {
    pub product_id: Uuid,
    pub client_id: Uuid,
    pub organization_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub quantity: i32,
    pub unit_price: Decimal,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PurchaseRequestResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub client_id: Uuid,
    pub organization_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub status: RequestStatus,
    pub rejection_reason: Option<String>,
    pub order_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<purchase_request::Model> for PurchaseRequestResponse {
    fn from(model: purchase_request::Model) -> Self {
        let status = model.request_status();
        Self {
            id: model.id,
            product_id: model.product_id,
            client_id: model.client_id,
            organization_id: model.organization_id,
            quantity: model.quantity,
            unit_price: model.unit_price,
            status,
            rejection_reason: model.rejection_reason,
            order_id: model.order_id,
            notes: model.notes,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Result of an approved transfer: all entities mutated by the transaction.
#[derive(Debug, Serialize)]
pub struct ApprovalOutcome {
    pub request: PurchaseRequestResponse,
    pub order: order::Model,
    pub manufacturer_product: product::Model,
    pub client_product: client_inventory::Model,
}

/// Transfer engine: executes the approve/reject state transition of a
/// purchase request and the associated ledger mutations as a single
/// atomic unit, exactly once.
#[derive(Clone)]
pub struct TransferEngine {
    db_pool: Arc<DbPool>,
    event_sender: Option<EventSender>,
}

impl TransferEngine {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Creates a new purchase request in state `pending`.
    ///
    /// No stock is reserved at submission; sufficiency is checked at
    /// approval time only (conditional decrement in `approve`).
    #[instrument(skip(self, command), fields(client_id = %command.client_id, product_id = %command.product_id))]
    pub async fn submit(
        &self,
        command: SubmitRequestCommand,
    ) -> Result<PurchaseRequestResponse, ServiceError> {
        command
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        if command.unit_price <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Unit price must be positive".to_string(),
            ));
        }

        let db = &*self.db_pool;

        let prod = ProductEntity::find_by_id(command.product_id)
            .one(db)
            .await
            .map_err(map_db_err)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", command.product_id))
            })?;

        if prod.organization_id != command.organization_id {
            return Err(ServiceError::Forbidden(format!(
                "Product {} is outside the requesting organization scope",
                prod.id
            )));
        }
        if let Some(min) = prod.min_order_quantity {
            if command.quantity < min {
                return Err(ServiceError::ValidationError(format!(
                    "Quantity {} below minimum order quantity {}",
                    command.quantity, min
                )));
            }
        }
        if let Some(max) = prod.max_order_quantity {
            if command.quantity > max {
                return Err(ServiceError::ValidationError(format!(
                    "Quantity {} above maximum order quantity {}",
                    command.quantity, max
                )));
            }
        }

        let request_id = Uuid::new_v4();
        let now = Utc::now();

        let request = purchase_request::ActiveModel {
            id: Set(request_id),
            product_id: Set(command.product_id),
            client_id: Set(command.client_id),
            organization_id: Set(command.organization_id),
            quantity: Set(command.quantity),
            unit_price: Set(command.unit_price),
            status: Set(RequestStatus::Pending.to_string()),
            rejection_reason: Set(None),
            order_id: Set(None),
            notes: Set(command.notes),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };

        let model = request.insert(db).await.map_err(map_db_err)?;

        info!(request_id = %request_id, quantity = command.quantity, "Purchase request submitted");

        self.emit(Event::PurchaseRequestSubmitted {
            request_id,
            client_id: command.client_id,
            product_id: command.product_id,
            quantity: command.quantity,
        })
        .await;

        Ok(model.into())
    }

    /// Approves a pending request: decrements the manufacturer ledger,
    /// credits the client ledger, creates the order, and marks the request
    /// approved, all within one transaction.
    #[instrument(skip(self), fields(request_id = %request_id, actor_id = %actor_id))]
    pub async fn approve(
        &self,
        request_id: Uuid,
        actor_id: Uuid,
    ) -> Result<ApprovalOutcome, ServiceError> {
        let db = &*self.db_pool;

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start approval transaction");
            map_db_err(e)
        })?;

        // Re-read inside the transaction to guard against races.
        let request = PurchaseRequestEntity::find_by_id(request_id)
            .one(&txn)
            .await
            .map_err(map_db_err)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Purchase request {} not found", request_id))
            })?;

        if request.request_status().is_terminal() {
            return Err(ServiceError::InvalidState(format!(
                "Purchase request {} is already {}",
                request_id, request.status
            )));
        }

        let prod = ProductEntity::find_by_id(request.product_id)
            .one(&txn)
            .await
            .map_err(map_db_err)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", request.product_id))
            })?;

        if prod.stock < request.quantity {
            return Err(ServiceError::InsufficientStock(format!(
                "Product {}: requested {}, available {}",
                prod.id, request.quantity, prod.stock
            )));
        }

        // Conditional decrement: the storage-level guard against lost
        // updates when two approvals race on the same product.
        let decrement = ProductEntity::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).sub(request.quantity),
            )
            .col_expr(
                product::Column::UpdatedAt,
                Expr::value(Utc::now()),
            )
            .filter(product::Column::Id.eq(prod.id))
            .filter(product::Column::Stock.gte(request.quantity))
            .exec(&txn)
            .await
            .map_err(map_db_err)?;

        if decrement.rows_affected == 0 {
            return Err(ServiceError::InsufficientStock(format!(
                "Product {}: stock changed concurrently, cannot cover {}",
                prod.id, request.quantity
            )));
        }

        let client_row = self
            .credit_client_ledger(&txn, &prod, request.client_id, request.quantity)
            .await?;

        let (order, _item) = self
            .create_order(&txn, &request, &prod, actor_id)
            .await?;

        // Compare-and-swap on the pre-transition state: exactly one caller
        // may move the request out of `pending`.
        let transition = PurchaseRequestEntity::update_many()
            .col_expr(
                purchase_request::Column::Status,
                Expr::value(RequestStatus::Approved.to_string()),
            )
            .col_expr(purchase_request::Column::OrderId, Expr::value(order.id))
            .col_expr(
                purchase_request::Column::UpdatedAt,
                Expr::value(Utc::now()),
            )
            .filter(purchase_request::Column::Id.eq(request_id))
            .filter(purchase_request::Column::Status.eq(RequestStatus::Pending.to_string()))
            .exec(&txn)
            .await
            .map_err(map_db_err)?;

        if transition.rows_affected == 0 {
            return Err(ServiceError::InvalidState(format!(
                "Purchase request {} was finalized concurrently",
                request_id
            )));
        }

        // Re-read the mutated rows so the outcome reflects committed state.
        let updated_request = PurchaseRequestEntity::find_by_id(request_id)
            .one(&txn)
            .await
            .map_err(map_db_err)?
            .ok_or_else(|| ServiceError::InternalError("Request vanished mid-transaction".into()))?;
        let updated_product = ProductEntity::find_by_id(prod.id)
            .one(&txn)
            .await
            .map_err(map_db_err)?
            .ok_or_else(|| ServiceError::InternalError("Product vanished mid-transaction".into()))?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, request_id = %request_id, "Failed to commit approval transaction");
            map_db_err(e)
        })?;

        info!(
            request_id = %request_id,
            order_id = %order.id,
            manufacturer_stock = updated_product.stock,
            client_stock = client_row.current_stock,
            "Purchase request approved"
        );

        self.emit(Event::PurchaseRequestApproved {
            request_id,
            client_id: updated_request.client_id,
            product_name: updated_product.name.clone(),
            quantity: updated_request.quantity,
            order_id: order.id,
        })
        .await;
        self.emit(Event::InventoryTransferred {
            source_product_id: updated_product.id,
            client_id: updated_request.client_id,
            quantity: updated_request.quantity,
            manufacturer_stock_after: updated_product.stock,
            client_stock_after: client_row.current_stock,
        })
        .await;
        self.emit(Event::OrderCreated(order.id)).await;
        if client_row.is_low_stock() {
            self.emit(Event::ClientInventoryLowStock {
                client_id: client_row.client_id,
                source_product_id: client_row.source_product_id,
                current_stock: client_row.current_stock,
                reorder_level: client_row.reorder_level,
            })
            .await;
        }

        Ok(ApprovalOutcome {
            request: updated_request.into(),
            order,
            manufacturer_product: updated_product,
            client_product: client_row,
        })
    }

    /// Rejects a pending request. No ledger mutation.
    #[instrument(skip(self, reason), fields(request_id = %request_id, actor_id = %actor_id))]
    pub async fn reject(
        &self,
        request_id: Uuid,
        actor_id: Uuid,
        reason: String,
    ) -> Result<PurchaseRequestResponse, ServiceError> {
        if reason.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Rejection reason must not be empty".to_string(),
            ));
        }

        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(map_db_err)?;

        let request = PurchaseRequestEntity::find_by_id(request_id)
            .one(&txn)
            .await
            .map_err(map_db_err)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Purchase request {} not found", request_id))
            })?;

        if request.request_status().is_terminal() {
            return Err(ServiceError::InvalidState(format!(
                "Purchase request {} is already {}",
                request_id, request.status
            )));
        }

        let transition = PurchaseRequestEntity::update_many()
            .col_expr(
                purchase_request::Column::Status,
                Expr::value(RequestStatus::Rejected.to_string()),
            )
            .col_expr(
                purchase_request::Column::RejectionReason,
                Expr::value(reason.clone()),
            )
            .col_expr(
                purchase_request::Column::UpdatedAt,
                Expr::value(Utc::now()),
            )
            .filter(purchase_request::Column::Id.eq(request_id))
            .filter(purchase_request::Column::Status.eq(RequestStatus::Pending.to_string()))
            .exec(&txn)
            .await
            .map_err(map_db_err)?;

        if transition.rows_affected == 0 {
            return Err(ServiceError::InvalidState(format!(
                "Purchase request {} was finalized concurrently",
                request_id
            )));
        }

        let updated = PurchaseRequestEntity::find_by_id(request_id)
            .one(&txn)
            .await
            .map_err(map_db_err)?
            .ok_or_else(|| ServiceError::InternalError("Request vanished mid-transaction".into()))?;

        // Product name is only needed for the notification payload.
        let product_name = ProductEntity::find_by_id(request.product_id)
            .one(&txn)
            .await
            .map_err(map_db_err)?
            .map(|p| p.name)
            .unwrap_or_default();

        txn.commit().await.map_err(map_db_err)?;

        info!(request_id = %request_id, reason = %reason, "Purchase request rejected");

        self.emit(Event::PurchaseRequestRejected {
            request_id,
            client_id: updated.client_id,
            product_name,
            quantity: updated.quantity,
            reason,
        })
        .await;

        Ok(updated.into())
    }

    /// Retrieves a purchase request by ID.
    #[instrument(skip(self), fields(request_id = %request_id))]
    pub async fn get_request(
        &self,
        request_id: Uuid,
    ) -> Result<Option<PurchaseRequestResponse>, ServiceError> {
        let db = &*self.db_pool;
        let request = PurchaseRequestEntity::find_by_id(request_id)
            .one(db)
            .await
            .map_err(map_db_err)?;
        Ok(request.map(Into::into))
    }

    /// Credits the client ledger inside the approval transaction,
    /// creating the ledger row on first approval for this (client, product).
    async fn credit_client_ledger(
        &self,
        txn: &DatabaseTransaction,
        prod: &product::Model,
        client_id: Uuid,
        quantity: i32,
    ) -> Result<client_inventory::Model, ServiceError> {
        let existing = ClientInventoryEntity::find()
            .filter(client_inventory::Column::ClientId.eq(client_id))
            .filter(client_inventory::Column::SourceProductId.eq(prod.id))
            .one(txn)
            .await
            .map_err(map_db_err)?;

        match existing {
            Some(row) => {
                let row_id = row.id;
                ClientInventoryEntity::update_many()
                    .col_expr(
                        client_inventory::Column::CurrentStock,
                        Expr::col(client_inventory::Column::CurrentStock).add(quantity),
                    )
                    .col_expr(
                        client_inventory::Column::LastUpdated,
                        Expr::value(Utc::now()),
                    )
                    .filter(client_inventory::Column::Id.eq(row_id))
                    .exec(txn)
                    .await
                    .map_err(map_db_err)?;

                ClientInventoryEntity::find_by_id(row_id)
                    .one(txn)
                    .await
                    .map_err(map_db_err)?
                    .ok_or_else(|| {
                        ServiceError::InternalError("Client ledger vanished mid-transaction".into())
                    })
            }
            None => {
                let now = Utc::now();
                let new_row = client_inventory::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    source_product_id: Set(prod.id),
                    client_id: Set(client_id),
                    sku: Set(client_scoped_sku(&prod.sku)),
                    name: Set(prod.name.clone()),
                    price: Set(prod.price),
                    category: Set(prod.category.clone()),
                    loyalty_points: Set(prod.loyalty_points),
                    current_stock: Set(quantity),
                    initial_stock: Set(quantity),
                    reorder_level: Set(0),
                    created_at: Set(now),
                    last_updated: Set(Some(now)),
                };
                new_row.insert(txn).await.map_err(map_db_err)
            }
        }
    }

    /// Creates the order and its single line item inside the approval
    /// transaction.
    async fn create_order(
        &self,
        txn: &DatabaseTransaction,
        request: &purchase_request::Model,
        prod: &product::Model,
        actor_id: Uuid,
    ) -> Result<(order::Model, order_item::Model), ServiceError> {
        let order_id = Uuid::new_v4();
        let line_total = request.unit_price * Decimal::from(request.quantity);
        let now = Utc::now();

        let order = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(generate_order_number()),
            client_id: Set(request.client_id),
            seller_id: Set(actor_id),
            status: Set("completed".to_string()),
            total_amount: Set(line_total),
            currency: Set(prod.currency.clone()),
            created_at: Set(now),
        }
        .insert(txn)
        .await
        .map_err(map_db_err)?;

        let item = order_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            product_id: Set(prod.id),
            sku: Set(prod.sku.clone()),
            name: Set(prod.name.clone()),
            quantity: Set(request.quantity),
            unit_price: Set(request.unit_price),
            line_total: Set(line_total),
            created_at: Set(now),
        }
        .insert(txn)
        .await
        .map_err(map_db_err)?;

        Ok((order, item))
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "Failed to send event");
            }
        }
    }
}

/// An order together with its line items.
#[derive(Debug, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

/// Order lookups over the engine's terminal artifacts.
impl TransferEngine {
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<Option<OrderDetail>, ServiceError> {
        let db = &*self.db_pool;
        let order = OrderEntity::find_by_id(order_id)
            .one(db)
            .await
            .map_err(map_db_err)?;
        match order {
            Some(order) => Ok(Some(self.with_items(order).await?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    pub async fn get_order_by_number(
        &self,
        order_number: &str,
    ) -> Result<Option<OrderDetail>, ServiceError> {
        let db = &*self.db_pool;
        let order = OrderEntity::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(db)
            .await
            .map_err(map_db_err)?;
        match order {
            Some(order) => Ok(Some(self.with_items(order).await?)),
            None => Ok(None),
        }
    }

    async fn with_items(&self, order: order::Model) -> Result<OrderDetail, ServiceError> {
        let db = &*self.db_pool;
        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .all(db)
            .await
            .map_err(map_db_err)?;
        Ok(OrderDetail { order, items })
    }
}

/// Classifies storage errors: contention-shaped failures become
/// `TransactionConflict` so callers know a retry is safe. Unique-index
/// violations count as contention: two first-time approvals racing on the
/// same (client, product) ledger row both insert, the loser aborts here,
/// and a retry finds the winner's row and increments it instead.
fn map_db_err(e: DbErr) -> ServiceError {
    if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
        return ServiceError::TransactionConflict(e.to_string());
    }

    let msg = e.to_string();
    let lowered = msg.to_lowercase();
    if lowered.contains("deadlock")
        || lowered.contains("serialization")
        || lowered.contains("could not serialize")
        || lowered.contains("database is locked")
        || lowered.contains("lock timeout")
        || lowered.contains("unique constraint")
        || lowered.contains("duplicate key")
    {
        ServiceError::TransactionConflict(msg)
    } else {
        ServiceError::DatabaseError(e)
    }
}

fn generate_order_number() -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!(
        "TRF-{}-{}",
        Utc::now().format("%Y%m%d"),
        uuid[..8].to_uppercase()
    )
}

fn client_scoped_sku(source_sku: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(4)
        .map(char::from)
        .collect::<String>()
        .to_uppercase();
    format!("{}-C{}", source_sku, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    #[test]
    fn order_numbers_carry_date_and_unique_suffix() {
        let a = generate_order_number();
        let b = generate_order_number();
        assert!(a.starts_with("TRF-"));
        assert_eq!(a.len(), "TRF-".len() + 8 + 1 + 8);
        assert_ne!(a, b);
    }

    #[test]
    fn client_sku_is_derived_from_source_sku() {
        let sku = client_scoped_sku("WID-001");
        assert!(sku.starts_with("WID-001-C"));
        assert_eq!(sku.len(), "WID-001-C".len() + 4);
    }

    #[test]
    fn contention_errors_map_to_transaction_conflict() {
        let err = map_db_err(DbErr::Custom("database is locked".to_string()));
        assert_matches!(err, ServiceError::TransactionConflict(_));

        let err = map_db_err(DbErr::Custom(
            "could not serialize access due to concurrent update".to_string(),
        ));
        assert_matches!(err, ServiceError::TransactionConflict(_));

        let err = map_db_err(DbErr::Custom("syntax error".to_string()));
        assert_matches!(err, ServiceError::DatabaseError(_));
    }

    #[test]
    fn unique_violations_map_to_transaction_conflict() {
        // Racing first-time ledger inserts surface as unique-index
        // violations; a retry increments the winner's row, so the error
        // must be retryable rather than a plain database failure.
        let err = map_db_err(DbErr::Custom(
            "UNIQUE constraint failed: client_inventory.client_id, client_inventory.source_product_id"
                .to_string(),
        ));
        assert_matches!(err, ServiceError::TransactionConflict(_));
        assert!(err.is_retryable());

        let err = map_db_err(DbErr::Custom(
            "duplicate key value violates unique constraint \"idx_client_inventory_client_source\""
                .to_string(),
        ));
        assert_matches!(err, ServiceError::TransactionConflict(_));
    }

    #[test]
    fn submit_command_rejects_non_positive_quantity() {
        let command = SubmitRequestCommand {
            product_id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            quantity: 0,
            unit_price: dec!(50),
            notes: None,
        };
        assert!(command.validate().is_err());
    }

    #[test]
    fn response_conversion_carries_terminal_fields() {
        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let model = purchase_request::Model {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            quantity: 4,
            unit_price: dec!(50),
            status: "approved".to_string(),
            rejection_reason: None,
            order_id: Some(order_id),
            notes: None,
            created_at: now,
            updated_at: Some(now),
        };

        let response: PurchaseRequestResponse = model.into();
        assert_eq!(response.status, RequestStatus::Approved);
        assert_eq!(response.order_id, Some(order_id));
        assert_eq!(response.unit_price * Decimal::from(response.quantity), dec!(200));
    }
}
