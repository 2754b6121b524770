use crate::{
    db::DbPool,
    entities::{
        stock_movement::{self, MovementType},
        stock_record::{self, Entity as StockRecord},
    },
    errors::{from_transaction_error, ServiceError},
    events::{Event, EventSender},
    services::stock_validation::{self, AvailabilityError, LowStockWarning},
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, DbBackend,
    EntityTrait, QueryFilter, QuerySelect, Set, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Bound on whole-transaction retries under optimistic locking.
const OPTIMISTIC_RETRY_ATTEMPTS: u32 = 3;

/// How concurrent writers on one (product, location) key are serialized.
///
/// `RowExclusive` takes a `SELECT ... FOR UPDATE` row lock (on backends that
/// support it); `OptimisticRetry` re-checks the quantity as a version token
/// in a conditional UPDATE and retries the whole transaction on conflict.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, strum::EnumString, strum::Display, Serialize,
)]
pub enum LockStrategy {
    #[default]
    #[strum(serialize = "row-lock")]
    RowExclusive,
    #[strum(serialize = "optimistic")]
    OptimisticRetry,
}

/// One requested change to a stock record's quantity
#[derive(Debug, Clone)]
pub struct MovementRequest {
    pub product_id: Uuid,
    pub location_id: Uuid,
    pub movement_type: MovementType,
    /// Signed delta: negative consumes stock, positive replenishes it
    pub quantity_change: i32,
    /// Originating sale or return, when the movement came from one
    pub reference_id: Option<Uuid>,
    pub actor_user_id: Uuid,
    /// Mandatory for adjustments
    pub reason: Option<String>,
}

/// Result of a successfully applied movement
#[derive(Debug, Clone, Serialize)]
pub struct MovementOutcome {
    pub movement_id: Uuid,
    pub quantity_before: i32,
    pub quantity_after: i32,
    pub low_stock: Option<LowStockWarning>,
}

/// The single writer of stock records and the movement ledger.
///
/// Every flow that changes a quantity (sale, return, manual adjustment,
/// import line) goes through [`apply_movement`](Self::apply_movement) or its
/// in-transaction variant, which update the projection and append the ledger
/// row in the same unit of work. Nothing else in the crate mutates either
/// table.
#[derive(Clone)]
pub struct StockMovementService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    lock_strategy: LockStrategy,
}

impl StockMovementService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        lock_strategy: LockStrategy,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            lock_strategy,
        }
    }

    /// Applies one movement inside its own transaction.
    ///
    /// Under `OptimisticRetry` a conflicting concurrent writer causes the
    /// whole transaction to be retried (bounded); business-rule failures are
    /// returned as-is and never retried.
    #[instrument(skip(self), fields(movement_type = request.movement_type.as_str()))]
    pub async fn apply_movement(
        &self,
        request: MovementRequest,
    ) -> Result<MovementOutcome, ServiceError> {
        let mut attempt = 0;
        let outcome = loop {
            attempt += 1;
            let txn_request = request.clone();
            let strategy = self.lock_strategy;

            let result = self
                .db_pool
                .transaction::<_, MovementOutcome, ServiceError>(move |txn| {
                    Box::pin(async move { apply_in_txn(txn, &txn_request, strategy).await })
                })
                .await
                .map_err(from_transaction_error);

            match result {
                Err(ServiceError::ConcurrentModification { .. })
                    if self.lock_strategy == LockStrategy::OptimisticRetry
                        && attempt < OPTIMISTIC_RETRY_ATTEMPTS =>
                {
                    warn!(
                        attempt,
                        product_id = %request.product_id,
                        location_id = %request.location_id,
                        "Concurrent stock modification, retrying transaction"
                    );
                    continue;
                }
                other => break other?,
            }
        };

        info!(
            product_id = %request.product_id,
            location_id = %request.location_id,
            movement_type = request.movement_type.as_str(),
            quantity_change = request.quantity_change,
            quantity_after = outcome.quantity_after,
            "Recorded stock movement"
        );

        self.publish_events(&request, &outcome).await;

        Ok(outcome)
    }

    /// Applies one movement against a caller-owned transaction, so a sale
    /// and its stock consumption commit or roll back together.
    ///
    /// Performs a single attempt: under optimistic locking a conflict
    /// surfaces as `ConcurrentModification` and the owning workflow decides
    /// its own retry policy. Event publication is also the committing
    /// caller's responsibility.
    pub async fn apply_movement_in_txn(
        &self,
        txn: &DatabaseTransaction,
        request: &MovementRequest,
    ) -> Result<MovementOutcome, ServiceError> {
        apply_in_txn(txn, request, self.lock_strategy).await
    }

    /// Records a sale: consumes `quantity` units, referencing the sale.
    #[instrument(skip(self))]
    pub async fn create_sale_movement(
        &self,
        product_id: Uuid,
        location_id: Uuid,
        sale_id: Uuid,
        quantity: i32,
        actor_user_id: Uuid,
    ) -> Result<MovementOutcome, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::InvalidQuantity(quantity));
        }
        self.apply_movement(MovementRequest {
            product_id,
            location_id,
            movement_type: MovementType::Sale,
            quantity_change: -quantity,
            reference_id: Some(sale_id),
            actor_user_id,
            reason: None,
        })
        .await
    }

    /// Records a customer return: restocks `quantity` units, referencing the
    /// return. The pairing must already be assigned; returns do not create
    /// assignments.
    #[instrument(skip(self))]
    pub async fn create_return_movement(
        &self,
        product_id: Uuid,
        location_id: Uuid,
        return_id: Uuid,
        quantity: i32,
        actor_user_id: Uuid,
    ) -> Result<MovementOutcome, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::InvalidQuantity(quantity));
        }
        self.apply_movement(MovementRequest {
            product_id,
            location_id,
            movement_type: MovementType::Return,
            quantity_change: quantity,
            reference_id: Some(return_id),
            actor_user_id,
            reason: None,
        })
        .await
    }

    /// Records a manual adjustment with a mandatory reason.
    #[instrument(skip(self, reason))]
    pub async fn adjust_stock(
        &self,
        product_id: Uuid,
        location_id: Uuid,
        quantity_change: i32,
        reason: &str,
        actor_user_id: Uuid,
    ) -> Result<MovementOutcome, ServiceError> {
        self.apply_movement(MovementRequest {
            product_id,
            location_id,
            movement_type: MovementType::Adjustment,
            quantity_change,
            reference_id: None,
            actor_user_id,
            reason: Some(reason.to_string()),
        })
        .await
    }

    async fn publish_events(&self, request: &MovementRequest, outcome: &MovementOutcome) {
        let event = Event::StockMovementRecorded {
            movement_id: outcome.movement_id,
            product_id: request.product_id,
            location_id: request.location_id,
            movement_type: request.movement_type.as_str().to_string(),
            quantity_change: request.quantity_change,
            quantity_before: outcome.quantity_before,
            quantity_after: outcome.quantity_after,
            actor_user_id: request.actor_user_id,
            occurred_at: Utc::now(),
        };
        if let Err(e) = self.event_sender.send(event).await {
            warn!(error = %e, "Failed to publish stock movement event");
        }

        if let Some(low_stock) = &outcome.low_stock {
            let warning = Event::LowStockWarning {
                product_id: request.product_id,
                location_id: request.location_id,
                remaining: low_stock.remaining,
                threshold: low_stock.threshold,
            };
            if let Err(e) = self.event_sender.send(warning).await {
                warn!(error = %e, "Failed to publish low stock event");
            }
        }
    }
}

/// The movement algorithm proper: locked load, validation, projection
/// update and ledger append, all against `txn`. Returning an error rolls
/// the caller's transaction back, so the two writes are never observed
/// independently.
async fn apply_in_txn(
    txn: &DatabaseTransaction,
    request: &MovementRequest,
    strategy: LockStrategy,
) -> Result<MovementOutcome, ServiceError> {
    if request.quantity_change == 0 {
        return Err(ServiceError::InvalidQuantity(0));
    }

    let record = load_record(txn, request, strategy).await?;

    let record = match record {
        Some(record) if record.is_active => record,
        _ => {
            return Err(ServiceError::NotAssigned {
                product_id: request.product_id,
                location_id: request.location_id,
            });
        }
    };

    // Consumption is validated against what is on hand; replenishment cannot
    // violate the non-negative invariant.
    let mut low_stock = None;
    if request.quantity_change < 0 {
        let requested = -request.quantity_change;
        let check = stock_validation::validate_availability(Some(record.quantity), requested);
        if let Some(error) = check.error {
            return Err(match error {
                AvailabilityError::InvalidQuantity => {
                    ServiceError::InvalidQuantity(request.quantity_change)
                }
                AvailabilityError::NotAssigned => ServiceError::NotAssigned {
                    product_id: request.product_id,
                    location_id: request.location_id,
                },
                AvailabilityError::InsufficientStock => ServiceError::InsufficientStock {
                    available: check.available,
                    requested,
                },
            });
        }
        low_stock = check.low_stock;
    }

    if request.movement_type == MovementType::Adjustment
        && request
            .reason
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .is_empty()
    {
        return Err(ServiceError::MissingReason);
    }

    let quantity_before = record.quantity;
    let quantity_after = quantity_before
        .checked_add(request.quantity_change)
        .ok_or_else(|| ServiceError::ValidationError("stock quantity overflow".to_string()))?;

    persist_quantity(txn, &record, quantity_after, strategy).await?;

    let movement_id = Uuid::new_v4();
    let movement = stock_movement::ActiveModel {
        id: Set(movement_id),
        product_id: Set(request.product_id),
        location_id: Set(request.location_id),
        movement_type: Set(request.movement_type.as_str().to_string()),
        quantity_change: Set(request.quantity_change),
        quantity_before: Set(quantity_before),
        quantity_after: Set(quantity_after),
        reference_id: Set(request.reference_id),
        reason: Set(request.reason.clone()),
        created_by: Set(request.actor_user_id),
        created_at: Set(Utc::now()),
    };

    movement.insert(txn).await.map_err(ServiceError::db_error)?;

    Ok(MovementOutcome {
        movement_id,
        quantity_before,
        quantity_after,
        low_stock,
    })
}

async fn load_record(
    txn: &DatabaseTransaction,
    request: &MovementRequest,
    strategy: LockStrategy,
) -> Result<Option<stock_record::Model>, ServiceError> {
    let mut query = StockRecord::find()
        .filter(stock_record::Column::ProductId.eq(request.product_id))
        .filter(stock_record::Column::LocationId.eq(request.location_id));

    // FOR UPDATE is only valid on backends with row locks; elsewhere the
    // optimistic conditional update is the serialization point.
    if strategy == LockStrategy::RowExclusive
        && matches!(
            txn.get_database_backend(),
            DbBackend::Postgres | DbBackend::MySql
        )
    {
        query = query.lock_exclusive();
    }

    query.one(txn).await.map_err(ServiceError::db_error)
}

async fn persist_quantity(
    txn: &DatabaseTransaction,
    record: &stock_record::Model,
    quantity_after: i32,
    strategy: LockStrategy,
) -> Result<(), ServiceError> {
    match strategy {
        LockStrategy::RowExclusive => {
            let mut active: stock_record::ActiveModel = record.clone().into();
            active.quantity = Set(quantity_after);
            active.updated_at = Set(Utc::now());
            active.update(txn).await.map_err(ServiceError::db_error)?;
        }
        LockStrategy::OptimisticRetry => {
            // The pre-movement quantity doubles as the version token.
            let result = StockRecord::update_many()
                .col_expr(stock_record::Column::Quantity, Expr::value(quantity_after))
                .col_expr(stock_record::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(stock_record::Column::Id.eq(record.id))
                .filter(stock_record::Column::Quantity.eq(record.quantity))
                .exec(txn)
                .await
                .map_err(ServiceError::db_error)?;

            if result.rows_affected == 0 {
                return Err(ServiceError::ConcurrentModification {
                    product_id: record.product_id,
                    location_id: record.location_id,
                });
            }
        }
    }

    Ok(())
}
