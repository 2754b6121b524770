use crate::{
    catalog::CatalogProvider,
    db::DbPool,
    entities::stock_record::{self, Entity as StockRecord},
    errors::{from_transaction_error, ServiceError},
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Result of an assign or unassign call
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentOutcome {
    pub record: stock_record::Model,
    pub was_reactivated: bool,
}

/// Lifecycle of the (product, location) pairing that lets a product hold
/// stock at a location.
///
/// Assignment is administrative, not a stock movement: it never touches the
/// ledger. Reactivating a previously unassigned pairing resumes the record
/// with the quantity it held at deactivation, keeping its movement timeline
/// contiguous.
#[derive(Clone)]
pub struct StockAssignmentService {
    db_pool: Arc<DbPool>,
    catalog: Arc<dyn CatalogProvider>,
    event_sender: Arc<EventSender>,
}

impl StockAssignmentService {
    pub fn new(
        db_pool: Arc<DbPool>,
        catalog: Arc<dyn CatalogProvider>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db_pool,
            catalog,
            event_sender,
        }
    }

    /// Assigns a product to a location, creating a zero-quantity stock
    /// record, or reactivates a previously unassigned pairing.
    #[instrument(skip(self))]
    pub async fn assign(
        &self,
        product_id: Uuid,
        location_id: Uuid,
    ) -> Result<AssignmentOutcome, ServiceError> {
        if !self.catalog.product_is_active(product_id).await? {
            return Err(ServiceError::ValidationError(format!(
                "Product {} is not active",
                product_id
            )));
        }
        if !self.catalog.location_is_active(location_id).await? {
            return Err(ServiceError::ValidationError(format!(
                "Location {} is not active",
                location_id
            )));
        }

        let outcome = self
            .db_pool
            .transaction::<_, AssignmentOutcome, ServiceError>(move |txn| {
                Box::pin(async move { assign_in_txn(txn, product_id, location_id).await })
            })
            .await
            .map_err(from_transaction_error)?;

        info!(
            %product_id,
            %location_id,
            reactivated = outcome.was_reactivated,
            "Assigned product to location"
        );

        let event = Event::ProductAssigned {
            product_id,
            location_id,
            reactivated: outcome.was_reactivated,
        };
        if let Err(e) = self.event_sender.send(event).await {
            warn!(error = %e, "Failed to publish assignment event");
        }

        Ok(outcome)
    }

    /// Deactivates the pairing. Only allowed while the record holds no
    /// stock; the quantity (zero) is preserved for a later reactivation.
    #[instrument(skip(self))]
    pub async fn unassign(
        &self,
        product_id: Uuid,
        location_id: Uuid,
    ) -> Result<AssignmentOutcome, ServiceError> {
        let outcome = self
            .db_pool
            .transaction::<_, AssignmentOutcome, ServiceError>(move |txn| {
                Box::pin(async move { unassign_in_txn(txn, product_id, location_id).await })
            })
            .await
            .map_err(from_transaction_error)?;

        info!(%product_id, %location_id, "Unassigned product from location");

        let event = Event::ProductUnassigned {
            product_id,
            location_id,
        };
        if let Err(e) = self.event_sender.send(event).await {
            warn!(error = %e, "Failed to publish unassignment event");
        }

        Ok(outcome)
    }
}

async fn assign_in_txn(
    txn: &DatabaseTransaction,
    product_id: Uuid,
    location_id: Uuid,
) -> Result<AssignmentOutcome, ServiceError> {
    let existing = StockRecord::find()
        .filter(stock_record::Column::ProductId.eq(product_id))
        .filter(stock_record::Column::LocationId.eq(location_id))
        .one(txn)
        .await
        .map_err(ServiceError::db_error)?;

    match existing {
        None => {
            let record = stock_record::ActiveModel {
                product_id: Set(product_id),
                location_id: Set(location_id),
                quantity: Set(0),
                is_active: Set(true),
                created_at: Set(Utc::now()),
                updated_at: Set(Utc::now()),
                ..Default::default()
            };
            let record = record.insert(txn).await.map_err(ServiceError::db_error)?;
            Ok(AssignmentOutcome {
                record,
                was_reactivated: false,
            })
        }
        Some(record) if !record.is_active => {
            // Quantity is intentionally untouched: the record resumes where
            // its ledger left off.
            let mut active: stock_record::ActiveModel = record.into();
            active.is_active = Set(true);
            active.updated_at = Set(Utc::now());
            let record = active.update(txn).await.map_err(ServiceError::db_error)?;
            Ok(AssignmentOutcome {
                record,
                was_reactivated: true,
            })
        }
        Some(_) => Err(ServiceError::AlreadyAssigned {
            product_id,
            location_id,
        }),
    }
}

async fn unassign_in_txn(
    txn: &DatabaseTransaction,
    product_id: Uuid,
    location_id: Uuid,
) -> Result<AssignmentOutcome, ServiceError> {
    let existing = StockRecord::find()
        .filter(stock_record::Column::ProductId.eq(product_id))
        .filter(stock_record::Column::LocationId.eq(location_id))
        .one(txn)
        .await
        .map_err(ServiceError::db_error)?;

    let record = match existing {
        Some(record) if record.is_active => record,
        _ => {
            return Err(ServiceError::NotAssigned {
                product_id,
                location_id,
            });
        }
    };

    if record.quantity != 0 {
        return Err(ServiceError::NonZeroStock {
            quantity: record.quantity,
        });
    }

    let mut active: stock_record::ActiveModel = record.into();
    active.is_active = Set(false);
    active.updated_at = Set(Utc::now());
    let record = active.update(txn).await.map_err(ServiceError::db_error)?;

    Ok(AssignmentOutcome {
        record,
        was_reactivated: false,
    })
}
