use crate::{
    catalog::CatalogProvider,
    db::DbPool,
    entities::{
        stock_movement::MovementType,
        stock_record::{self, Entity as StockRecord},
    },
    errors::{from_transaction_error, ServiceError},
    events::{Event, EventSender},
    services::stock_movements::{MovementRequest, StockMovementService},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// One validated spreadsheet row, as handed over by the upload collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRow {
    pub sku: String,
    pub quantity: i32,
}

/// Counts accumulated while applying an import file
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
    pub rows_processed: usize,
    pub assignments_created: usize,
    pub stock_updated: usize,
}

struct ResolvedRow {
    product_id: Uuid,
    quantity: i32,
    sku: String,
}

/// Turns a bulk (sku, quantity) file into implicit assignments and Import
/// movements for one target location.
///
/// The whole file is validated before anything is written, and applied
/// inside a single transaction: an infrastructure failure halfway through
/// leaves no partial import visible. Quantities are additive; importing an
/// already-stocked SKU means "received more inventory", never an overwrite.
#[derive(Clone)]
pub struct StockImportService {
    db_pool: Arc<DbPool>,
    catalog: Arc<dyn CatalogProvider>,
    movements: StockMovementService,
    event_sender: Arc<EventSender>,
}

impl StockImportService {
    pub fn new(
        db_pool: Arc<DbPool>,
        catalog: Arc<dyn CatalogProvider>,
        movements: StockMovementService,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db_pool,
            catalog,
            movements,
            event_sender,
        }
    }

    #[instrument(skip(self, rows), fields(row_count = rows.len()))]
    pub async fn import_stock(
        &self,
        rows: Vec<ImportRow>,
        location_id: Uuid,
        actor_user_id: Uuid,
    ) -> Result<ImportSummary, ServiceError> {
        let resolved = self.validate_rows(&rows, location_id).await?;

        let movements = self.movements.clone();
        let summary = self
            .db_pool
            .transaction::<_, ImportSummary, ServiceError>(move |txn| {
                Box::pin(async move {
                    apply_rows(txn, &movements, resolved, location_id, actor_user_id).await
                })
            })
            .await
            .map_err(from_transaction_error)?;

        info!(
            %location_id,
            rows_processed = summary.rows_processed,
            assignments_created = summary.assignments_created,
            stock_updated = summary.stock_updated,
            "Stock import committed"
        );

        let event = Event::StockImportCompleted {
            location_id,
            rows_processed: summary.rows_processed,
            assignments_created: summary.assignments_created,
            stock_updated: summary.stock_updated,
        };
        if let Err(e) = self.event_sender.send(event).await {
            warn!(error = %e, "Failed to publish import event");
        }

        Ok(summary)
    }

    /// The read-only validation pass. Collects every row error instead of
    /// stopping at the first, so the operator can fix the file in one go.
    async fn validate_rows(
        &self,
        rows: &[ImportRow],
        location_id: Uuid,
    ) -> Result<Vec<ResolvedRow>, ServiceError> {
        let mut errors = Vec::new();

        if !self.catalog.location_is_active(location_id).await? {
            errors.push(format!("Location {} is not active", location_id));
        }

        let mut seen_skus: HashSet<String> = HashSet::new();
        let mut resolved = Vec::with_capacity(rows.len());

        for (index, row) in rows.iter().enumerate() {
            let row_number = index + 1;
            let normalized_sku = row.sku.trim().to_uppercase();

            if normalized_sku.is_empty() {
                errors.push(format!("row {}: empty SKU", row_number));
                continue;
            }

            if row.quantity < 0 {
                errors.push(format!(
                    "row {}: negative quantity {} for SKU {}",
                    row_number, row.quantity, row.sku
                ));
                continue;
            }

            if !seen_skus.insert(normalized_sku.clone()) {
                errors.push(format!("row {}: duplicate SKU {}", row_number, row.sku));
                continue;
            }

            match self.catalog.resolve_sku(&normalized_sku).await? {
                None => {
                    errors.push(format!("row {}: unknown SKU {}", row_number, row.sku));
                }
                Some(product_id) => {
                    if !self.catalog.product_is_active(product_id).await? {
                        errors.push(format!(
                            "row {}: product for SKU {} is not active",
                            row_number, row.sku
                        ));
                    } else {
                        resolved.push(ResolvedRow {
                            product_id,
                            quantity: row.quantity,
                            sku: normalized_sku,
                        });
                    }
                }
            }
        }

        if !errors.is_empty() {
            return Err(ServiceError::ImportValidation(errors));
        }

        Ok(resolved)
    }
}

/// The apply pass. Runs against one transaction for the whole file; each
/// row only touches its own stock key, so concurrent sales on other keys
/// are never blocked by a large import.
async fn apply_rows(
    txn: &DatabaseTransaction,
    movements: &StockMovementService,
    rows: Vec<ResolvedRow>,
    location_id: Uuid,
    actor_user_id: Uuid,
) -> Result<ImportSummary, ServiceError> {
    let mut summary = ImportSummary::default();

    for row in rows {
        if ensure_assignment(txn, row.product_id, location_id).await? {
            summary.assignments_created += 1;
        }

        // Zero-quantity rows only establish the assignment; a movement that
        // changes nothing has no place in the ledger.
        if row.quantity > 0 {
            movements
                .apply_movement_in_txn(
                    txn,
                    &MovementRequest {
                        product_id: row.product_id,
                        location_id,
                        movement_type: MovementType::Import,
                        quantity_change: row.quantity,
                        reference_id: None,
                        actor_user_id,
                        reason: None,
                    },
                )
                .await?;
            summary.stock_updated += 1;
        }

        tracing::debug!(sku = %row.sku, quantity = row.quantity, "Applied import row");
        summary.rows_processed += 1;
    }

    Ok(summary)
}

/// Creates (or reactivates) the stock record for the key, reporting whether
/// an implicit assignment happened.
async fn ensure_assignment(
    txn: &DatabaseTransaction,
    product_id: Uuid,
    location_id: Uuid,
) -> Result<bool, ServiceError> {
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
            record.insert(txn).await.map_err(ServiceError::db_error)?;
            Ok(true)
        }
        Some(record) if !record.is_active => {
            let mut active: stock_record::ActiveModel = record.into();
            active.is_active = Set(true);
            active.updated_at = Set(Utc::now());
            active.update(txn).await.map_err(ServiceError::db_error)?;
            Ok(true)
        }
        Some(_) => Ok(false),
    }
}
