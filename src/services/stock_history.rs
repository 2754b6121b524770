use crate::{
    clamp_page,
    db::DbPool,
    entities::{
        stock_movement::{self, Entity as StockMovement},
        stock_record::{self, Entity as StockRecord},
    },
    errors::ServiceError,
    PaginatedResponse,
};
use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder};
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Optional narrowing of a movement history query. No date range is implied
/// when `from`/`to` are unset; trailing-window defaults are an HTTP-layer
/// policy.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MovementHistoryFilter {
    pub product_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Read path over the ledger and the stock projection. Holds no state and
/// performs no writes.
#[derive(Clone)]
pub struct StockHistoryService {
    db_pool: Arc<DbPool>,
}

impl StockHistoryService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Pages through movement records matching the filter, most recent
    /// first.
    #[instrument(skip(self))]
    pub async fn movement_history(
        &self,
        filter: &MovementHistoryFilter,
        page: u64,
        limit: u64,
    ) -> Result<PaginatedResponse<stock_movement::Model>, ServiceError> {
        let (page, limit) = clamp_page(page, limit);
        let db = &*self.db_pool;

        let mut query = StockMovement::find();
        if let Some(product_id) = filter.product_id {
            query = query.filter(stock_movement::Column::ProductId.eq(product_id));
        }
        if let Some(location_id) = filter.location_id {
            query = query.filter(stock_movement::Column::LocationId.eq(location_id));
        }
        if let Some(from) = filter.from {
            query = query.filter(stock_movement::Column::CreatedAt.gte(from));
        }
        if let Some(to) = filter.to {
            query = query.filter(stock_movement::Column::CreatedAt.lte(to));
        }

        let paginator = query
            .order_by_desc(stock_movement::Column::CreatedAt)
            .order_by_desc(stock_movement::Column::Id)
            .paginate(db, limit);

        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let items = paginator
            .fetch_page(page - 1)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(PaginatedResponse::new(items, total, page, limit))
    }

    /// Pages through the active stock records of one location.
    #[instrument(skip(self))]
    pub async fn stock_on_hand(
        &self,
        location_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<PaginatedResponse<stock_record::Model>, ServiceError> {
        let (page, limit) = clamp_page(page, limit);
        let db = &*self.db_pool;

        let paginator = StockRecord::find()
            .filter(stock_record::Column::LocationId.eq(location_id))
            .filter(stock_record::Column::IsActive.eq(true))
            .order_by_asc(stock_record::Column::ProductId)
            .paginate(db, limit);

        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let items = paginator
            .fetch_page(page - 1)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(PaginatedResponse::new(items, total, page, limit))
    }
}
