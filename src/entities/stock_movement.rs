use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kinds of stock movements recorded in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementType {
    Sale,
    Return,
    Adjustment,
    Import,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Sale => "sale",
            MovementType::Return => "return",
            MovementType::Adjustment => "adjustment",
            MovementType::Import => "import",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "sale" => Some(MovementType::Sale),
            "return" => Some(MovementType::Return),
            "adjustment" => Some(MovementType::Adjustment),
            "import" => Some(MovementType::Import),
            _ => None,
        }
    }
}

/// One audited change to a stock record's quantity.
///
/// Rows are append-only: they are never updated or deleted, and always
/// satisfy `quantity_after == quantity_before + quantity_change` with
/// `quantity_after >= 0`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_movements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub product_id: Uuid,
    pub location_id: Uuid,
    /// Stored as string in the DB; convert via `MovementType::{as_str,from_str}`
    pub movement_type: String,
    pub quantity_change: i32,
    pub quantity_before: i32,
    pub quantity_after: i32,
    /// Originating sale or return, when the movement came from one
    pub reference_id: Option<Uuid>,
    /// Mandatory for adjustments, optional otherwise
    pub reason: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        if let ActiveValue::NotSet = active_model.created_at {
            active_model.created_at = Set(Utc::now());
        }
        Ok(active_model)
    }
}
