use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::errors::ServiceError;

/// Read-only view of the product/location catalog, owned by a collaborator.
///
/// The inventory core never writes catalog data; it only needs to know
/// whether a product or location is currently active, and how to turn an
/// imported SKU into a product id. SKU resolution is case-insensitive.
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    async fn product_is_active(&self, product_id: Uuid) -> Result<bool, ServiceError>;

    async fn location_is_active(&self, location_id: Uuid) -> Result<bool, ServiceError>;

    /// Resolves a SKU to its product id, ignoring case. `None` when the SKU
    /// is unknown.
    async fn resolve_sku(&self, sku: &str) -> Result<Option<Uuid>, ServiceError>;
}

/// In-memory catalog used by tests and embedded tooling.
#[derive(Debug, Default)]
pub struct StaticCatalog {
    products: DashMap<Uuid, bool>,
    locations: DashMap<Uuid, bool>,
    skus: DashMap<String, Uuid>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_product(&self, product_id: Uuid, active: bool) {
        self.products.insert(product_id, active);
    }

    pub fn upsert_location(&self, location_id: Uuid, active: bool) {
        self.locations.insert(location_id, active);
    }

    pub fn register_sku(&self, sku: &str, product_id: Uuid) {
        self.skus.insert(sku.to_uppercase(), product_id);
    }
}

#[async_trait]
impl CatalogProvider for StaticCatalog {
    async fn product_is_active(&self, product_id: Uuid) -> Result<bool, ServiceError> {
        Ok(self
            .products
            .get(&product_id)
            .map(|active| *active)
            .unwrap_or(false))
    }

    async fn location_is_active(&self, location_id: Uuid) -> Result<bool, ServiceError> {
        Ok(self
            .locations
            .get(&location_id)
            .map(|active| *active)
            .unwrap_or(false))
    }

    async fn resolve_sku(&self, sku: &str) -> Result<Option<Uuid>, ServiceError> {
        Ok(self.skus.get(&sku.to_uppercase()).map(|id| *id))
    }
}
