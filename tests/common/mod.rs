use std::sync::Arc;

use karat_pos_api::{
    catalog::StaticCatalog,
    config::AppConfig,
    db,
    events,
    services::{
        LockStrategy, StockAssignmentService, StockHistoryService, StockImportService,
        StockMovementService,
    },
};
use sea_orm::DatabaseConnection;
use uuid::Uuid;

/// Helper harness wiring the inventory services over an in-memory SQLite
/// database. The pool is pinned to a single connection so the in-memory
/// database is shared by everything in the test.
pub struct TestApp {
    pub db: Arc<DatabaseConnection>,
    pub catalog: Arc<StaticCatalog>,
    pub assignments: StockAssignmentService,
    pub movements: StockMovementService,
    pub imports: StockImportService,
    pub history: StockHistoryService,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a test application with fresh database state.
    pub async fn new() -> Self {
        Self::with_lock_strategy(LockStrategy::default()).await
    }

    pub async fn with_lock_strategy(lock_strategy: LockStrategy) -> Self {
        let mut cfg = AppConfig::new("sqlite::memory:".to_string(), "test".to_string());
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db = Arc::new(pool);
        let (sender, rx) = events::channel(cfg.event_buffer_size);
        let event_task = tokio::spawn(events::process_events(rx));
        let sender = Arc::new(sender);

        let catalog = Arc::new(StaticCatalog::new());
        let movements = StockMovementService::new(db.clone(), sender.clone(), lock_strategy);
        let assignments =
            StockAssignmentService::new(db.clone(), catalog.clone(), sender.clone());
        let imports = StockImportService::new(
            db.clone(),
            catalog.clone(),
            movements.clone(),
            sender.clone(),
        );
        let history = StockHistoryService::new(db.clone());

        Self {
            db,
            catalog,
            assignments,
            movements,
            imports,
            history,
            _event_task: event_task,
        }
    }

    /// Registers an active product in the fixture catalog.
    #[allow(dead_code)]
    pub fn active_product(&self) -> Uuid {
        let product_id = Uuid::new_v4();
        self.catalog.upsert_product(product_id, true);
        product_id
    }

    /// Registers an active product reachable by SKU.
    #[allow(dead_code)]
    pub fn active_product_with_sku(&self, sku: &str) -> Uuid {
        let product_id = self.active_product();
        self.catalog.register_sku(sku, product_id);
        product_id
    }

    /// Registers an active location in the fixture catalog.
    #[allow(dead_code)]
    pub fn active_location(&self) -> Uuid {
        let location_id = Uuid::new_v4();
        self.catalog.upsert_location(location_id, true);
        location_id
    }

    /// Assigns the product and brings its stock to `quantity` through a
    /// counted adjustment, the way an opening inventory count would.
    #[allow(dead_code)]
    pub async fn assign_and_stock(
        &self,
        product_id: Uuid,
        location_id: Uuid,
        quantity: i32,
    ) -> Uuid {
        self.assignments
            .assign(product_id, location_id)
            .await
            .expect("assign should succeed");
        let actor = actor();
        if quantity > 0 {
            self.movements
                .adjust_stock(product_id, location_id, quantity, "opening count", actor)
                .await
                .expect("seed adjustment should succeed");
        }
        actor
    }
}

/// A stable fake register operator.
#[allow(dead_code)]
pub fn actor() -> Uuid {
    Uuid::new_v4()
}
