mod common;

use assert_matches::assert_matches;
use common::{actor, TestApp};
use karat_pos_api::{
    entities::{
        stock_movement::{self, Entity as StockMovement, MovementType},
        stock_record::{self, Entity as StockRecord},
    },
    errors::ServiceError,
    services::ImportRow,
};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use uuid::Uuid;

fn row(sku: &str, quantity: i32) -> ImportRow {
    ImportRow {
        sku: sku.to_string(),
        quantity,
    }
}

async fn record_for(
    app: &TestApp,
    product_id: Uuid,
    location_id: Uuid,
) -> Option<stock_record::Model> {
    StockRecord::find()
        .filter(stock_record::Column::ProductId.eq(product_id))
        .filter(stock_record::Column::LocationId.eq(location_id))
        .one(&*app.db)
        .await
        .expect("stock record query should succeed")
}

async fn location_ledger_count(app: &TestApp, location_id: Uuid) -> u64 {
    StockMovement::find()
        .filter(stock_movement::Column::LocationId.eq(location_id))
        .count(&*app.db)
        .await
        .expect("ledger count should succeed")
}

#[tokio::test]
async fn import_of_unassigned_sku_creates_assignment_and_movement() {
    let app = TestApp::new().await;
    let product_id = app.active_product_with_sku("SKU-1");
    let location_id = app.active_location();

    let summary = app
        .imports
        .import_stock(vec![row("SKU-1", 10)], location_id, actor())
        .await
        .expect("import should succeed");

    assert_eq!(summary.rows_processed, 1);
    assert_eq!(summary.assignments_created, 1);
    assert_eq!(summary.stock_updated, 1);

    let record = record_for(&app, product_id, location_id)
        .await
        .expect("record should exist");
    assert!(record.is_active);
    assert_eq!(record.quantity, 10);

    let movement = StockMovement::find()
        .filter(stock_movement::Column::ProductId.eq(product_id))
        .filter(stock_movement::Column::LocationId.eq(location_id))
        .one(&*app.db)
        .await
        .expect("ledger query should succeed")
        .expect("import movement should exist");
    assert_eq!(movement.movement_type, MovementType::Import.as_str());
    assert_eq!(movement.quantity_before, 0);
    assert_eq!(movement.quantity_after, 10);
}

#[tokio::test]
async fn duplicate_skus_are_rejected_before_any_write() {
    let app = TestApp::new().await;
    app.active_product_with_sku("RING-001");
    let location_id = app.active_location();

    // Duplicate detection ignores case.
    let err = app
        .imports
        .import_stock(
            vec![row("RING-001", 10), row("ring-001", 5)],
            location_id,
            actor(),
        )
        .await
        .expect_err("duplicate SKUs should fail validation");

    match err {
        ServiceError::ImportValidation(errors) => {
            assert!(errors.iter().any(|e| e.contains("duplicate")), "{errors:?}");
        }
        other => panic!("expected ImportValidation, got {other:?}"),
    }

    assert_eq!(location_ledger_count(&app, location_id).await, 0);
    let records = StockRecord::find()
        .filter(stock_record::Column::LocationId.eq(location_id))
        .count(&*app.db)
        .await
        .expect("record count should succeed");
    assert_eq!(records, 0, "validation failure must leave the location untouched");
}

#[tokio::test]
async fn unknown_sku_fails_validation() {
    let app = TestApp::new().await;
    let location_id = app.active_location();

    let err = app
        .imports
        .import_stock(vec![row("BRC-999", 4)], location_id, actor())
        .await
        .expect_err("unknown SKU should fail validation");
    assert_matches!(err, ServiceError::ImportValidation(_));
    assert_eq!(location_ledger_count(&app, location_id).await, 0);
}

#[tokio::test]
async fn inactive_product_fails_validation() {
    let app = TestApp::new().await;
    let product_id = Uuid::new_v4();
    app.catalog.upsert_product(product_id, false);
    app.catalog.register_sku("NCK-7", product_id);
    let location_id = app.active_location();

    let err = app
        .imports
        .import_stock(vec![row("NCK-7", 4)], location_id, actor())
        .await
        .expect_err("inactive product should fail validation");
    assert_matches!(err, ServiceError::ImportValidation(_));
}

#[tokio::test]
async fn negative_quantity_fails_validation() {
    let app = TestApp::new().await;
    app.active_product_with_sku("SKU-1");
    let location_id = app.active_location();

    let err = app
        .imports
        .import_stock(vec![row("SKU-1", -1)], location_id, actor())
        .await
        .expect_err("negative quantity should fail validation");
    assert_matches!(err, ServiceError::ImportValidation(_));
}

#[tokio::test]
async fn inactive_location_fails_validation() {
    let app = TestApp::new().await;
    app.active_product_with_sku("SKU-1");
    let location_id = Uuid::new_v4();
    app.catalog.upsert_location(location_id, false);

    let err = app
        .imports
        .import_stock(vec![row("SKU-1", 3)], location_id, actor())
        .await
        .expect_err("inactive location should fail validation");
    assert_matches!(err, ServiceError::ImportValidation(_));
}

#[tokio::test]
async fn importing_a_stocked_sku_is_additive() {
    let app = TestApp::new().await;
    let product_id = app.active_product_with_sku("SKU-1");
    let location_id = app.active_location();
    app.assign_and_stock(product_id, location_id, 5).await;

    let summary = app
        .imports
        .import_stock(vec![row("SKU-1", 10)], location_id, actor())
        .await
        .expect("import should succeed");

    assert_eq!(summary.assignments_created, 0);
    assert_eq!(summary.stock_updated, 1);

    let record = record_for(&app, product_id, location_id)
        .await
        .expect("record should exist");
    assert_eq!(record.quantity, 15, "import adds to stock, never overwrites");

    let import_row = StockMovement::find()
        .filter(stock_movement::Column::ProductId.eq(product_id))
        .filter(stock_movement::Column::MovementType.eq(MovementType::Import.as_str()))
        .one(&*app.db)
        .await
        .expect("ledger query should succeed")
        .expect("import movement should exist");
    assert_eq!(import_row.quantity_before, 5);
    assert_eq!(import_row.quantity_after, 15);
}

#[tokio::test]
async fn zero_quantity_row_assigns_without_a_ledger_entry() {
    let app = TestApp::new().await;
    let product_id = app.active_product_with_sku("SKU-1");
    let location_id = app.active_location();

    let summary = app
        .imports
        .import_stock(vec![row("SKU-1", 0)], location_id, actor())
        .await
        .expect("import should succeed");

    assert_eq!(summary.rows_processed, 1);
    assert_eq!(summary.assignments_created, 1);
    assert_eq!(summary.stock_updated, 0);

    let record = record_for(&app, product_id, location_id)
        .await
        .expect("record should exist");
    assert!(record.is_active);
    assert_eq!(record.quantity, 0);
    assert_eq!(location_ledger_count(&app, location_id).await, 0);
}

#[tokio::test]
async fn mixed_file_accumulates_counts_per_row() {
    let app = TestApp::new().await;
    let existing = app.active_product_with_sku("SKU-OLD");
    app.active_product_with_sku("SKU-NEW");
    let location_id = app.active_location();
    app.assign_and_stock(existing, location_id, 3).await;

    let summary = app
        .imports
        .import_stock(
            vec![row("SKU-OLD", 2), row("SKU-NEW", 7)],
            location_id,
            actor(),
        )
        .await
        .expect("import should succeed");

    assert_eq!(summary.rows_processed, 2);
    assert_eq!(summary.assignments_created, 1);
    assert_eq!(summary.stock_updated, 2);
}

#[tokio::test]
async fn sku_resolution_ignores_case() {
    let app = TestApp::new().await;
    let product_id = app.active_product_with_sku("Ring-Gold-18K");
    let location_id = app.active_location();

    app.imports
        .import_stock(vec![row("ring-gold-18k", 6)], location_id, actor())
        .await
        .expect("import should succeed");

    let record = record_for(&app, product_id, location_id)
        .await
        .expect("record should exist");
    assert_eq!(record.quantity, 6);
}

#[tokio::test]
async fn import_reactivates_a_deactivated_assignment() {
    let app = TestApp::new().await;
    let product_id = app.active_product_with_sku("SKU-1");
    let location_id = app.active_location();
    app.assignments
        .assign(product_id, location_id)
        .await
        .expect("assign should succeed");
    app.assignments
        .unassign(product_id, location_id)
        .await
        .expect("unassign should succeed");

    let summary = app
        .imports
        .import_stock(vec![row("SKU-1", 5)], location_id, actor())
        .await
        .expect("import should succeed");

    assert_eq!(summary.assignments_created, 1, "reactivation counts as an implicit assignment");
    let record = record_for(&app, product_id, location_id)
        .await
        .expect("record should exist");
    assert!(record.is_active);
    assert_eq!(record.quantity, 5);
}
