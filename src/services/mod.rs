// Inventory core services
pub mod stock_assignment;
pub mod stock_history;
pub mod stock_import;
pub mod stock_movements;
pub mod stock_validation;

pub use stock_assignment::{AssignmentOutcome, StockAssignmentService};
pub use stock_history::{MovementHistoryFilter, StockHistoryService};
pub use stock_import::{ImportRow, ImportSummary, StockImportService};
pub use stock_movements::{
    LockStrategy, MovementOutcome, MovementRequest, StockMovementService,
};
pub use stock_validation::{
    low_stock_threshold, validate_availability, AvailabilityCheck, AvailabilityError,
    LowStockWarning,
};
