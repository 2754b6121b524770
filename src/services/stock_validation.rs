use serde::Serialize;

/// Fraction of the pre-movement quantity under which remaining stock is
/// considered low.
pub const LOW_STOCK_RATIO_PERCENT: i32 = 10;

/// Minimum threshold in units; dominates for small shelf quantities.
pub const LOW_STOCK_FLOOR: i32 = 2;

/// Why an availability check failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AvailabilityError {
    /// Requested quantity was zero or negative
    InvalidQuantity,
    /// No active stock record exists for the key
    NotAssigned,
    /// Requested more than is on hand
    InsufficientStock,
}

/// Advisory signal that a movement left the shelf near (or at) empty
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LowStockWarning {
    pub remaining: i32,
    pub threshold: i32,
    pub message: String,
}

/// Outcome of checking a requested consumption against current stock
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityCheck {
    pub is_valid: bool,
    pub available: i32,
    pub error: Option<AvailabilityError>,
    pub low_stock: Option<LowStockWarning>,
}

/// Low-stock threshold for a given pre-movement quantity: two units or 10%
/// of the quantity (rounded up), whichever is larger. Remaining stock at or
/// below the threshold warns; that includes a remainder of exactly zero,
/// since an emptied shelf is the strongest restock signal there is.
pub fn low_stock_threshold(current_quantity: i32) -> i32 {
    // ceil(current * 0.10) in integer arithmetic
    let tenth = (current_quantity + LOW_STOCK_RATIO_PERCENT - 1) / LOW_STOCK_RATIO_PERCENT;
    tenth.max(LOW_STOCK_FLOOR)
}

/// Validates that `requested` units can be taken from the stock described by
/// `current_quantity` (`None` when no active stock record exists).
///
/// Pure and side-effect free; the movement orchestrator calls this inside
/// its transaction and the tests call it directly.
pub fn validate_availability(current_quantity: Option<i32>, requested: i32) -> AvailabilityCheck {
    if requested <= 0 {
        return AvailabilityCheck {
            is_valid: false,
            available: current_quantity.unwrap_or(0),
            error: Some(AvailabilityError::InvalidQuantity),
            low_stock: None,
        };
    }

    let current = match current_quantity {
        Some(quantity) => quantity,
        None => {
            return AvailabilityCheck {
                is_valid: false,
                available: 0,
                error: Some(AvailabilityError::NotAssigned),
                low_stock: None,
            };
        }
    };

    if requested > current {
        return AvailabilityCheck {
            is_valid: false,
            available: current,
            error: Some(AvailabilityError::InsufficientStock),
            low_stock: None,
        };
    }

    let remaining = current - requested;
    let threshold = low_stock_threshold(current);
    let low_stock = (remaining <= threshold).then(|| LowStockWarning {
        remaining,
        threshold,
        message: format!("Low stock: {} remaining", remaining),
    });

    AvailabilityCheck {
        is_valid: true,
        available: current,
        error: None,
        low_stock,
    }
}
