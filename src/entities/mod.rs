pub mod stock_movement;
pub mod stock_record;
