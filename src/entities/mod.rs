pub mod commission;
pub mod reference_counter;
pub mod sales_transaction;
pub mod sales_transaction_item;
pub mod stock;
pub mod stock_movement;
pub mod visit;
