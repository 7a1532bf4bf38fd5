pub mod sales_transactions;
pub mod sequence;
pub mod stock;
pub mod visits;
