use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kinds of stock movements recorded in the audit log.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    In,
    Out,
    Sale,
    Transfer,
    Adjustment,
    Return,
}

/// Immutable audit record of a single ledger mutation.
///
/// Append-only: rows are created once per mutation and never updated or
/// deleted. The direction is encoded by which branch column is populated;
/// transfers populate both on one row.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_movements")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub reference_number: String,
    pub product_id: Uuid,
    pub from_branch_id: Option<Uuid>,
    pub to_branch_id: Option<Uuid>,
    pub movement_type: String,
    pub quantity: i32,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn movement_type_round_trips_through_strings() {
        assert_eq!(MovementType::Sale.to_string(), "sale");
        assert_eq!(MovementType::Adjustment.to_string(), "adjustment");
        assert_eq!(MovementType::from_str("return").unwrap(), MovementType::Return);
        assert_eq!(MovementType::from_str("in").unwrap(), MovementType::In);
        assert!(MovementType::from_str("reserve").is_err());
    }
}
