use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

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
pub enum VisitType {
    Routine,
    Prospecting,
    FollowUp,
    Complaint,
    Other,
}

/// Lifecycle states of a field visit. `approved` and `rejected` are
/// terminal.
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
pub enum VisitStatus {
    Pending,
    Approved,
    Rejected,
}

/// A field-visit record. Rejection reasons live in the dedicated
/// `rejection_reason` column; `notes` stays free text. Geolocation values
/// are validated at the edge and treated as opaque decimals here.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "visits")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub visit_number: String,
    pub visit_date: NaiveDate,
    pub branch_id: Uuid,
    pub sales_id: Uuid,
    pub area_id: Option<Uuid>,
    pub customer_name: String,
    pub visit_type: String,
    pub status: String,
    pub purpose: Option<String>,
    pub result: Option<String>,
    pub notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
    pub photo: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
