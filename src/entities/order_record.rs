//! Order record entity - one line item within an order.
//!
//! A record groups a quantity of items sharing a wash type and a set of process
//! types. It carries its own price and fulfillment status and owns the machine
//! assignments that work it through the wash/dry stages.

use rust_decimal::Decimal;
use sea_orm::FromJsonQueryResult;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Fulfillment status of a single record.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum RecordStatus {
    /// Not started
    #[sea_orm(string_value = "Pending")]
    Pending,
    /// At least partially in the machines
    #[sea_orm(string_value = "InProgress")]
    InProgress,
    /// All work done
    #[sea_orm(string_value = "Completed")]
    Completed,
    /// Dropped from the order; excluded from totals and billing
    #[sea_orm(string_value = "Cancelled")]
    Cancelled,
}

impl RecordStatus {
    /// `Completed` and `Cancelled` accept no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether `self → next` is a legal move.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Pending, Self::InProgress) | (Self::InProgress, Self::Completed) => true,
            (from, Self::Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Ordered set of process-type identifiers applied to a record.
///
/// Stored as a JSON array. Order is kept for display; duplicates and non-positive ids
/// are rejected by [`ProcessTypes::new`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct ProcessTypes(pub Vec<i64>);

impl ProcessTypes {
    /// Validates and wraps a list of process-type ids.
    ///
    /// # Errors
    /// Returns a description of the first id that is non-positive or repeated.
    pub fn new(ids: Vec<i64>) -> std::result::Result<Self, String> {
        for (index, id) in ids.iter().enumerate() {
            if *id <= 0 {
                return Err(format!("process type id must be positive, got {id}"));
            }
            if ids[..index].contains(id) {
                return Err(format!("process type id {id} listed more than once"));
            }
        }
        Ok(Self(ids))
    }

    /// The ids in display order.
    #[must_use]
    pub fn ids(&self) -> &[i64] {
        &self.0
    }
}

/// Order record database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_records")]
pub struct Model {
    /// Unique identifier for the record
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning order
    pub order_id: i64,
    /// Number of items in this line
    pub quantity: i32,
    /// Wash treatment (e.g. `"wash-fold"`, `"dry-clean"`)
    pub wash_type: String,
    /// Process types applied on top of the wash
    #[sea_orm(column_type = "Json")]
    pub process_types: ProcessTypes,
    /// Optional item-type lookup reference
    pub item_type_id: Option<i64>,
    /// Fulfillment status
    pub status: RecordStatus,
    /// Optional tag/tracking number
    pub tracking_number: Option<String>,
    /// Price per item
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub unit_price: Decimal,
    /// `unit_price × quantity`
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub total_price: Decimal,
    /// Whether this line has been settled
    pub paid: bool,
    /// When the record was created
    pub created_at: DateTimeUtc,
    /// When the record was last modified
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between `OrderRecord` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each record belongs to one order and goes with it
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id",
        on_delete = "Cascade"
    )]
    Order,
    /// One record owns many assignments
    #[sea_orm(has_many = "super::machine_assignment::Entity")]
    MachineAssignments,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl Related<super::machine_assignment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MachineAssignments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl super::MoneyScale for Model {
    fn with_money_scale(mut self) -> Self {
        self.unit_price = super::at_scale(self.unit_price, 2);
        self.total_price = super::at_scale(self.total_price, 2);
        self
    }
}
