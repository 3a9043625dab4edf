//! Order entity - a customer's garment-care job.
//!
//! An order owns its records (and, through them, machine assignments). Its `quantity`
//! and `amount` columns are derived totals over the live records and are rewritten by
//! `core::order::recompute_totals` after every record mutation.

use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle of an order.
///
/// Moves forward one step at a time along `Pending → Processing → Ready → Delivered`;
/// any non-terminal state may move to `Cancelled`.
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
pub enum OrderStatus {
    /// Received, no work started
    #[sea_orm(string_value = "Pending")]
    Pending,
    /// Being washed/dried
    #[sea_orm(string_value = "Processing")]
    Processing,
    /// Ready for pickup or delivery
    #[sea_orm(string_value = "Ready")]
    Ready,
    /// Handed back to the customer
    #[sea_orm(string_value = "Delivered")]
    Delivered,
    /// Abandoned
    #[sea_orm(string_value = "Cancelled")]
    Cancelled,
}

impl OrderStatus {
    /// `Delivered` and `Cancelled` accept no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Whether `self → next` is a legal move.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Pending, Self::Processing)
            | (Self::Processing, Self::Ready)
            | (Self::Ready, Self::Delivered) => true,
            (from, Self::Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Order database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    /// Unique identifier for the order
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Unique human-facing reference (e.g. `"ORD-100"`)
    #[sea_orm(unique)]
    pub reference_no: String,
    /// Customer the order belongs to
    pub customer_id: i64,
    /// Date the order was taken
    pub order_date: Date,
    /// Promised delivery date, if agreed
    pub delivery_date: Option<Date>,
    /// Sum of live record quantities
    pub quantity: i32,
    /// Current lifecycle status
    pub status: OrderStatus,
    /// Sum of live record total prices
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub amount: Decimal,
    /// Whether the order has been settled
    pub paid: bool,
    /// When the order was created
    pub created_at: DateTimeUtc,
    /// When the order was last modified
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between Order and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each order belongs to one customer
    #[sea_orm(
        belongs_to = "super::customer::Entity",
        from = "Column::CustomerId",
        to = "super::customer::Column::Id"
    )]
    Customer,
    /// One order owns many records
    #[sea_orm(has_many = "super::order_record::Entity")]
    OrderRecords,
    /// Assignments are also keyed by order for query convenience
    #[sea_orm(has_many = "super::machine_assignment::Entity")]
    MachineAssignments,
}

impl Related<super::customer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

impl Related<super::order_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderRecords.def()
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
        self.amount = super::at_scale(self.amount, 2);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions_are_single_step() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Processing));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Ready));
        assert!(OrderStatus::Ready.can_transition_to(OrderStatus::Delivered));

        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Ready));
        assert!(!OrderStatus::Ready.can_transition_to(OrderStatus::Processing));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Pending));
    }

    #[test]
    fn test_cancel_only_from_non_terminal() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Ready.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Cancelled));
    }
}
