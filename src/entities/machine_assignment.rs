//! Machine assignment entity - binds part of a record's quantity to a washer/dryer pair.
//!
//! Assignments belong to a record and, redundantly, to that record's order so they can
//! be queried per order. The creating employee is a nullable, non-owning reference.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Stage of a machine assignment.
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
pub enum AssignmentStatus {
    /// Loaded, washing under way
    #[sea_orm(string_value = "In Progress")]
    #[strum(to_string = "In Progress")]
    InProgress,
    /// Washer finished
    #[sea_orm(string_value = "Washing Done")]
    #[strum(to_string = "Washing Done")]
    WashingDone,
    /// Dryer finished
    #[sea_orm(string_value = "Drying Done")]
    #[strum(to_string = "Drying Done")]
    DryingDone,
    /// Items back out of the machines
    #[sea_orm(string_value = "Completed")]
    Completed,
}

impl AssignmentStatus {
    /// The only stage that may follow this one.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::InProgress => Some(Self::WashingDone),
            Self::WashingDone => Some(Self::DryingDone),
            Self::DryingDone => Some(Self::Completed),
            Self::Completed => None,
        }
    }

    /// Whether `self → next` is a legal move.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        self.next() == Some(next)
    }
}

/// Machine assignment database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "machine_assignments")]
pub struct Model {
    /// Unique identifier for the assignment
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Record whose items are being worked
    pub order_record_id: i64,
    /// Order of that record
    pub order_id: i64,
    /// Employee who made the assignment; cleared when the employee is removed
    pub assigned_by_id: Option<i64>,
    /// Number of the record's items in this load
    pub quantity: i32,
    /// Washing machine identifier
    pub washing_machine: Option<String>,
    /// Drying machine identifier
    pub drying_machine: Option<String>,
    /// Current stage
    pub status: AssignmentStatus,
    /// When the assignment was made
    pub assigned_at: DateTimeUtc,
    /// When the assignment was last modified
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between `MachineAssignment` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each assignment belongs to one record and goes with it
    #[sea_orm(
        belongs_to = "super::order_record::Entity",
        from = "Column::OrderRecordId",
        to = "super::order_record::Column::Id",
        on_delete = "Cascade"
    )]
    OrderRecord,
    /// Each assignment also goes with its order
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id",
        on_delete = "Cascade"
    )]
    Order,
    /// Creating employee; nulled, never cascaded
    #[sea_orm(
        belongs_to = "super::employee::Entity",
        from = "Column::AssignedById",
        to = "super::employee::Column::Id",
        on_delete = "SetNull"
    )]
    AssignedBy,
}

impl Related<super::order_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderRecord.def()
    }
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl Related<super::employee::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AssignedBy.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stages_advance_in_order() {
        assert!(AssignmentStatus::InProgress.can_transition_to(AssignmentStatus::WashingDone));
        assert!(AssignmentStatus::WashingDone.can_transition_to(AssignmentStatus::DryingDone));
        assert!(AssignmentStatus::DryingDone.can_transition_to(AssignmentStatus::Completed));

        assert!(!AssignmentStatus::InProgress.can_transition_to(AssignmentStatus::DryingDone));
        assert!(!AssignmentStatus::Completed.can_transition_to(AssignmentStatus::InProgress));
        assert_eq!(AssignmentStatus::Completed.next(), None);
    }

    #[test]
    fn test_display_matches_stored_value() {
        assert_eq!(AssignmentStatus::InProgress.to_string(), "In Progress");
        assert_eq!(AssignmentStatus::DryingDone.to_string(), "Drying Done");
    }
}
