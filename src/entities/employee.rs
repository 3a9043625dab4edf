//! Employee entity - staff who create machine assignments.
//!
//! Assignments keep a nullable reference to the employee; deleting an employee
//! clears that reference instead of removing the assignment.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Employee database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "employees")]
pub struct Model {
    /// Unique identifier for the employee
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Full name
    pub name: String,
    /// When the employee was created
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Employee and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One employee has created many assignments
    #[sea_orm(has_many = "super::machine_assignment::Entity")]
    MachineAssignments,
}

impl Related<super::machine_assignment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MachineAssignments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
