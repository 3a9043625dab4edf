//! Customer entity - the external identity orders and invoices are billed to.
//!
//! Customers are maintained by the surrounding CRUD layer; the core only needs
//! a stable id, a unique code and a display name to denormalize onto invoices.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Customer database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "customers")]
pub struct Model {
    /// Unique identifier for the customer
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Unique external customer code (e.g. `"CUST-0042"`)
    #[sea_orm(unique)]
    pub code: String,
    /// Display name, copied onto invoices at billing time
    pub name: String,
    /// When the customer was created
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Customer and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One customer has many orders
    #[sea_orm(has_many = "super::order::Entity")]
    Orders,
    /// One customer has many invoices
    #[sea_orm(has_many = "super::invoice::Entity")]
    Invoices,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Orders.def()
    }
}

impl Related<super::invoice::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Invoices.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
