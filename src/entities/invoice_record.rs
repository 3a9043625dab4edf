//! Invoice record entity - a billing-time copy of one order record's price.
//!
//! The prices here are frozen when the invoice is created. The order and record ids
//! are plain references: later edits to, or deletion of, the live record never
//! change an issued invoice.

use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Invoice record database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "invoice_records")]
pub struct Model {
    /// Unique identifier for the invoice record
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning invoice
    pub invoice_id: i64,
    /// Billed order
    pub order_id: i64,
    /// Billed order record
    pub order_record_id: i64,
    /// Quantity billed
    pub quantity: i32,
    /// Unit price at billing time
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub unit_price: Decimal,
    /// Total price at billing time
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub total_price: Decimal,
    /// When the line was billed
    pub created_at: DateTimeUtc,
}

/// Defines relationships between `InvoiceRecord` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each line belongs to one invoice and goes with it
    #[sea_orm(
        belongs_to = "super::invoice::Entity",
        from = "Column::InvoiceId",
        to = "super::invoice::Column::Id",
        on_delete = "Cascade"
    )]
    Invoice,
}

impl Related<super::invoice::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Invoice.def()
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
