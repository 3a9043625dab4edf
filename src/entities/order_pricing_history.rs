//! Order pricing history - append-only snapshots of an order's amount.
//!
//! Rows are written once and never updated or deleted. They carry no foreign key
//! to `orders` and outlive the order they describe.

use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Order pricing snapshot
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_pricing_history")]
pub struct Model {
    /// Unique identifier for the snapshot
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Order the snapshot describes
    pub order_id: i64,
    /// Order amount after the change
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub total_price: Decimal,
    /// When the snapshot was taken
    pub created_at: DateTimeUtc,
    /// Who made the change
    pub created_by: String,
    /// Optional reason given for the change
    pub notes: Option<String>,
}

/// Snapshots reference their subject by id only and have no relations
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl super::MoneyScale for Model {
    fn with_money_scale(mut self) -> Self {
        self.total_price = super::at_scale(self.total_price, 2);
        self
    }
}
