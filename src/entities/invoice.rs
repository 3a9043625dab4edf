//! Invoice entity - a billable document over one or more orders.
//!
//! Tax and total are always derived from `subtotal` and `tax_rate` together
//! (see [`Totals`]); they are stored for reporting but never written independently.

use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::FromJsonQueryResult;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Billing status of an invoice.
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
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum InvoiceStatus {
    /// Created, not yet sent to the customer
    #[sea_orm(string_value = "draft")]
    Draft,
    /// Sent, awaiting payment
    #[sea_orm(string_value = "sent")]
    Sent,
    /// Settled
    #[sea_orm(string_value = "paid")]
    Paid,
    /// Past its due date without payment
    #[sea_orm(string_value = "overdue")]
    Overdue,
    /// Voided
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

/// Orders billed by an invoice, stored as a JSON array in billing order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct OrderIds(pub Vec<i64>);

impl OrderIds {
    /// Validates and wraps a list of order ids: non-empty, positive, no repeats.
    ///
    /// # Errors
    /// Returns a description of the first problem found.
    pub fn new(ids: Vec<i64>) -> std::result::Result<Self, String> {
        if ids.is_empty() {
            return Err("at least one order id is required".to_string());
        }
        for (index, id) in ids.iter().enumerate() {
            if *id <= 0 {
                return Err(format!("order id must be positive, got {id}"));
            }
            if ids[..index].contains(id) {
                return Err(format!("order id {id} listed more than once"));
            }
        }
        Ok(Self(ids))
    }

    /// The ids in billing order.
    #[must_use]
    pub fn ids(&self) -> &[i64] {
        &self.0
    }
}

/// Derived money columns of an invoice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Totals {
    /// Sum of invoice record totals
    pub subtotal: Decimal,
    /// `round(subtotal × tax_rate, 2)`
    pub tax_amount: Decimal,
    /// `subtotal + tax_amount`
    pub total: Decimal,
}

impl Totals {
    /// Derives tax and total from a subtotal and a 4-dp tax rate.
    #[must_use]
    pub fn compute(subtotal: Decimal, tax_rate: Decimal) -> Self {
        let subtotal = subtotal.round_dp(2);
        let tax_amount = (subtotal * tax_rate)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        Self {
            subtotal,
            tax_amount,
            total: subtotal + tax_amount,
        }
    }
}

/// Invoice database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "invoices")]
pub struct Model {
    /// Unique identifier for the invoice
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Unique invoice number (e.g. `"INV-20261018-0001"`)
    #[sea_orm(unique)]
    pub invoice_number: String,
    /// Billed customer
    pub customer_id: i64,
    /// Customer name at billing time
    pub customer_name: String,
    /// Orders covered by this invoice
    #[sea_orm(column_type = "Json")]
    pub order_ids: OrderIds,
    /// Date of issue
    pub issue_date: Date,
    /// Sum of the frozen record totals
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub subtotal: Decimal,
    /// Tax rate as a fraction (e.g. `0.0800`)
    #[sea_orm(column_type = "Decimal(Some((5, 4)))")]
    pub tax_rate: Decimal,
    /// Derived tax
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub tax_amount: Decimal,
    /// Derived grand total
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub total: Decimal,
    /// Payment terms in days
    pub payment_terms: i32,
    /// Due date, `issue_date + payment_terms` unless given explicitly
    pub due_date: Date,
    /// Billing status
    pub status: InvoiceStatus,
    /// Date payment was received
    pub payment_date: Option<Date>,
    /// How it was paid (e.g. `"cash"`, `"card"`)
    pub payment_method: Option<String>,
    /// External payment reference
    pub payment_reference: Option<String>,
    /// When the invoice was created
    pub created_at: DateTimeUtc,
    /// When the invoice was last modified
    pub updated_at: DateTimeUtc,
}

impl Model {
    /// The derived money columns as stored.
    #[must_use]
    pub const fn totals(&self) -> Totals {
        Totals {
            subtotal: self.subtotal,
            tax_amount: self.tax_amount,
            total: self.total,
        }
    }
}

/// Defines relationships between Invoice and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each invoice bills one customer
    #[sea_orm(
        belongs_to = "super::customer::Entity",
        from = "Column::CustomerId",
        to = "super::customer::Column::Id"
    )]
    Customer,
    /// One invoice owns many invoice records
    #[sea_orm(has_many = "super::invoice_record::Entity")]
    InvoiceRecords,
}

impl Related<super::customer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

impl Related<super::invoice_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InvoiceRecords.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl super::MoneyScale for Model {
    fn with_money_scale(mut self) -> Self {
        self.subtotal = super::at_scale(self.subtotal, 2);
        self.tax_amount = super::at_scale(self.tax_amount, 2);
        self.total = super::at_scale(self.total, 2);
        self.tax_rate = super::at_scale(self.tax_rate, 4);
        self
    }
}
