//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

use rust_decimal::Decimal;

pub mod customer;
pub mod employee;
pub mod invoice;
pub mod invoice_record;
pub mod machine_assignment;
pub mod order;
pub mod order_pricing_history;
pub mod order_record;
pub mod record_pricing_history;

// Re-export specific types to avoid conflicts
pub use customer::{Column as CustomerColumn, Entity as Customer, Model as CustomerModel};
pub use employee::{Column as EmployeeColumn, Entity as Employee, Model as EmployeeModel};
pub use invoice::{
    Column as InvoiceColumn, Entity as Invoice, InvoiceStatus, Model as InvoiceModel, OrderIds,
};
pub use invoice_record::{
    Column as InvoiceRecordColumn, Entity as InvoiceRecord, Model as InvoiceRecordModel,
};
pub use machine_assignment::{
    AssignmentStatus, Column as MachineAssignmentColumn, Entity as MachineAssignment,
    Model as MachineAssignmentModel,
};
pub use order::{Column as OrderColumn, Entity as Order, Model as OrderModel, OrderStatus};
pub use order_pricing_history::{
    Column as OrderPricingHistoryColumn, Entity as OrderPricingHistory,
    Model as OrderPricingHistoryModel,
};
pub use order_record::{
    Column as OrderRecordColumn, Entity as OrderRecord, Model as OrderRecordModel, ProcessTypes,
    RecordStatus,
};
pub use record_pricing_history::{
    Column as RecordPricingHistoryColumn, Entity as RecordPricingHistory,
    Model as RecordPricingHistoryModel,
};

/// Restores the fixed scale of money columns after a round trip through the store.
///
/// Some backends (`SQLite`) hand decimals back at their shortest scale, so `0.30` reads
/// as `0.3`. Models returned by the core go through this before leaving it.
pub trait MoneyScale: Sized {
    /// The model with every money column at its declared scale.
    #[must_use]
    fn with_money_scale(self) -> Self;
}

impl<T: MoneyScale> MoneyScale for Option<T> {
    fn with_money_scale(self) -> Self {
        self.map(MoneyScale::with_money_scale)
    }
}

impl<T: MoneyScale> MoneyScale for Vec<T> {
    fn with_money_scale(self) -> Self {
        self.into_iter().map(MoneyScale::with_money_scale).collect()
    }
}

/// `amount` at exactly `scale` decimal places.
pub(crate) fn at_scale(mut amount: Decimal, scale: u32) -> Decimal {
    amount.rescale(scale);
    amount
}
