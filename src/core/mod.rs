//! Core business logic for order fulfillment and billing.
//!
//! Every public operation is one unit of work against the store. Anything that reads
//! before it writes opens its own transaction, checks its invariants inside it and
//! commits or rolls back as a whole. Single-statement writes (`create_customer`,
//! `create_employee`, `mark_overdue_invoices`) rely on the statement's own atomicity,
//! and `unassign_employee` runs inside whatever connection or transaction it is given.

pub mod assignment;
pub mod directory;
pub mod invoice;
pub mod order;
pub mod pricing;
pub mod record;
pub(crate) mod unit_of_work;
