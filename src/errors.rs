//! Unified error type for the fulfillment and billing core.
//!
//! Every operation returns [`Result`]. Domain failures are structured variants the calling
//! layer can match on; store failures are wrapped in [`Error::Database`].

use rust_decimal::Decimal;
use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

/// All error kinds surfaced by the core.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be read or parsed
    #[error("Configuration error: {message}")]
    Config {
        /// Human-readable description of the problem
        message: String,
    },

    /// Underlying store error that is not a domain outcome
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    /// Referenced entity does not exist
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind, e.g. `"order"`
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// A unique reference (order reference, invoice number, customer code) is already taken
    #[error("{entity} reference '{reference}' already exists")]
    DuplicateReference {
        /// Entity kind owning the unique column
        entity: &'static str,
        /// The conflicting value
        reference: String,
    },

    /// Illegal status move
    #[error("Invalid {entity} transition from {from} to {to}")]
    InvalidTransition {
        /// Entity kind whose status was changed
        entity: &'static str,
        /// Current status
        from: String,
        /// Requested status
        to: String,
    },

    /// Assigning this quantity would exceed the record's unassigned quantity
    #[error("Record {record_id}: requested {requested} but only {available} unassigned")]
    OverAssignment {
        /// Record being assigned
        record_id: i64,
        /// Quantity asked for
        requested: i32,
        /// Quantity still free on the record
        available: i32,
    },

    /// A record cannot complete while some of its assignments are still running
    #[error("Record {record_id} has {pending} assignment(s) not yet completed")]
    AssignmentsIncomplete {
        /// Record whose completion was refused
        record_id: i64,
        /// Number of non-completed assignments
        pending: usize,
    },

    /// None of the requested orders has a live, non-cancelled record
    #[error("No billable records found for orders {order_ids:?}")]
    NoBillableRecords {
        /// Orders that were asked to be invoiced
        order_ids: Vec<i64>,
    },

    /// Invoice has already been settled
    #[error("Invoice {invoice_id} is already paid")]
    AlreadyPaid {
        /// Invoice id
        invoice_id: i64,
    },

    /// Transaction lost a race and the single automatic retry lost it too
    #[error("Conflicting concurrent update during {operation}; please retry")]
    Conflict {
        /// Operation that was attempted
        operation: &'static str,
    },

    /// Monetary value is negative or out of range
    #[error("Invalid amount: {amount}")]
    InvalidAmount {
        /// The rejected amount
        amount: Decimal,
    },

    /// Quantity must be strictly positive
    #[error("Invalid quantity: {quantity}")]
    InvalidQuantity {
        /// The rejected quantity
        quantity: i32,
    },

    /// Input that fails a boundary check other than amount or quantity
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// What was wrong
        message: String,
    },

    /// The aggregate is in a terminal state and can no longer be changed
    #[error("{entity} {id} is {status} and can no longer be modified")]
    Closed {
        /// Entity kind
        entity: &'static str,
        /// Entity id
        id: i64,
        /// Terminal status it is in
        status: String,
    },

    /// Order belongs to a different customer than the invoice
    #[error("Order {order_id} does not belong to customer {customer_id}")]
    CustomerMismatch {
        /// Offending order
        order_id: i64,
        /// Customer being invoiced
        customer_id: i64,
    },

    /// I/O failure (config files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for [`Error::NotFound`].
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether this failure is store contention worth one more attempt.
    ///
    /// Covers SQLite busy/locked errors and Postgres serialization failures and deadlocks.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        let Self::Database(err) = self else {
            return false;
        };
        let text = err.to_string().to_lowercase();
        [
            "database is locked",
            "database table is locked",
            "database is busy",
            "could not serialize access",
            "deadlock detected",
            "40001",
            "40p01",
        ]
        .iter()
        .any(|needle| text.contains(needle))
    }

    /// Maps a unique-constraint violation on insert to [`Error::DuplicateReference`].
    pub(crate) fn from_insert(err: DbErr, entity: &'static str, reference: &str) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => Self::DuplicateReference {
                entity,
                reference: reference.to_string(),
            },
            _ => Self::Database(err),
        }
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
