//! Shared test utilities for the fulfillment and billing core.
//!
//! This module provides common helper functions for setting up test databases
//! and creating test entities with sensible defaults.

use crate::{
    core::{
        assignment::{self, AssignmentRequest},
        directory, order,
        record::{self, NewRecord},
    },
    entities::{self, MachineAssignment},
    errors::{Error, Result},
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::{DatabaseConnection, EntityTrait};

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = crate::config::database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Routes `tracing` output to the test harness. Safe to call more than once.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("laundry_core=debug")
        .with_test_writer()
        .try_init();
}

/// Fixed calendar date used as "today" in tests: 2026-10-18.
pub fn test_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 18).unwrap_or_default()
}

/// Creates a customer named `"Customer {code}"`.
pub async fn create_test_customer(
    db: &DatabaseConnection,
    code: &str,
) -> Result<entities::customer::Model> {
    directory::create_customer(db, code, &format!("Customer {code}")).await
}

/// Creates an employee.
pub async fn create_test_employee(
    db: &DatabaseConnection,
    name: &str,
) -> Result<entities::employee::Model> {
    directory::create_employee(db, name).await
}

/// Creates an order dated [`test_date`] with no delivery date.
pub async fn create_test_order(
    db: &DatabaseConnection,
    customer_id: i64,
    reference_no: &str,
) -> Result<entities::order::Model> {
    order::create_order(db, customer_id, test_date(), None, reference_no.to_string()).await
}

/// An unpriced record request.
///
/// # Defaults
/// * `wash_type`: "wash-fold"
/// * `process_types`: none
/// * `unit_price`: None
/// * `created_by`: "front-desk"
pub fn new_record(quantity: i32) -> NewRecord {
    NewRecord {
        quantity,
        wash_type: "wash-fold".to_string(),
        process_types: vec![],
        item_type_id: None,
        tracking_number: None,
        unit_price: None,
        created_by: "front-desk".to_string(),
    }
}

/// Adds an unpriced record to an order.
pub async fn create_test_record(
    db: &DatabaseConnection,
    order_id: i64,
    quantity: i32,
) -> Result<entities::order_record::Model> {
    record::add_record(db, order_id, new_record(quantity)).await
}

/// Creates a test database with customer `C-1` and its order `ORD-100`.
pub async fn setup_with_order() -> Result<(
    DatabaseConnection,
    entities::customer::Model,
    entities::order::Model,
)> {
    let db = setup_test_db().await?;
    let customer = create_test_customer(&db, "C-1").await?;
    let order = create_test_order(&db, customer.id, "ORD-100").await?;
    Ok((db, customer, order))
}

/// Like [`setup_with_order`], plus one record priced at `unit_price`.
///
/// The returned order reflects the record's totals.
pub async fn setup_with_record(
    quantity: i32,
    unit_price: Decimal,
) -> Result<(
    DatabaseConnection,
    entities::order::Model,
    entities::order_record::Model,
)> {
    let (db, _, order) = setup_with_order().await?;
    let record = create_test_record(&db, order.id, quantity).await?;
    let record = record::set_record_price(&db, record.id, unit_price, "front-desk", None).await?;
    let order = order::get_order(&db, order.id)
        .await?
        .ok_or_else(|| Error::not_found("order", order.id))?;
    Ok((db, order, record))
}

/// Request to load `quantity` of `record` into machines `W-01` / `D-01`.
pub fn assignment_request(
    record: &entities::order_record::Model,
    employee_id: i64,
    quantity: i32,
) -> AssignmentRequest {
    AssignmentRequest {
        record_id: record.id,
        order_id: record.order_id,
        employee_id,
        quantity,
        washing_machine: Some("W-01".to_string()),
        drying_machine: Some("D-01".to_string()),
    }
}

/// Walks an assignment through every remaining stage up to `Completed`.
pub async fn complete_assignment(
    db: &DatabaseConnection,
    assignment_id: i64,
) -> Result<entities::machine_assignment::Model> {
    let mut current = MachineAssignment::find_by_id(assignment_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("machine assignment", assignment_id))?;
    while let Some(next) = current.status.next() {
        current = assignment::advance_assignment(db, assignment_id, next).await?;
    }
    Ok(current)
}
