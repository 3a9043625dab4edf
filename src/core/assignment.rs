//! Machine assignment tracker - loads part of a record into a washer/dryer pair.
//!
//! The capacity invariant (live assigned quantity never exceeds the record's quantity)
//! is checked and the new assignment inserted inside one serializable transaction, so
//! two concurrent assignments against the same record cannot both pass the check.

use crate::{
    core::{
        order::find_order,
        record::find_record,
        unit_of_work::{begin, with_retry},
    },
    entities::{AssignmentStatus, Employee, MachineAssignment, machine_assignment, order_record},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{IntoActiveModel, QueryOrder, Set, prelude::*, sea_query::Expr};
use tracing::{info, instrument};

/// A request to put some of a record's items into the machines.
#[derive(Debug, Clone)]
pub struct AssignmentRequest {
    /// Record being worked
    pub record_id: i64,
    /// Order the record belongs to
    pub order_id: i64,
    /// Employee making the assignment
    pub employee_id: i64,
    /// Items in this load
    pub quantity: i32,
    /// Washing machine, if already chosen
    pub washing_machine: Option<String>,
    /// Drying machine, if already chosen
    pub drying_machine: Option<String>,
}

/// A machine slot to (re)point an assignment at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Machine {
    /// Replace the washing machine
    Washing(String),
    /// Replace the drying machine
    Drying(String),
}

fn machine_id(id: Option<String>) -> Result<Option<String>> {
    match id.map(|m| m.trim().to_string()) {
        Some(m) if m.is_empty() => Err(Error::InvalidInput {
            message: "Machine identifier cannot be empty".to_string(),
        }),
        other => Ok(other),
    }
}

/// Sum of assignment quantities currently held against a record.
pub(crate) async fn assigned_quantity_in<C>(db: &C, record_id: i64) -> Result<i32>
where
    C: ConnectionTrait,
{
    let assignments = MachineAssignment::find()
        .filter(machine_assignment::Column::OrderRecordId.eq(record_id))
        .all(db)
        .await?;
    assignments.iter().try_fold(0_i32, |acc, a| {
        acc.checked_add(a.quantity)
            .ok_or(Error::InvalidQuantity { quantity: a.quantity })
    })
}

async fn find_assignment<C>(db: &C, assignment_id: i64) -> Result<machine_assignment::Model>
where
    C: ConnectionTrait,
{
    MachineAssignment::find_by_id(assignment_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("machine assignment", assignment_id))
}

fn ensure_open(record: &order_record::Model) -> Result<()> {
    if record.status.is_terminal() {
        return Err(Error::Closed {
            entity: "order record",
            id: record.id,
            status: record.status.to_string(),
        });
    }
    Ok(())
}

/// Assigns part of a record's quantity to machines.
///
/// # Errors
/// * `InvalidQuantity` / `InvalidInput` - bad request data, or the record is not on that order
/// * `NotFound` - record or employee missing
/// * `Closed` - the record is completed or cancelled, or its order is delivered or cancelled
/// * `OverAssignment` - not enough unassigned quantity left on the record
/// * `Conflict` - lost a concurrent race twice
#[instrument(skip(db, request), fields(record_id = request.record_id, quantity = request.quantity))]
pub async fn assign_machine(
    db: &DatabaseConnection,
    request: AssignmentRequest,
) -> Result<machine_assignment::Model> {
    if request.quantity <= 0 {
        return Err(Error::InvalidQuantity {
            quantity: request.quantity,
        });
    }
    let washing_machine = machine_id(request.washing_machine)?;
    let drying_machine = machine_id(request.drying_machine)?;
    let (record_id, order_id, employee_id, quantity) = (
        request.record_id,
        request.order_id,
        request.employee_id,
        request.quantity,
    );
    let washing_machine = washing_machine.as_deref();
    let drying_machine = drying_machine.as_deref();

    let created = with_retry("assign_machine", move || async move {
        let txn = begin(db).await?;

        let record = find_record(&txn, record_id).await?;
        if record.order_id != order_id {
            return Err(Error::InvalidInput {
                message: format!("Record {record_id} does not belong to order {order_id}"),
            });
        }
        ensure_open(&record)?;

        let order = find_order(&txn, order_id).await?;
        if order.status.is_terminal() {
            return Err(Error::Closed {
                entity: "order",
                id: order_id,
                status: order.status.to_string(),
            });
        }

        Employee::find_by_id(employee_id)
            .one(&txn)
            .await?
            .ok_or_else(|| Error::not_found("employee", employee_id))?;

        let assigned = assigned_quantity_in(&txn, record_id).await?;
        let available = record.quantity - assigned;
        if quantity > available {
            return Err(Error::OverAssignment {
                record_id,
                requested: quantity,
                available,
            });
        }

        let now = Utc::now();
        let created = machine_assignment::ActiveModel {
            order_record_id: Set(record_id),
            order_id: Set(order_id),
            assigned_by_id: Set(Some(employee_id)),
            quantity: Set(quantity),
            washing_machine: Set(washing_machine.map(str::to_string)),
            drying_machine: Set(drying_machine.map(str::to_string)),
            status: Set(AssignmentStatus::InProgress),
            assigned_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        Ok(created)
    })
    .await?;

    info!(
        assignment_id = created.id,
        record_id,
        quantity,
        employee_id,
        "Machine assignment created"
    );
    Ok(created)
}

/// Moves an assignment to its next stage.
///
/// Stages run `In Progress → Washing Done → Drying Done → Completed`, one step at a
/// time. The parent record's status is left alone.
///
/// # Errors
/// * `NotFound` - the assignment does not exist
/// * `InvalidTransition` - anything but the next stage
#[instrument(skip(db))]
pub async fn advance_assignment(
    db: &DatabaseConnection,
    assignment_id: i64,
    new_status: AssignmentStatus,
) -> Result<machine_assignment::Model> {
    let updated = with_retry("advance_assignment", move || async move {
        let txn = begin(db).await?;
        let current = find_assignment(&txn, assignment_id).await?;

        if !current.status.can_transition_to(new_status) {
            return Err(Error::InvalidTransition {
                entity: "machine assignment",
                from: current.status.to_string(),
                to: new_status.to_string(),
            });
        }

        let mut active = current.into_active_model();
        active.status = Set(new_status);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        txn.commit().await?;
        Ok(updated)
    })
    .await?;

    info!(assignment_id, status = %updated.status, "Assignment advanced");
    Ok(updated)
}

/// Points an assignment at a different washing or drying machine.
///
/// # Errors
/// * `NotFound` - the assignment does not exist
/// * `Closed` - the assignment is already completed
#[instrument(skip(db))]
pub async fn reassign_machine(
    db: &DatabaseConnection,
    assignment_id: i64,
    machine: Machine,
) -> Result<machine_assignment::Model> {
    let machine = match machine {
        Machine::Washing(id) => Machine::Washing(machine_id(Some(id))?.unwrap_or_default()),
        Machine::Drying(id) => Machine::Drying(machine_id(Some(id))?.unwrap_or_default()),
    };
    let machine = &machine;

    with_retry("reassign_machine", move || async move {
        let txn = begin(db).await?;
        let current = find_assignment(&txn, assignment_id).await?;
        if current.status == AssignmentStatus::Completed {
            return Err(Error::Closed {
                entity: "machine assignment",
                id: assignment_id,
                status: current.status.to_string(),
            });
        }

        let mut active = current.into_active_model();
        match machine {
            Machine::Washing(id) => active.washing_machine = Set(Some(id.clone())),
            Machine::Drying(id) => active.drying_machine = Set(Some(id.clone())),
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        txn.commit().await?;
        info!(assignment_id, ?machine, "Assignment moved to another machine");
        Ok(updated)
    })
    .await
}

/// Clears `assigned_by_id` on every assignment made by an employee.
///
/// Runs against a plain connection or inside a caller's transaction. Assignments
/// are never deleted here.
#[instrument(skip(db))]
pub async fn unassign_employee<C>(db: &C, employee_id: i64) -> Result<u64>
where
    C: ConnectionTrait,
{
    let result = MachineAssignment::update_many()
        .col_expr(
            machine_assignment::Column::AssignedById,
            Expr::value(Option::<i64>::None),
        )
        .col_expr(machine_assignment::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(machine_assignment::Column::AssignedById.eq(employee_id))
        .exec(db)
        .await?;

    info!(
        employee_id,
        cleared = result.rows_affected,
        "Employee detached from assignments"
    );
    Ok(result.rows_affected)
}

/// All assignments of a record in creation order.
pub async fn get_assignments_for_record(
    db: &DatabaseConnection,
    record_id: i64,
) -> Result<Vec<machine_assignment::Model>> {
    MachineAssignment::find()
        .filter(machine_assignment::Column::OrderRecordId.eq(record_id))
        .order_by_asc(machine_assignment::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Quantity of a record currently held by assignments.
pub async fn get_assigned_quantity(db: &DatabaseConnection, record_id: i64) -> Result<i32> {
    assigned_quantity_in(db, record_id).await
}
