//! Order record manager - line items, their prices and fulfillment status.
//!
//! Every price- or quantity-affecting operation follows the same shape inside one
//! transaction: write the record, append a record price snapshot, re-derive the parent
//! order's totals. A failure at any step rolls back all three.

use crate::{
    core::{
        assignment,
        order::{find_order, refresh_totals, refresh_totals_audited},
        pricing::{self, PriceAudit},
        unit_of_work::{begin, with_retry},
    },
    entities::{
        AssignmentStatus, MachineAssignment, MoneyScale, OrderRecord, ProcessTypes,
        RecordStatus, machine_assignment, order_record,
    },
    errors::{Error, Result},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{IntoActiveModel, Set, prelude::*};
use tracing::{info, instrument};

/// Everything needed to add a line to an order.
#[derive(Debug, Clone)]
pub struct NewRecord {
    /// Number of items, must be positive
    pub quantity: i32,
    /// Wash treatment
    pub wash_type: String,
    /// Process-type ids in display order
    pub process_types: Vec<i64>,
    /// Optional item-type lookup reference
    pub item_type_id: Option<i64>,
    /// Optional tag/tracking number
    pub tracking_number: Option<String>,
    /// Initial unit price; `None` leaves the line unpriced at zero
    pub unit_price: Option<Decimal>,
    /// Who is adding the line (recorded if a price is given)
    pub created_by: String,
}

/// Loads a record or fails with `NotFound`.
pub(crate) async fn find_record<C>(db: &C, record_id: i64) -> Result<order_record::Model>
where
    C: ConnectionTrait,
{
    OrderRecord::find_by_id(record_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("order record", record_id))
}

fn normalize_tracking(tracking_number: Option<String>) -> Option<String> {
    tracking_number
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Adds a line to an order and refreshes the order's totals.
///
/// If the line carries a unit price the line is priced immediately and a price
/// snapshot is appended in the same transaction.
///
/// # Errors
/// * `InvalidQuantity` / `InvalidAmount` / `InvalidInput` - bad line data
/// * `NotFound` - the order does not exist
/// * `Closed` - the order is delivered or cancelled
#[instrument(skip(db, line), fields(quantity = line.quantity))]
pub async fn add_record(
    db: &DatabaseConnection,
    order_id: i64,
    line: NewRecord,
) -> Result<order_record::Model> {
    if line.quantity <= 0 {
        return Err(Error::InvalidQuantity {
            quantity: line.quantity,
        });
    }
    let wash_type = line.wash_type.trim().to_string();
    if wash_type.is_empty() {
        return Err(Error::InvalidInput {
            message: "Wash type cannot be empty".to_string(),
        });
    }
    let process_types =
        ProcessTypes::new(line.process_types).map_err(|message| Error::InvalidInput { message })?;
    let unit_price = line.unit_price.map(pricing::validate_amount).transpose()?;
    let audit = match unit_price {
        Some(_) => Some(PriceAudit::new(&line.created_by, Some("initial price"))?),
        None => None,
    };
    let tracking_number = normalize_tracking(line.tracking_number);

    let wash_type = wash_type.as_str();
    let process_types = &process_types;
    let tracking_number = tracking_number.as_deref();
    let quantity = line.quantity;
    let item_type_id = line.item_type_id;

    let created = with_retry("add_record", move || async move {
        let txn = begin(db).await?;
        let order = find_order(&txn, order_id).await?;
        if order.status.is_terminal() {
            return Err(Error::Closed {
                entity: "order",
                id: order_id,
                status: order.status.to_string(),
            });
        }

        let price = unit_price.unwrap_or(Decimal::ZERO);
        let total_price = pricing::line_total(price, quantity)?;
        let now = Utc::now();
        let created = order_record::ActiveModel {
            order_id: Set(order_id),
            quantity: Set(quantity),
            wash_type: Set(wash_type.to_string()),
            process_types: Set(process_types.clone()),
            item_type_id: Set(item_type_id),
            status: Set(RecordStatus::Pending),
            tracking_number: Set(tracking_number.map(str::to_string)),
            unit_price: Set(price),
            total_price: Set(total_price),
            paid: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        match audit {
            Some(audit) => {
                pricing::snapshot_record(&txn, &created, audit).await?;
                refresh_totals_audited(&txn, order_id, audit).await?;
            }
            None => {
                refresh_totals(&txn, order_id).await?;
            }
        }

        txn.commit().await?;
        Ok(created)
    })
    .await?;

    info!(order_id, record_id = created.id, "Record added");
    Ok(created.with_money_scale())
}

/// Finds a record by id.
pub async fn get_record(
    db: &DatabaseConnection,
    record_id: i64,
) -> Result<Option<order_record::Model>> {
    OrderRecord::find_by_id(record_id)
        .one(db)
        .await
        .map(MoneyScale::with_money_scale)
        .map_err(Into::into)
}

/// Sets a record's unit price, derives its total, snapshots it and refreshes the order.
///
/// # Errors
/// * `InvalidAmount` - negative price
/// * `InvalidInput` - blank actor
/// * `NotFound` - the record does not exist
#[instrument(skip(db))]
pub async fn set_record_price(
    db: &DatabaseConnection,
    record_id: i64,
    unit_price: Decimal,
    actor: &str,
    note: Option<&str>,
) -> Result<order_record::Model> {
    let unit_price = pricing::validate_amount(unit_price)?;
    let audit = PriceAudit::new(actor, note)?;

    let updated = with_retry("set_record_price", move || async move {
        let txn = begin(db).await?;
        let current = find_record(&txn, record_id).await?;
        let order_id = current.order_id;
        let total_price = pricing::line_total(unit_price, current.quantity)?;

        let mut active = current.into_active_model();
        active.unit_price = Set(unit_price);
        active.total_price = Set(total_price);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        pricing::snapshot_record(&txn, &updated, audit).await?;
        refresh_totals_audited(&txn, order_id, audit).await?;

        txn.commit().await?;
        Ok(updated)
    })
    .await?;

    info!(
        record_id,
        unit_price = %updated.unit_price,
        total_price = %updated.total_price,
        actor = audit.actor,
        "Record price set"
    );
    Ok(updated.with_money_scale())
}

/// Changes a record's quantity, re-deriving its total price.
///
/// # Errors
/// * `InvalidQuantity` - zero or negative quantity
/// * `OverAssignment` - the new quantity is below what is already in the machines
/// * `Closed` - the record is completed or cancelled
#[instrument(skip(db))]
pub async fn set_record_quantity(
    db: &DatabaseConnection,
    record_id: i64,
    quantity: i32,
    actor: &str,
    note: Option<&str>,
) -> Result<order_record::Model> {
    if quantity <= 0 {
        return Err(Error::InvalidQuantity { quantity });
    }
    let audit = PriceAudit::new(actor, note)?;

    let updated = with_retry("set_record_quantity", move || async move {
        let txn = begin(db).await?;
        let current = find_record(&txn, record_id).await?;
        if current.status.is_terminal() {
            return Err(Error::Closed {
                entity: "order record",
                id: record_id,
                status: current.status.to_string(),
            });
        }

        let assigned = assignment::assigned_quantity_in(&txn, record_id).await?;
        if quantity < assigned {
            return Err(Error::OverAssignment {
                record_id,
                requested: assigned,
                available: quantity,
            });
        }

        let order_id = current.order_id;
        let total_price = pricing::line_total(current.unit_price, quantity)?;
        let mut active = current.into_active_model();
        active.quantity = Set(quantity);
        active.total_price = Set(total_price);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        pricing::snapshot_record(&txn, &updated, audit).await?;
        refresh_totals_audited(&txn, order_id, audit).await?;

        txn.commit().await?;
        Ok(updated)
    })
    .await?;

    info!(record_id, quantity, "Record quantity changed");
    Ok(updated.with_money_scale())
}

/// Sets or clears a record's tracking number. Blank values clear it.
///
/// # Errors
/// `NotFound` if the record does not exist.
#[instrument(skip(db))]
pub async fn set_record_tracking_number(
    db: &DatabaseConnection,
    record_id: i64,
    tracking_number: Option<String>,
) -> Result<order_record::Model> {
    let tracking_number = normalize_tracking(tracking_number);
    let tracking_number = tracking_number.as_deref();

    with_retry("set_record_tracking_number", move || async move {
        let txn = begin(db).await?;
        let current = find_record(&txn, record_id).await?;

        let mut active = current.into_active_model();
        active.tracking_number = Set(tracking_number.map(str::to_string));
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        txn.commit().await?;
        Ok(updated)
    })
    .await
    .map(MoneyScale::with_money_scale)
}

/// Moves a record to a new status.
///
/// Completion is refused while any of the record's assignments is not `Completed`.
/// Completing the last assignment never completes the record by itself.
///
/// # Errors
/// * `NotFound` - the record does not exist
/// * `InvalidTransition` - backward or skipping move, or leaving a terminal state
/// * `AssignmentsIncomplete` - completing with machine work still open
#[instrument(skip(db))]
pub async fn set_record_status(
    db: &DatabaseConnection,
    record_id: i64,
    new_status: RecordStatus,
) -> Result<order_record::Model> {
    let updated = with_retry("set_record_status", move || async move {
        let txn = begin(db).await?;
        let current = find_record(&txn, record_id).await?;

        if !current.status.can_transition_to(new_status) {
            return Err(Error::InvalidTransition {
                entity: "order record",
                from: current.status.to_string(),
                to: new_status.to_string(),
            });
        }

        if new_status == RecordStatus::Completed {
            let pending = MachineAssignment::find()
                .filter(machine_assignment::Column::OrderRecordId.eq(record_id))
                .filter(machine_assignment::Column::Status.ne(AssignmentStatus::Completed))
                .count(&txn)
                .await?;
            if pending > 0 {
                return Err(Error::AssignmentsIncomplete {
                    record_id,
                    pending: usize::try_from(pending).unwrap_or(usize::MAX),
                });
            }
        }

        let mut active = current.into_active_model();
        active.status = Set(new_status);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        txn.commit().await?;
        Ok(updated)
    })
    .await?;

    info!(record_id, status = %updated.status, "Record status changed");
    Ok(updated.with_money_scale())
}

/// Deletes a record and its machine assignments, then refreshes the order's totals.
///
/// # Errors
/// * `NotFound` - the record does not exist
#[instrument(skip(db))]
pub async fn delete_record(db: &DatabaseConnection, record_id: i64) -> Result<()> {
    let (order_id, assignments) = with_retry("delete_record", move || async move {
        let txn = begin(db).await?;
        let record = find_record(&txn, record_id).await?;
        let order_id = record.order_id;

        let assignments = MachineAssignment::delete_many()
            .filter(machine_assignment::Column::OrderRecordId.eq(record_id))
            .exec(&txn)
            .await?
            .rows_affected;
        record.delete(&txn).await?;
        refresh_totals(&txn, order_id).await?;

        txn.commit().await?;
        Ok((order_id, assignments))
    })
    .await?;

    info!(order_id, record_id, assignments, "Record deleted");
    Ok(())
}
