//! Order aggregate - creation, lifecycle, derived totals and cascade delete.
//!
//! An order's `quantity` and `amount` are never maintained incrementally. Every record
//! mutation calls `refresh_totals` inside its own transaction, which re-sums the
//! order's records and writes the result back; [`recompute_order_totals`] exposes the
//! same step on its own.

use crate::{
    core::{
        pricing::{self, PriceAudit},
        unit_of_work::{begin, with_retry},
    },
    entities::{
        Customer, MachineAssignment, MoneyScale, Order, OrderRecord, OrderStatus,
        machine_assignment, order, order_record,
    },
    errors::{Error, Result},
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{Condition, IntoActiveModel, QueryOrder, Set, prelude::*};
use tracing::{debug, info, instrument};

/// Loads an order or fails with `NotFound`.
pub(crate) async fn find_order<C>(db: &C, order_id: i64) -> Result<order::Model>
where
    C: ConnectionTrait,
{
    Order::find_by_id(order_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("order", order_id))
}

/// Re-derives `quantity` and `amount` from the order's records and writes them back.
///
/// Returns the order before and after the write. Idempotent: running it twice in a row
/// changes nothing the second time. Fails with `InvalidQuantity` / `InvalidAmount` when
/// a total would overflow, leaving the caller's transaction to roll back.
pub(crate) async fn refresh_totals<C>(
    db: &C,
    order_id: i64,
) -> Result<(order::Model, order::Model)>
where
    C: ConnectionTrait,
{
    let before = find_order(db, order_id).await?;
    let records = OrderRecord::find()
        .filter(order_record::Column::OrderId.eq(order_id))
        .all(db)
        .await?;

    let quantity = records.iter().try_fold(0_i32, |acc, r| {
        acc.checked_add(r.quantity)
            .ok_or(Error::InvalidQuantity { quantity: r.quantity })
    })?;
    let amount = pricing::checked_sum(records.iter().map(|r| r.total_price))?;

    if before.quantity == quantity && before.amount == amount {
        debug!(order_id, quantity, amount = %amount, "Order totals already current");
        return Ok((before.clone(), before));
    }

    let mut active = before.clone().into_active_model();
    active.quantity = Set(quantity);
    active.amount = Set(amount);
    active.updated_at = Set(Utc::now());
    let after = active.update(db).await?;

    debug!(
        order_id,
        quantity,
        amount = %amount,
        previous_amount = %before.amount,
        "Order totals recomputed"
    );
    Ok((before, after))
}

/// Like [`refresh_totals`], and appends an order-level snapshot if the amount moved.
pub(crate) async fn refresh_totals_audited<C>(
    db: &C,
    order_id: i64,
    audit: PriceAudit<'_>,
) -> Result<order::Model>
where
    C: ConnectionTrait,
{
    let (before, after) = refresh_totals(db, order_id).await?;
    if before.amount != after.amount {
        pricing::snapshot_order(db, order_id, after.amount, audit).await?;
    }
    Ok(after)
}

/// Creates a new pending order for an existing customer.
///
/// # Errors
/// * `InvalidInput` - blank reference, or delivery date before the order date
/// * `NotFound` - the customer does not exist
/// * `DuplicateReference` - `reference_no` is already used by another order
#[instrument(skip(db))]
pub async fn create_order(
    db: &DatabaseConnection,
    customer_id: i64,
    order_date: NaiveDate,
    delivery_date: Option<NaiveDate>,
    reference_no: String,
) -> Result<order::Model> {
    let reference_no = reference_no.trim().to_string();
    if reference_no.is_empty() {
        return Err(Error::InvalidInput {
            message: "Order reference cannot be empty".to_string(),
        });
    }
    if delivery_date.is_some_and(|d| d < order_date) {
        return Err(Error::InvalidInput {
            message: "Delivery date cannot be before the order date".to_string(),
        });
    }

    let reference_no = reference_no.as_str();
    let created = with_retry("create_order", move || async move {
        let txn = begin(db).await?;

        Customer::find_by_id(customer_id)
            .one(&txn)
            .await?
            .ok_or_else(|| Error::not_found("customer", customer_id))?;

        let taken = Order::find()
            .filter(order::Column::ReferenceNo.eq(reference_no))
            .count(&txn)
            .await?;
        if taken > 0 {
            return Err(Error::DuplicateReference {
                entity: "order",
                reference: reference_no.to_string(),
            });
        }

        let now = Utc::now();
        let created = order::ActiveModel {
            reference_no: Set(reference_no.to_string()),
            customer_id: Set(customer_id),
            order_date: Set(order_date),
            delivery_date: Set(delivery_date),
            quantity: Set(0),
            status: Set(OrderStatus::Pending),
            amount: Set(Decimal::ZERO),
            paid: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| Error::from_insert(e, "order", reference_no))?;

        txn.commit().await?;
        Ok(created)
    })
    .await?;

    info!(order_id = created.id, reference_no, "Order created");
    Ok(created.with_money_scale())
}

/// Finds an order by id.
pub async fn get_order(db: &DatabaseConnection, order_id: i64) -> Result<Option<order::Model>> {
    Order::find_by_id(order_id)
        .one(db)
        .await
        .map(MoneyScale::with_money_scale)
        .map_err(Into::into)
}

/// Finds an order by its unique reference.
pub async fn get_order_by_reference(
    db: &DatabaseConnection,
    reference_no: &str,
) -> Result<Option<order::Model>> {
    Order::find()
        .filter(order::Column::ReferenceNo.eq(reference_no))
        .one(db)
        .await
        .map(MoneyScale::with_money_scale)
        .map_err(Into::into)
}

/// All records of an order in creation order.
pub async fn get_order_records(
    db: &DatabaseConnection,
    order_id: i64,
) -> Result<Vec<order_record::Model>> {
    OrderRecord::find()
        .filter(order_record::Column::OrderId.eq(order_id))
        .order_by_asc(order_record::Column::Id)
        .all(db)
        .await
        .map(MoneyScale::with_money_scale)
        .map_err(Into::into)
}

/// Re-derives the order's quantity and amount from its records.
///
/// Safe to call at any time; record operations already call it for you.
#[instrument(skip(db))]
pub async fn recompute_order_totals(
    db: &DatabaseConnection,
    order_id: i64,
) -> Result<order::Model> {
    with_retry("recompute_order_totals", move || async move {
        let txn = begin(db).await?;
        let (_, after) = refresh_totals(&txn, order_id).await?;
        txn.commit().await?;
        Ok(after)
    })
    .await
    .map(MoneyScale::with_money_scale)
}

/// Moves an order to a new status.
///
/// # Errors
/// * `NotFound` - the order does not exist
/// * `InvalidTransition` - not a single forward step, or cancelling a terminal order
#[instrument(skip(db))]
pub async fn set_order_status(
    db: &DatabaseConnection,
    order_id: i64,
    new_status: OrderStatus,
) -> Result<order::Model> {
    let updated = with_retry("set_order_status", move || async move {
        let txn = begin(db).await?;
        let current = find_order(&txn, order_id).await?;

        if !current.status.can_transition_to(new_status) {
            return Err(Error::InvalidTransition {
                entity: "order",
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

    info!(order_id, status = %updated.status, "Order status changed");
    Ok(updated.with_money_scale())
}

/// Sets or clears the order's paid flag.
#[instrument(skip(db))]
pub async fn set_order_paid(
    db: &DatabaseConnection,
    order_id: i64,
    paid: bool,
) -> Result<order::Model> {
    let updated = with_retry("set_order_paid", move || async move {
        let txn = begin(db).await?;
        let current = find_order(&txn, order_id).await?;

        let mut active = current.into_active_model();
        active.paid = Set(paid);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        txn.commit().await?;
        Ok(updated)
    })
    .await?;

    info!(order_id, paid, "Order paid flag set");
    Ok(updated.with_money_scale())
}

/// Overrides the order amount directly, recording who did it and why.
///
/// The override and its history row are written in one transaction. A later
/// [`recompute_order_totals`] (or any record price change) re-derives the amount
/// from the records again.
#[instrument(skip(db))]
pub async fn override_order_amount(
    db: &DatabaseConnection,
    order_id: i64,
    amount: Decimal,
    actor: &str,
    note: Option<&str>,
) -> Result<order::Model> {
    let amount = pricing::validate_amount(amount)?;
    let audit = PriceAudit::new(actor, note)?;

    let updated = with_retry("override_order_amount", move || async move {
        let txn = begin(db).await?;
        let current = find_order(&txn, order_id).await?;

        let mut active = current.into_active_model();
        active.amount = Set(amount);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;
        pricing::snapshot_order(&txn, order_id, amount, audit).await?;

        txn.commit().await?;
        Ok(updated)
    })
    .await?;

    info!(order_id, amount = %amount, actor = audit.actor, "Order amount overridden");
    Ok(updated.with_money_scale())
}

/// Deletes an order with all of its records and their machine assignments.
///
/// Assignments go first, then records, then the order row, all in one transaction.
/// Pricing history is kept.
///
/// # Errors
/// * `NotFound` - the order does not exist
#[instrument(skip(db))]
pub async fn delete_order(db: &DatabaseConnection, order_id: i64) -> Result<()> {
    let (assignments, records) = with_retry("delete_order", move || async move {
        let txn = begin(db).await?;
        let order = find_order(&txn, order_id).await?;

        let record_ids: Vec<i64> = OrderRecord::find()
            .filter(order_record::Column::OrderId.eq(order_id))
            .all(&txn)
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();

        let assignments = MachineAssignment::delete_many()
            .filter(
                Condition::any()
                    .add(machine_assignment::Column::OrderId.eq(order_id))
                    .add(machine_assignment::Column::OrderRecordId.is_in(record_ids)),
            )
            .exec(&txn)
            .await?
            .rows_affected;
        let records = OrderRecord::delete_many()
            .filter(order_record::Column::OrderId.eq(order_id))
            .exec(&txn)
            .await?
            .rows_affected;
        order.delete(&txn).await?;

        txn.commit().await?;
        Ok((assignments, records))
    })
    .await?;

    info!(order_id, records, assignments, "Order deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::{assignment, record};
    use crate::entities::{OrderPricingHistory, RecordStatus};
    use crate::test_utils::*;
    use rust_decimal_macros::dec;
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[tokio::test]
    async fn test_create_order_validation() -> Result<()> {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();
        let date = test_date();

        let result = create_order(&db, 1, date, None, "   ".to_string()).await;
        assert!(matches!(result, Err(Error::InvalidInput { .. })));

        let before = date.pred_opt().unwrap();
        let result = create_order(&db, 1, date, Some(before), "ORD-1".to_string()).await;
        assert!(matches!(result, Err(Error::InvalidInput { .. })));

        Ok(())
    }

    #[tokio::test]
    async fn test_create_order_integration() -> Result<()> {
        let db = setup_test_db().await?;
        let customer = create_test_customer(&db, "C-1").await?;

        let order = create_test_order(&db, customer.id, "ORD-100").await?;

        assert_eq!(order.reference_no, "ORD-100");
        assert_eq!(order.customer_id, customer.id);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.quantity, 0);
        assert_eq!(order.amount, Decimal::ZERO);
        assert!(!order.paid);

        let found = get_order_by_reference(&db, "ORD-100").await?.unwrap();
        assert_eq!(found, order);
        Ok(())
    }

    #[tokio::test]
    async fn test_create_order_duplicate_reference() -> Result<()> {
        let (db, customer, _) = setup_with_order().await?;

        let result = create_order(&db, customer.id, test_date(), None, "ORD-100".to_string()).await;
        assert!(matches!(
            result,
            Err(Error::DuplicateReference { entity: "order", .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_create_order_unknown_customer() -> Result<()> {
        let db = setup_test_db().await?;

        let result = create_order(&db, 404, test_date(), None, "ORD-1".to_string()).await;
        assert!(matches!(
            result,
            Err(Error::NotFound { entity: "customer", .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_totals_follow_record_mutations() -> Result<()> {
        let (db, _, order) = setup_with_order().await?;

        let first = create_test_record(&db, order.id, 10).await?;
        let second = create_test_record(&db, order.id, 4).await?;
        record::set_record_price(&db, first.id, dec!(5.00), "clerk", None).await?;
        record::set_record_price(&db, second.id, dec!(2.50), "clerk", None).await?;

        let order = get_order(&db, order.id).await?.unwrap();
        assert_eq!(order.quantity, 14);
        assert_eq!(order.amount, dec!(60.00));

        record::delete_record(&db, second.id).await?;
        let order = get_order(&db, order.id).await?.unwrap();
        assert_eq!(order.quantity, 10);
        assert_eq!(order.amount, dec!(50.00));

        // Recompute is idempotent
        let again = recompute_order_totals(&db, order.id).await?;
        assert_eq!(again, order);
        Ok(())
    }

    #[tokio::test]
    async fn test_status_walks_forward_only() -> Result<()> {
        let (db, _, order) = setup_with_order().await?;

        let result = set_order_status(&db, order.id, OrderStatus::Ready).await;
        assert!(matches!(result, Err(Error::InvalidTransition { .. })));

        set_order_status(&db, order.id, OrderStatus::Processing).await?;
        set_order_status(&db, order.id, OrderStatus::Ready).await?;
        let delivered = set_order_status(&db, order.id, OrderStatus::Delivered).await?;
        assert_eq!(delivered.status, OrderStatus::Delivered);

        let result = set_order_status(&db, order.id, OrderStatus::Cancelled).await;
        assert!(matches!(result, Err(Error::InvalidTransition { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_from_processing() -> Result<()> {
        let (db, _, order) = setup_with_order().await?;

        set_order_status(&db, order.id, OrderStatus::Processing).await?;
        let cancelled = set_order_status(&db, order.id, OrderStatus::Cancelled).await?;
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        Ok(())
    }

    #[tokio::test]
    async fn test_override_amount_is_audited() -> Result<()> {
        let (db, _, order) = setup_with_order().await?;

        let updated =
            override_order_amount(&db, order.id, dec!(42.00), "manager", Some("goodwill")).await?;
        assert_eq!(updated.amount, dec!(42.00));

        let history = pricing::get_order_price_history(&db, order.id).await?;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].total_price, dec!(42.00));
        assert_eq!(history[0].created_by, "manager");
        assert_eq!(history[0].notes.as_deref(), Some("goodwill"));

        // Recompute goes back to the derived value
        let recomputed = recompute_order_totals(&db, order.id).await?;
        assert_eq!(recomputed.amount, Decimal::ZERO);
        Ok(())
    }

    #[tokio::test]
    async fn test_set_order_paid() -> Result<()> {
        let (db, _, order) = setup_with_order().await?;

        let paid = set_order_paid(&db, order.id, true).await?;
        assert!(paid.paid);
        let unpaid = set_order_paid(&db, order.id, false).await?;
        assert!(!unpaid.paid);
        assert_eq!(unpaid.amount, order.amount);

        let result = set_order_paid(&db, 999, true).await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_order_cascades() -> Result<()> {
        let (db, _, order) = setup_with_order().await?;
        let employee = create_test_employee(&db, "Dana").await?;

        let first = create_test_record(&db, order.id, 6).await?;
        let second = create_test_record(&db, order.id, 3).await?;
        record::set_record_price(&db, first.id, dec!(1.00), "clerk", None).await?;
        assignment::assign_machine(&db, assignment_request(&first, employee.id, 4)).await?;
        assignment::assign_machine(&db, assignment_request(&second, employee.id, 3)).await?;

        // A second order must be left alone
        let other = create_test_order(&db, order.customer_id, "ORD-200").await?;
        let kept = create_test_record(&db, other.id, 2).await?;
        assignment::assign_machine(&db, assignment_request(&kept, employee.id, 2)).await?;

        delete_order(&db, order.id).await?;

        assert!(get_order(&db, order.id).await?.is_none());
        assert!(get_order_records(&db, order.id).await?.is_empty());
        let orphans = MachineAssignment::find()
            .filter(machine_assignment::Column::OrderId.eq(order.id))
            .count(&db)
            .await?;
        assert_eq!(orphans, 0);

        assert_eq!(get_order_records(&db, other.id).await?.len(), 1);
        assert_eq!(assignment::get_assignments_for_record(&db, kept.id).await?.len(), 1);
        assert_eq!(
            record::get_record(&db, kept.id).await?.unwrap().status,
            RecordStatus::Pending
        );

        // The audit trail survives the order
        let history = pricing::get_record_price_history(&db, first.id).await?;
        assert_eq!(history.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_missing_order() -> Result<()> {
        let db = setup_test_db().await?;

        let result = delete_order(&db, 12).await;
        assert!(matches!(result, Err(Error::NotFound { entity: "order", .. })));
        assert_eq!(OrderPricingHistory::find().count(&db).await?, 0);
        Ok(())
    }
}
