//! Invoice aggregate - bills one or more orders of a customer.
//!
//! Creating an invoice copies each billable record's current price into an invoice
//! record. Those copies are never touched again; later price edits and deletes on the
//! live records do not reach an issued invoice, and deleting an invoice leaves the
//! billed orders' prices alone.

use crate::{
    config::billing::BillingConfig,
    core::{
        order::find_order,
        pricing,
        unit_of_work::{begin, with_retry},
    },
    entities::{
        Customer, Invoice, InvoiceRecord, InvoiceStatus, MoneyScale, Order, OrderIds,
        OrderRecord, OrderStatus, RecordStatus, invoice, invoice::Totals, invoice_record, order,
        order_record,
    },
    errors::{Error, Result},
};
use chrono::{Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{IntoActiveModel, QueryOrder, QuerySelect, Set, prelude::*, sea_query::Expr};
use tracing::{debug, info, instrument, warn};

/// Input to [`create_invoice`].
#[derive(Debug, Clone)]
pub struct NewInvoice {
    /// Customer being billed
    pub customer_id: i64,
    /// Orders to bill, in billing order
    pub order_ids: Vec<i64>,
    /// Tax rate as a fraction, `0 ..= 1`
    pub tax_rate: Decimal,
    /// Days until payment is due
    pub payment_terms: i32,
    /// Issue date, today when absent
    pub issue_date: Option<NaiveDate>,
    /// Explicit due date, `issue_date + payment_terms` when absent
    pub due_date: Option<NaiveDate>,
}

impl NewInvoice {
    /// An invoice request using the configured tax rate and payment terms.
    #[must_use]
    pub fn with_defaults(config: &BillingConfig, customer_id: i64, order_ids: Vec<i64>) -> Self {
        Self {
            customer_id,
            order_ids,
            tax_rate: config.default_tax_rate,
            payment_terms: config.default_payment_terms,
            issue_date: None,
            due_date: None,
        }
    }
}

fn due_date(issue_date: NaiveDate, payment_terms: i32) -> Result<NaiveDate> {
    u64::try_from(payment_terms)
        .ok()
        .and_then(|days| issue_date.checked_add_days(Days::new(days)))
        .ok_or_else(|| Error::InvalidInput {
            message: format!("Payment terms of {payment_terms} days are out of range"),
        })
}

/// Next free invoice number for the given prefix and issue date.
async fn next_invoice_number<C>(db: &C, prefix: &str, issue_date: NaiveDate) -> Result<String>
where
    C: ConnectionTrait,
{
    let stem = format!("{prefix}-{}-", issue_date.format("%Y%m%d"));
    let issued: Vec<String> = Invoice::find()
        .select_only()
        .column(invoice::Column::InvoiceNumber)
        .filter(invoice::Column::InvoiceNumber.starts_with(&stem))
        .into_tuple()
        .all(db)
        .await?;

    let last = issued
        .iter()
        .filter_map(|number| number.strip_prefix(&stem)?.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    Ok(format!("{stem}{:04}", last + 1))
}

async fn find_invoice<C>(db: &C, invoice_id: i64) -> Result<invoice::Model>
where
    C: ConnectionTrait,
{
    Invoice::find_by_id(invoice_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("invoice", invoice_id))
}

/// Creates a draft invoice over the live, non-cancelled records of the given orders.
///
/// Cancelled orders are skipped. Every remaining order must belong to the customer.
///
/// # Errors
/// * `InvalidInput` - empty or repeated order ids, tax rate outside `0..=1`,
///   negative terms, or a due date before the issue date
/// * `NotFound` - the customer or one of the orders does not exist
/// * `CustomerMismatch` - an order belongs to somebody else
/// * `NoBillableRecords` - nothing left to bill
#[instrument(skip(db, config, request), fields(customer_id = request.customer_id))]
pub async fn create_invoice(
    db: &DatabaseConnection,
    config: &BillingConfig,
    request: NewInvoice,
) -> Result<invoice::Model> {
    let order_ids =
        OrderIds::new(request.order_ids).map_err(|message| Error::InvalidInput { message })?;
    if request.tax_rate.is_sign_negative() || request.tax_rate > Decimal::ONE {
        return Err(Error::InvalidInput {
            message: format!("Tax rate must be between 0 and 1, got {}", request.tax_rate),
        });
    }
    if request.payment_terms < 0 {
        return Err(Error::InvalidInput {
            message: format!("Payment terms cannot be negative, got {}", request.payment_terms),
        });
    }
    let tax_rate = request.tax_rate.round_dp(4);
    let issue_date = request.issue_date.unwrap_or_else(|| Utc::now().date_naive());
    let due_date = match request.due_date {
        Some(due) if due < issue_date => {
            return Err(Error::InvalidInput {
                message: "Due date cannot be before the issue date".to_string(),
            });
        }
        Some(due) => due,
        None => due_date(issue_date, request.payment_terms)?,
    };
    let (customer_id, payment_terms) = (request.customer_id, request.payment_terms);
    let order_ids = &order_ids;
    let prefix = config.invoice_prefix.as_str();

    let created = with_retry("create_invoice", move || async move {
        let txn = begin(db).await?;

        let customer = Customer::find_by_id(customer_id)
            .one(&txn)
            .await?
            .ok_or_else(|| Error::not_found("customer", customer_id))?;

        let mut billable_orders = Vec::with_capacity(order_ids.ids().len());
        for &order_id in order_ids.ids() {
            let order = find_order(&txn, order_id).await?;
            if order.customer_id != customer_id {
                return Err(Error::CustomerMismatch {
                    order_id,
                    customer_id,
                });
            }
            if order.status == OrderStatus::Cancelled {
                debug!(order_id, "Skipping cancelled order");
                continue;
            }
            billable_orders.push(order_id);
        }

        let records = OrderRecord::find()
            .filter(order_record::Column::OrderId.is_in(billable_orders))
            .filter(order_record::Column::Status.ne(RecordStatus::Cancelled))
            .order_by_asc(order_record::Column::OrderId)
            .order_by_asc(order_record::Column::Id)
            .all(&txn)
            .await?;
        if records.is_empty() {
            return Err(Error::NoBillableRecords {
                order_ids: order_ids.ids().to_vec(),
            });
        }

        // Only orders that contributed a line are recorded as billed
        let billed_orders = OrderIds(
            order_ids
                .ids()
                .iter()
                .copied()
                .filter(|id| records.iter().any(|r| r.order_id == *id))
                .collect(),
        );

        let subtotal = pricing::checked_sum(records.iter().map(|r| r.total_price))?;
        let totals = Totals::compute(subtotal, tax_rate);
        let invoice_number = next_invoice_number(&txn, prefix, issue_date).await?;

        let now = Utc::now();
        let created = invoice::ActiveModel {
            invoice_number: Set(invoice_number.clone()),
            customer_id: Set(customer_id),
            customer_name: Set(customer.name),
            order_ids: Set(billed_orders),
            issue_date: Set(issue_date),
            subtotal: Set(totals.subtotal),
            tax_rate: Set(tax_rate),
            tax_amount: Set(totals.tax_amount),
            total: Set(totals.total),
            payment_terms: Set(payment_terms),
            due_date: Set(due_date),
            status: Set(InvoiceStatus::Draft),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| Error::from_insert(e, "invoice", &invoice_number))?;

        let lines = records.iter().map(|record| invoice_record::ActiveModel {
            invoice_id: Set(created.id),
            order_id: Set(record.order_id),
            order_record_id: Set(record.id),
            quantity: Set(record.quantity),
            unit_price: Set(record.unit_price),
            total_price: Set(record.total_price),
            created_at: Set(now),
            ..Default::default()
        });
        InvoiceRecord::insert_many(lines).exec(&txn).await?;

        txn.commit().await?;
        Ok(created)
    })
    .await?;

    info!(
        invoice_id = created.id,
        invoice_number = %created.invoice_number,
        total = %created.total,
        "Invoice created"
    );
    Ok(created.with_money_scale())
}

/// Finds an invoice by id.
pub async fn get_invoice(db: &DatabaseConnection, invoice_id: i64) -> Result<Option<invoice::Model>> {
    Invoice::find_by_id(invoice_id)
        .one(db)
        .await
        .map(MoneyScale::with_money_scale)
        .map_err(Into::into)
}

/// The frozen lines of an invoice, in billing order.
pub async fn get_invoice_records(
    db: &DatabaseConnection,
    invoice_id: i64,
) -> Result<Vec<invoice_record::Model>> {
    InvoiceRecord::find()
        .filter(invoice_record::Column::InvoiceId.eq(invoice_id))
        .order_by_asc(invoice_record::Column::Id)
        .all(db)
        .await
        .map(MoneyScale::with_money_scale)
        .map_err(Into::into)
}

/// Records payment of an invoice and flags the billed orders and records as paid.
///
/// Only orders and records that appear on the invoice's lines are flagged.
///
/// # Errors
/// * `NotFound` - the invoice does not exist
/// * `AlreadyPaid` - the invoice is already paid
/// * `InvalidTransition` - the invoice is cancelled
#[instrument(skip(db))]
pub async fn mark_invoice_paid(
    db: &DatabaseConnection,
    invoice_id: i64,
    payment_date: NaiveDate,
    method: Option<String>,
    reference: Option<String>,
) -> Result<invoice::Model> {
    let method = method.as_deref();
    let reference = reference.as_deref();

    let paid = with_retry("mark_invoice_paid", move || async move {
        let txn = begin(db).await?;
        let current = find_invoice(&txn, invoice_id).await?;
        match current.status {
            InvoiceStatus::Paid => return Err(Error::AlreadyPaid { invoice_id }),
            InvoiceStatus::Cancelled => {
                return Err(Error::InvalidTransition {
                    entity: "invoice",
                    from: current.status.to_string(),
                    to: InvoiceStatus::Paid.to_string(),
                });
            }
            InvoiceStatus::Draft | InvoiceStatus::Sent | InvoiceStatus::Overdue => {}
        }

        let now = Utc::now();
        let mut active = current.into_active_model();
        active.status = Set(InvoiceStatus::Paid);
        active.payment_date = Set(Some(payment_date));
        active.payment_method = Set(method.map(str::to_string));
        active.payment_reference = Set(reference.map(str::to_string));
        active.updated_at = Set(now);
        let paid = active.update(&txn).await?;

        let lines: Vec<(i64, i64)> = InvoiceRecord::find()
            .select_only()
            .column(invoice_record::Column::OrderId)
            .column(invoice_record::Column::OrderRecordId)
            .filter(invoice_record::Column::InvoiceId.eq(invoice_id))
            .into_tuple()
            .all(&txn)
            .await?;
        let (order_ids, record_ids): (Vec<i64>, Vec<i64>) = lines.into_iter().unzip();
        OrderRecord::update_many()
            .col_expr(order_record::Column::Paid, Expr::value(true))
            .col_expr(order_record::Column::UpdatedAt, Expr::value(now))
            .filter(order_record::Column::Id.is_in(record_ids))
            .exec(&txn)
            .await?;
        Order::update_many()
            .col_expr(order::Column::Paid, Expr::value(true))
            .col_expr(order::Column::UpdatedAt, Expr::value(now))
            .filter(order::Column::Id.is_in(order_ids))
            .exec(&txn)
            .await?;

        txn.commit().await?;
        Ok(paid)
    })
    .await?;

    info!(invoice_id, %payment_date, "Invoice paid");
    Ok(paid.with_money_scale())
}

async fn set_status(
    db: &DatabaseConnection,
    operation: &'static str,
    invoice_id: i64,
    allowed_from: &[InvoiceStatus],
    to: InvoiceStatus,
) -> Result<invoice::Model> {
    with_retry(operation, move || async move {
        let txn = begin(db).await?;
        let current = find_invoice(&txn, invoice_id).await?;
        if current.status == InvoiceStatus::Paid && to == InvoiceStatus::Cancelled {
            return Err(Error::AlreadyPaid { invoice_id });
        }
        if !allowed_from.contains(&current.status) {
            return Err(Error::InvalidTransition {
                entity: "invoice",
                from: current.status.to_string(),
                to: to.to_string(),
            });
        }

        let mut active = current.into_active_model();
        active.status = Set(to);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        txn.commit().await?;
        info!(invoice_id, status = %to, "Invoice status changed");
        Ok(updated)
    })
    .await
    .map(MoneyScale::with_money_scale)
}

/// Moves a draft invoice to `sent`.
///
/// # Errors
/// `InvalidTransition` unless the invoice is a draft.
#[instrument(skip(db))]
pub async fn mark_invoice_sent(db: &DatabaseConnection, invoice_id: i64) -> Result<invoice::Model> {
    set_status(
        db,
        "mark_invoice_sent",
        invoice_id,
        &[InvoiceStatus::Draft],
        InvoiceStatus::Sent,
    )
    .await
}

/// Voids an unpaid invoice. Its lines are kept.
///
/// # Errors
/// * `AlreadyPaid` - paid invoices cannot be voided
/// * `InvalidTransition` - the invoice is already cancelled
#[instrument(skip(db))]
pub async fn cancel_invoice(db: &DatabaseConnection, invoice_id: i64) -> Result<invoice::Model> {
    set_status(
        db,
        "cancel_invoice",
        invoice_id,
        &[InvoiceStatus::Draft, InvoiceStatus::Sent, InvoiceStatus::Overdue],
        InvoiceStatus::Cancelled,
    )
    .await
}

/// Flags every sent invoice due before `today` as overdue and returns how many moved.
#[instrument(skip(db))]
pub async fn mark_overdue_invoices(db: &DatabaseConnection, today: NaiveDate) -> Result<u64> {
    let result = Invoice::update_many()
        .col_expr(invoice::Column::Status, Expr::value(InvoiceStatus::Overdue))
        .col_expr(invoice::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(invoice::Column::Status.eq(InvoiceStatus::Sent))
        .filter(invoice::Column::DueDate.lt(today))
        .exec(db)
        .await?;

    if result.rows_affected > 0 {
        warn!(count = result.rows_affected, %today, "Invoices now overdue");
    }
    Ok(result.rows_affected)
}

/// Deletes an invoice and its lines in one transaction.
///
/// Billed orders and records keep their prices and paid flags.
///
/// # Errors
/// `NotFound` if the invoice does not exist.
#[instrument(skip(db))]
pub async fn delete_invoice(db: &DatabaseConnection, invoice_id: i64) -> Result<()> {
    with_retry("delete_invoice", move || async move {
        let txn = begin(db).await?;
        find_invoice(&txn, invoice_id).await?;

        let lines = InvoiceRecord::delete_many()
            .filter(invoice_record::Column::InvoiceId.eq(invoice_id))
            .exec(&txn)
            .await?;
        Invoice::delete_by_id(invoice_id).exec(&txn).await?;

        txn.commit().await?;
        info!(invoice_id, lines = lines.rows_affected, "Invoice deleted");
        Ok(())
    })
    .await
}
