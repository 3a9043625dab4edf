//! Pricing snapshot recorder - append-only price history for orders and records.
//!
//! Snapshots are written by the record and order operations inside the same transaction
//! as the price change they describe, so a price change and its history row are either
//! both visible or neither is. Nothing here updates or deletes a snapshot.

use crate::{
    entities::{
        MoneyScale, OrderPricingHistory, RecordPricingHistory, order_pricing_history,
        order_record, record_pricing_history,
    },
    errors::{Error, Result},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{QueryOrder, Set, prelude::*};
use tracing::debug;

/// Who changed a price and why.
#[derive(Debug, Clone, Copy)]
pub struct PriceAudit<'a> {
    /// Actor recorded as `created_by`
    pub actor: &'a str,
    /// Free-text note
    pub note: Option<&'a str>,
}

impl<'a> PriceAudit<'a> {
    /// Builds an audit entry, rejecting a blank actor.
    pub fn new(actor: &'a str, note: Option<&'a str>) -> Result<Self> {
        if actor.trim().is_empty() {
            return Err(Error::InvalidInput {
                message: "price changes must name an actor".to_string(),
            });
        }
        Ok(Self {
            actor: actor.trim(),
            note: note.map(str::trim).filter(|n| !n.is_empty()),
        })
    }
}

/// Checks a money value and normalises it to 2 decimal places.
pub(crate) fn validate_amount(amount: Decimal) -> Result<Decimal> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(Error::InvalidAmount { amount });
    }
    Ok(amount.round_dp(2))
}

/// `unit_price × quantity`, rounded to cents.
///
/// # Errors
/// `InvalidAmount` if the product does not fit in a `Decimal`.
pub fn line_total(unit_price: Decimal, quantity: i32) -> Result<Decimal> {
    unit_price
        .checked_mul(Decimal::from(quantity))
        .map(|total| total.round_dp(2))
        .ok_or(Error::InvalidAmount { amount: unit_price })
}

/// Adds up money values, failing with `InvalidAmount` instead of overflowing.
pub(crate) fn checked_sum(amounts: impl IntoIterator<Item = Decimal>) -> Result<Decimal> {
    amounts
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, amount| {
            acc.checked_add(amount)
                .ok_or(Error::InvalidAmount { amount })
        })
        .map(|total| total.round_dp(2))
}

/// Appends a snapshot of a record's current prices.
pub(crate) async fn snapshot_record<C>(
    db: &C,
    record: &order_record::Model,
    audit: PriceAudit<'_>,
) -> Result<record_pricing_history::Model>
where
    C: ConnectionTrait,
{
    let row = record_pricing_history::ActiveModel {
        order_id: Set(record.order_id),
        order_record_id: Set(record.id),
        unit_price: Set(record.unit_price),
        total_price: Set(record.total_price),
        created_at: Set(Utc::now()),
        created_by: Set(audit.actor.to_string()),
        notes: Set(audit.note.map(str::to_string)),
        ..Default::default()
    }
    .insert(db)
    .await?;

    debug!(
        record_id = record.id,
        unit_price = %record.unit_price,
        total_price = %record.total_price,
        actor = audit.actor,
        "Record price snapshot appended"
    );
    Ok(row)
}

/// Appends a snapshot of an order's amount.
pub(crate) async fn snapshot_order<C>(
    db: &C,
    order_id: i64,
    amount: Decimal,
    audit: PriceAudit<'_>,
) -> Result<order_pricing_history::Model>
where
    C: ConnectionTrait,
{
    let row = order_pricing_history::ActiveModel {
        order_id: Set(order_id),
        total_price: Set(amount),
        created_at: Set(Utc::now()),
        created_by: Set(audit.actor.to_string()),
        notes: Set(audit.note.map(str::to_string)),
        ..Default::default()
    }
    .insert(db)
    .await?;

    debug!(order_id, amount = %amount, actor = audit.actor, "Order price snapshot appended");
    Ok(row)
}

/// Price history of a record, oldest first.
pub async fn get_record_price_history(
    db: &DatabaseConnection,
    record_id: i64,
) -> Result<Vec<record_pricing_history::Model>> {
    RecordPricingHistory::find()
        .filter(record_pricing_history::Column::OrderRecordId.eq(record_id))
        .order_by_asc(record_pricing_history::Column::Id)
        .all(db)
        .await
        .map(MoneyScale::with_money_scale)
        .map_err(Into::into)
}

/// Amount history of an order, oldest first.
pub async fn get_order_price_history(
    db: &DatabaseConnection,
    order_id: i64,
) -> Result<Vec<order_pricing_history::Model>> {
    OrderPricingHistory::find()
        .filter(order_pricing_history::Column::OrderId.eq(order_id))
        .order_by_asc(order_pricing_history::Column::Id)
        .all(db)
        .await
        .map(MoneyScale::with_money_scale)
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_line_total() {
        assert_eq!(line_total(dec!(5.00), 10).unwrap(), dec!(50.00));
        assert_eq!(line_total(dec!(2.345), 3).unwrap(), dec!(7.04));
        assert_eq!(line_total(dec!(0), 12).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_money_overflow_is_an_error() {
        assert!(matches!(
            line_total(Decimal::MAX, 2),
            Err(Error::InvalidAmount { .. })
        ));
        assert!(matches!(
            checked_sum([Decimal::MAX, dec!(1)]),
            Err(Error::InvalidAmount { .. })
        ));
        assert_eq!(checked_sum([dec!(0.10), dec!(0.20)]).unwrap(), dec!(0.30));
        assert_eq!(checked_sum([]).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_validate_amount() {
        assert_eq!(validate_amount(dec!(4.999)).unwrap(), dec!(5.00));
        assert!(validate_amount(Decimal::ZERO).is_ok());
        assert!(matches!(
            validate_amount(dec!(-0.01)),
            Err(Error::InvalidAmount { .. })
        ));
    }

    #[test]
    fn test_audit_requires_actor() {
        assert!(PriceAudit::new("  ", None).is_err());

        let audit = PriceAudit::new(" alice ", Some("  ")).unwrap();
        assert_eq!(audit.actor, "alice");
        assert_eq!(audit.note, None);
    }
}
