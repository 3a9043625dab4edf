//! Customers and employees - the identities orders, assignments and invoices point at.

use crate::{
    core::{
        assignment::unassign_employee,
        unit_of_work::{begin, with_retry},
    },
    entities::{Customer, Employee, customer, employee},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{Set, prelude::*};
use tracing::{info, instrument};

fn required(value: &str, what: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::InvalidInput {
            message: format!("{what} cannot be empty"),
        });
    }
    Ok(value.to_string())
}

/// Creates a customer with a unique external code.
///
/// # Errors
/// * `InvalidInput` - blank code or name
/// * `DuplicateReference` - the code is already taken
#[instrument(skip(db))]
pub async fn create_customer(
    db: &DatabaseConnection,
    code: &str,
    name: &str,
) -> Result<customer::Model> {
    let code = required(code, "Customer code")?;
    let name = required(name, "Customer name")?;

    let created = customer::ActiveModel {
        code: Set(code.clone()),
        name: Set(name),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(|e| Error::from_insert(e, "customer", &code))?;

    info!(customer_id = created.id, code = %created.code, "Customer created");
    Ok(created)
}

/// Finds a customer by id.
pub async fn get_customer(
    db: &DatabaseConnection,
    customer_id: i64,
) -> Result<Option<customer::Model>> {
    Customer::find_by_id(customer_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Creates an employee.
#[instrument(skip(db))]
pub async fn create_employee(db: &DatabaseConnection, name: &str) -> Result<employee::Model> {
    let name = required(name, "Employee name")?;
    let created = employee::ActiveModel {
        name: Set(name),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!(employee_id = created.id, "Employee created");
    Ok(created)
}

/// Deletes an employee, first clearing them from every assignment they made.
///
/// Returns the number of assignments that lost their employee reference.
///
/// # Errors
/// `NotFound` if the employee does not exist.
#[instrument(skip(db))]
pub async fn delete_employee(db: &DatabaseConnection, employee_id: i64) -> Result<u64> {
    with_retry("delete_employee", move || async move {
        let txn = begin(db).await?;
        Employee::find_by_id(employee_id)
            .one(&txn)
            .await?
            .ok_or_else(|| Error::not_found("employee", employee_id))?;

        let cleared = unassign_employee(&txn, employee_id).await?;
        Employee::delete_by_id(employee_id).exec(&txn).await?;

        txn.commit().await?;
        info!(employee_id, cleared, "Employee deleted");
        Ok(cleared)
    })
    .await
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::assignment::{assign_machine, get_assignments_for_record};
    use crate::test_utils::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_customer_codes_are_unique() -> Result<()> {
        let db = setup_test_db().await?;

        let customer = create_customer(&db, " C-9 ", "Ada").await?;
        assert_eq!(customer.code, "C-9");
        assert_eq!(get_customer(&db, customer.id).await?.unwrap().name, "Ada");

        let result = create_customer(&db, "C-9", "Someone Else").await;
        assert!(matches!(
            result,
            Err(Error::DuplicateReference { entity: "customer", .. })
        ));

        let result = create_customer(&db, "", "Nameless").await;
        assert!(matches!(result, Err(Error::InvalidInput { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_employee_nulls_assignments() -> Result<()> {
        let (db, _, record) = setup_with_record(4, dec!(1.00)).await?;
        let employee = create_test_employee(&db, "Sam").await?;
        assign_machine(&db, assignment_request(&record, employee.id, 4)).await?;

        let cleared = delete_employee(&db, employee.id).await?;
        assert_eq!(cleared, 1);

        let assignments = get_assignments_for_record(&db, record.id).await?;
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].assigned_by_id, None);
        assert_eq!(assignments[0].quantity, 4);

        let result = delete_employee(&db, employee.id).await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_blank_employee_name_rejected() -> Result<()> {
        let db = setup_test_db().await?;
        let result = create_employee(&db, "   ").await;
        assert!(matches!(result, Err(Error::InvalidInput { .. })));
        Ok(())
    }
}
