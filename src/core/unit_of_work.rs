//! Transaction scope and transient-failure retry shared by every core operation.
//!
//! Each multi-row invariant (capacity check + insert, price + history, cascade delete)
//! runs inside one transaction opened by [`begin`]. [`with_retry`] runs such a unit of
//! work once more when the store reports contention and turns a second loss into
//! [`Error::Conflict`].

use crate::errors::{Error, Result};
use sea_orm::{
    ConnectionTrait, DatabaseBackend, DatabaseConnection, DatabaseTransaction, IsolationLevel,
    TransactionTrait,
};
use std::future::Future;
use tracing::warn;

/// Opens a transaction at the isolation level the core relies on.
///
/// `SQLite` transactions are already serializable; other backends are asked for
/// `SERIALIZABLE` explicitly.
pub(crate) async fn begin(db: &DatabaseConnection) -> Result<DatabaseTransaction> {
    let isolation = match db.get_database_backend() {
        DatabaseBackend::Sqlite => None,
        _ => Some(IsolationLevel::Serializable),
    };
    db.begin_with_config(isolation, None)
        .await
        .map_err(Into::into)
}

/// Runs `unit` and, if it fails with a transient store error, runs it exactly once more.
///
/// # Errors
/// Non-transient errors are returned unchanged. A transient error on the second
/// attempt becomes [`Error::Conflict`].
pub(crate) async fn with_retry<T, F, Fut>(operation: &'static str, mut unit: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match unit().await {
        Err(err) if err.is_transient() => {
            warn!(operation, error = %err, "Transient store failure, retrying once");
            match unit().await {
                Err(err) if err.is_transient() => {
                    warn!(operation, error = %err, "Retry lost the race again");
                    Err(Error::Conflict { operation })
                }
                other => other,
            }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DbErr, RuntimeErr};
    use std::cell::Cell;

    fn locked() -> Error {
        Error::Database(DbErr::Exec(RuntimeErr::Internal(
            "database is locked".to_string(),
        )))
    }

    #[tokio::test]
    async fn test_transient_failure_retried_once() {
        let attempts = Cell::new(0);
        let result = with_retry("test", || {
            attempts.set(attempts.get() + 1);
            let attempt = attempts.get();
            async move { if attempt == 1 { Err(locked()) } else { Ok(attempt) } }
        })
        .await;

        assert!(matches!(result, Ok(2)));
        assert_eq!(attempts.get(), 2);
    }

    #[tokio::test]
    async fn test_second_transient_failure_is_conflict() {
        let attempts = Cell::new(0);
        let result: Result<()> = with_retry("assign_machine", || {
            attempts.set(attempts.get() + 1);
            async { Err(locked()) }
        })
        .await;

        assert!(matches!(
            result,
            Err(Error::Conflict {
                operation: "assign_machine"
            })
        ));
        assert_eq!(attempts.get(), 2);
    }

    #[tokio::test]
    async fn test_domain_errors_not_retried() {
        let attempts = Cell::new(0);
        let result: Result<()> = with_retry("test", || {
            attempts.set(attempts.get() + 1);
            async { Err(Error::not_found("order", 1)) }
        })
        .await;

        assert!(matches!(result, Err(Error::NotFound { .. })));
        assert_eq!(attempts.get(), 1);
    }
}
