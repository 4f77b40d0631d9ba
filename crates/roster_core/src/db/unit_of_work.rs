//! Request-scoped transaction boundary.
//!
//! # Responsibility
//! - Run one caller request inside a single SQLite transaction.
//! - Commit on success and roll back on any error.
//!
//! # Invariants
//! - Write requests use `IMMEDIATE`, so the writer lock is held from the
//!   first read; check-then-write sequences cannot interleave with another
//!   writer.
//! - Read requests use `DEFERRED` and never take the writer lock unless the
//!   closure writes.

use super::DbError;
use log::{debug, warn};
use rusqlite::{Connection, Transaction, TransactionBehavior};

/// Runs `work` inside an immediate transaction on `conn`.
///
/// The closure receives the open transaction; repositories built over it
/// (`&Transaction` derefs to `&Connection`) share the same boundary.
///
/// # Errors
/// - Returns the closure error after rolling back.
/// - Returns a DB error (converted via `From<DbError>`) when the transaction
///   cannot be opened or committed.
pub fn with_unit_of_work<T, E>(
    conn: &mut Connection,
    work: impl FnOnce(&Transaction<'_>) -> Result<T, E>,
) -> Result<T, E>
where
    E: From<DbError>,
{
    run_in_transaction(conn, TransactionBehavior::Immediate, work)
}

/// Runs read-only `work` inside a deferred transaction on `conn`.
///
/// Readers get one consistent snapshot without contending for the writer
/// lock held by a concurrent write request.
///
/// # Errors
/// Same as [`with_unit_of_work`].
pub fn with_read_unit_of_work<T, E>(
    conn: &mut Connection,
    work: impl FnOnce(&Transaction<'_>) -> Result<T, E>,
) -> Result<T, E>
where
    E: From<DbError>,
{
    run_in_transaction(conn, TransactionBehavior::Deferred, work)
}

fn run_in_transaction<T, E>(
    conn: &mut Connection,
    behavior: TransactionBehavior,
    work: impl FnOnce(&Transaction<'_>) -> Result<T, E>,
) -> Result<T, E>
where
    E: From<DbError>,
{
    let tx = conn
        .transaction_with_behavior(behavior)
        .map_err(|err| E::from(DbError::Sqlite(err)))?;

    match work(&tx) {
        Ok(value) => {
            tx.commit().map_err(|err| E::from(DbError::Sqlite(err)))?;
            debug!("event=unit_of_work module=db status=committed");
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback() {
                warn!(
                    "event=unit_of_work module=db status=error error_code=rollback_failed error={}",
                    rollback_err
                );
            } else {
                debug!("event=unit_of_work module=db status=rolled_back");
            }
            Err(err)
        }
    }
}
