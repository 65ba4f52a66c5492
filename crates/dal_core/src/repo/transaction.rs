//! Single-mutation transaction bracket.
//!
//! # Invariants
//! - One executor runs at most one transaction; there is no nesting.
//! - Rollback is attempted only when `BEGIN` succeeded.
//! - A rollback failure is attached to the original cause, never replaces it.

use crate::db::DbError;
use crate::repo::error::{RepoError, RepoResult};
use log::{debug, error};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::time::Instant;

/// Lifecycle of the transaction owned by one [`TransactionExecutor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    Active,
    Committed,
    RolledBack,
}

/// Brackets one unit of work in `BEGIN IMMEDIATE` / `COMMIT` / `ROLLBACK`.
///
/// Created per call and dropped with it. Each `execute` owns its own
/// transaction.
#[derive(Debug)]
pub struct TransactionExecutor {
    op: &'static str,
    state: TransactionState,
}

impl TransactionExecutor {
    pub fn new(op: &'static str) -> Self {
        Self {
            op,
            state: TransactionState::Idle,
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Runs `work` inside a fresh transaction on `conn`.
    ///
    /// # Errors
    /// - `Connection` when the transaction cannot begin; state stays `Idle`.
    /// - Any error from `work` or from `COMMIT`; state becomes `RolledBack`.
    pub fn execute<R, F>(&mut self, conn: &mut Connection, work: F) -> RepoResult<R>
    where
        F: FnOnce(&Transaction<'_>) -> RepoResult<R>,
    {
        self.state = TransactionState::Idle;
        let started_at = Instant::now();

        let tx = match conn.transaction_with_behavior(TransactionBehavior::Immediate) {
            Ok(tx) => tx,
            Err(err) => {
                error!(
                    "event=tx_begin module=repo op={} status=error error={}",
                    self.op, err
                );
                return Err(RepoError::Connection(DbError::Sqlite(err)));
            }
        };
        self.state = TransactionState::Active;

        let outcome = match work(&tx) {
            Ok(value) => match tx.commit() {
                Ok(()) => {
                    self.state = TransactionState::Committed;
                    Ok(value)
                }
                // A failed commit leaves the transaction to its drop guard,
                // which rolls back.
                Err(err) => {
                    self.state = TransactionState::RolledBack;
                    Err(RepoError::Execution(err))
                }
            },
            Err(cause) => {
                self.state = TransactionState::RolledBack;
                match tx.rollback() {
                    Ok(()) => Err(cause),
                    Err(release) => {
                        error!(
                            "event=tx_rollback module=repo op={} status=error error={}",
                            self.op, release
                        );
                        Err(cause.with_release_failure(release))
                    }
                }
            }
        };

        match &outcome {
            Ok(_) => debug!(
                "event=tx_end module=repo op={} status=committed duration_ms={}",
                self.op,
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=tx_end module=repo op={} status=rolled_back duration_ms={} error={}",
                self.op,
                started_at.elapsed().as_millis(),
                err
            ),
        }
        outcome
    }
}
