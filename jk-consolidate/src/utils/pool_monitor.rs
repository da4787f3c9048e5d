//! Connection pool monitoring utilities
//!
//! Instrumented transaction wrapper that logs how long a connection waited
//! to be acquired and how long it was held. Consolidation decisions each run
//! inside one of these.

use sqlx::{Sqlite, Transaction};
use std::time::Instant;
use jk_common::{Error, Result};

/// Monitored transaction wrapper that logs acquisition and release timing
pub struct MonitoredTransaction<'c> {
    tx: Option<Transaction<'c, Sqlite>>,
    caller: &'static str,
    acquired_at: Instant,
}

impl<'c> MonitoredTransaction<'c> {
    fn new(tx: Transaction<'c, Sqlite>, caller: &'static str, acquired_at: Instant) -> Self {
        Self {
            tx: Some(tx),
            caller,
            acquired_at,
        }
    }

    /// Commit the transaction and log release timing
    pub async fn commit(mut self) -> Result<()> {
        let held_ms = self.acquired_at.elapsed().as_millis();
        let tx = self
            .tx
            .take()
            .ok_or_else(|| Error::Internal("Transaction already consumed".to_string()))?;

        tx.commit().await.map_err(Error::Database)?;

        if held_ms > 2000 {
            tracing::warn!(
                caller = self.caller,
                held_ms = held_ms,
                "LONG TRANSACTION - Connection held for extended period"
            );
        } else {
            tracing::debug!(
                caller = self.caller,
                held_ms = held_ms,
                "Connection released (commit)"
            );
        }

        Ok(())
    }

    /// Rollback the transaction and log release timing
    pub async fn rollback(mut self) -> Result<()> {
        let held_ms = self.acquired_at.elapsed().as_millis();
        let tx = self
            .tx
            .take()
            .ok_or_else(|| Error::Internal("Transaction already consumed".to_string()))?;

        tx.rollback().await.map_err(Error::Database)?;

        tracing::debug!(
            caller = self.caller,
            held_ms = held_ms,
            "Connection released (rollback)"
        );

        Ok(())
    }

    /// Get a mutable reference to the inner transaction
    ///
    /// `tx` is only taken by `commit`/`rollback`, which consume `self`.
    pub fn inner_mut(&mut self) -> &mut Transaction<'c, Sqlite> {
        self.tx.as_mut().expect("Transaction already consumed")
    }
}

impl<'c> Drop for MonitoredTransaction<'c> {
    fn drop(&mut self) {
        if self.tx.is_some() {
            // Dropped without commit: sqlx rolls the transaction back
            tracing::debug!(
                caller = self.caller,
                held_ms = self.acquired_at.elapsed().as_millis(),
                "Connection released (drop, rolled back)"
            );
        }
    }
}

/// Begin a monitored transaction with connection pool timing logs
///
/// ```ignore
/// let mut tx = begin_monitored(&pool, "execution::merge_group").await?;
/// // ... use &mut **tx.inner_mut() ...
/// tx.commit().await?;
/// ```
pub async fn begin_monitored<'c>(
    pool: &'c sqlx::SqlitePool,
    caller: &'static str,
) -> Result<MonitoredTransaction<'c>> {
    let start = Instant::now();

    tracing::debug!(caller = caller, "Connection acquisition requested");

    let tx = pool.begin().await.map_err(Error::Database)?;

    let wait_ms = start.elapsed().as_millis();

    if wait_ms > 1000 {
        tracing::warn!(
            caller = caller,
            wait_ms = wait_ms,
            "SLOW CONNECTION ACQUISITION - Pool may be saturated"
        );
    } else {
        tracing::debug!(caller = caller, wait_ms = wait_ms, "Connection acquired");
    }

    Ok(MonitoredTransaction::new(tx, caller, Instant::now()))
}
