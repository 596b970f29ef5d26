//! Per-operation time budget.
//!
//! Each public `Connection` call creates one [`Deadline`] from the configured
//! operation timeout and hands it to every step it runs. Catalog reads, the
//! count/page pair and pool setup all race the same instant, so the caller
//! sees `DbError::Timeout` within one budget no matter how many steps ran.

use crate::error::{DbError, DbResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, timeout_at};

// Far enough out to never fire; tokio rejects instants past ~30 years
const UNBOUNDED: Duration = Duration::from_secs(60 * 60 * 24 * 365);

#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    /// A deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        let now = Instant::now();
        let at = now
            .checked_add(budget.min(UNBOUNDED))
            .unwrap_or(now);
        Self { at, budget }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn budget_ms(&self) -> u64 {
        u64::try_from(self.budget.as_millis()).unwrap_or(u64::MAX)
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }
}

/// Run `fut` until the deadline.
///
/// Timeouts raised inside `fut` without a known bound (pool acquire) are
/// reported against this deadline's budget.
pub(crate) async fn with_timeout<T, F>(operation: &str, deadline: Deadline, fut: F) -> DbResult<T>
where
    F: Future<Output = DbResult<T>>,
{
    match timeout_at(deadline.at, fut).await {
        Ok(result) => result.map_err(|e| e.with_timeout_bound(deadline.budget_ms())),
        Err(_) => Err(DbError::timeout(operation, deadline.budget_ms())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_expires() {
        let deadline = Deadline::after(Duration::from_millis(250));
        let err = with_timeout("list_tables", deadline, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, DbError>(())
        })
        .await
        .unwrap_err();

        match err {
            DbError::Timeout {
                operation,
                timeout_ms,
            } => {
                assert_eq!(operation, "list_tables");
                assert_eq!(timeout_ms, 250);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_passes_result() {
        let deadline = Deadline::after(Duration::from_secs(1));
        let value = with_timeout("count", deadline, async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<_, DbError>(7)
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chained_steps_share_one_budget() {
        let deadline = Deadline::after(Duration::from_secs(1));

        // First step uses most of the budget and still finishes
        with_timeout("list_table_columns", deadline, async {
            tokio::time::sleep(Duration::from_millis(900)).await;
            Ok::<_, DbError>(())
        })
        .await
        .unwrap();
        assert!(deadline.remaining() <= Duration::from_millis(100));

        // Second step gets only what is left, not a fresh second
        let err = with_timeout("select_top", deadline, async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok::<_, DbError>(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, DbError::Timeout { ref operation, .. } if operation == "select_top"));
        assert!(deadline.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_acquire_timeout_reports_budget() {
        let deadline = Deadline::after(Duration::from_secs(30));
        let err = with_timeout("execute", deadline, async {
            Err::<(), _>(DbError::from(sqlx::Error::PoolTimedOut))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, DbError::Timeout { timeout_ms: 30_000, .. }));
    }

    #[test]
    fn test_huge_budget_does_not_overflow() {
        let deadline = Deadline::after(Duration::from_secs(u64::MAX));
        assert!(!deadline.is_expired());
        assert_eq!(deadline.budget_ms(), u64::MAX);
    }
}
