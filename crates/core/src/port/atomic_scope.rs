// Atomic Scope Port - all-or-nothing execution delegated to the store

use crate::error::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::{error, trace};

#[cfg(test)]
use mockall::automock;

/// Atomic scope for persistent mutations
///
/// Implementations must support nesting: a `begin` issued while a scope is
/// already open starts an inner scope (savepoint) that the matching
/// `commit`/`rollback` closes without touching the outer one.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AtomicScope: Send + Sync {
    /// Open a (possibly nested) scope
    async fn begin(&self) -> Result<()>;

    /// Make the innermost scope's mutations permanent (or part of the parent scope)
    async fn commit(&self) -> Result<()>;

    /// Discard the innermost scope's mutations
    async fn rollback(&self) -> Result<()>;
}

/// Run `work` inside an atomic scope.
///
/// Commits when the work succeeds and rolls back when it fails. The work's
/// own error is returned even if the rollback also fails; the rollback
/// failure is logged.
pub async fn run_atomically<'a, T>(
    scope: &dyn AtomicScope,
    work: BoxFuture<'a, Result<T>>,
) -> Result<T> {
    scope.begin().await?;

    match work.await {
        Ok(value) => {
            scope.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = scope.rollback().await {
                error!(
                    error = %rollback_err,
                    original = %err,
                    "Atomic scope rollback failed"
                );
            }
            Err(err)
        }
    }
}

/// Scope with no backing store (pure in-memory work)
pub struct PassthroughScope;

#[async_trait]
impl AtomicScope for PassthroughScope {
    async fn begin(&self) -> Result<()> {
        trace!("passthrough scope: begin");
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        trace!("passthrough scope: commit");
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        trace!("passthrough scope: rollback");
        Ok(())
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::TransactionError;
    use std::sync::{Arc, Mutex};

    /// Records every scope call ("begin", "commit", "rollback") in order
    #[derive(Clone, Default)]
    pub struct RecordingScope {
        calls: Arc<Mutex<Vec<&'static str>>>,
        fail_commit: bool,
    }

    impl RecordingScope {
        pub fn new() -> Self {
            Self::default()
        }

        /// A scope whose commit always fails
        pub fn failing_commit() -> Self {
            Self {
                fail_commit: true,
                ..Self::default()
            }
        }

        pub fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }

        pub fn count(&self, call: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|c| **c == call).count()
        }

        fn record(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl AtomicScope for RecordingScope {
        async fn begin(&self) -> Result<()> {
            self.record("begin");
            Ok(())
        }

        async fn commit(&self) -> Result<()> {
            self.record("commit");
            if self.fail_commit {
                return Err(TransactionError::Store("commit refused".to_string()));
            }
            Ok(())
        }

        async fn rollback(&self) -> Result<()> {
            self.record("rollback");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mocks::RecordingScope;
    use super::*;
    use crate::error::TransactionError;

    #[tokio::test]
    async fn test_commits_on_success() {
        let scope = RecordingScope::new();
        let value = run_atomically(&scope, Box::pin(async { Ok(7) }))
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(scope.calls(), vec!["begin", "commit"]);
    }

    #[tokio::test]
    async fn test_rolls_back_on_failure() {
        let scope = RecordingScope::new();
        let result: Result<()> = run_atomically(
            &scope,
            Box::pin(async { Err(TransactionError::PerformFailed("boom".into())) }),
        )
        .await;

        assert!(matches!(result, Err(TransactionError::PerformFailed(_))));
        assert_eq!(scope.calls(), vec!["begin", "rollback"]);
    }

    #[tokio::test]
    async fn test_rollback_failure_keeps_work_error() {
        let mut scope = MockAtomicScope::new();
        scope.expect_begin().times(1).returning(|| Ok(()));
        scope.expect_commit().never();
        scope
            .expect_rollback()
            .times(1)
            .returning(|| Err(TransactionError::Store("connection lost".to_string())));

        let result: Result<()> = run_atomically(
            &scope,
            Box::pin(async { Err(TransactionError::PerformFailed("boom".into())) }),
        )
        .await;

        assert!(matches!(result, Err(TransactionError::PerformFailed(_))));
    }

    #[tokio::test]
    async fn test_begin_failure_skips_work() {
        let mut scope = MockAtomicScope::new();
        scope
            .expect_begin()
            .times(1)
            .returning(|| Err(TransactionError::Store("locked".to_string())));

        let ran = std::sync::atomic::AtomicBool::new(false);
        let result = run_atomically(
            &scope,
            Box::pin(async {
                ran.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            }),
        )
        .await;

        assert!(matches!(result, Err(TransactionError::Store(_))));
        assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
    }
}
