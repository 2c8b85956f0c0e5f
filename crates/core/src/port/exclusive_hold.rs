// Exclusive Hold Port - named mutual exclusion around a transaction's atomic scope

use crate::error::{Result, TransactionError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

/// Exclusive hold on a named external resource (e.g. a table)
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ExclusiveHold: Send + Sync {
    /// Wait until the resource is exclusively held by the caller
    async fn acquire(&self, resource: &str) -> Result<()>;

    /// Give the resource back. Releasing a resource that is not held is an error.
    async fn release(&self, resource: &str) -> Result<()>;
}

fn poisoned(resource: &str) -> TransactionError {
    TransactionError::Hold {
        resource: resource.to_string(),
        message: "hold registry poisoned".to_string(),
    }
}

/// In-process holds: one async mutex per resource name
///
/// The owned guard is parked until `release`, so acquire and release can
/// happen in different calls. Holds are not re-entrant: a nested transaction
/// asking for a resource its parent holds waits forever.
#[derive(Default)]
pub struct LocalHolds {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    held: Mutex<HashMap<String, OwnedMutexGuard<()>>>,
}

impl LocalHolds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self, resource: &str) -> bool {
        self.held
            .lock()
            .map(|held| held.contains_key(resource))
            .unwrap_or(false)
    }
}

#[async_trait]
impl ExclusiveHold for LocalHolds {
    async fn acquire(&self, resource: &str) -> Result<()> {
        let lock = {
            let mut locks = self.locks.lock().map_err(|_| poisoned(resource))?;
            locks.entry(resource.to_string()).or_default().clone()
        };

        let guard = lock.lock_owned().await;
        self.held
            .lock()
            .map_err(|_| poisoned(resource))?
            .insert(resource.to_string(), guard);

        debug!(resource = %resource, "Exclusive hold acquired");
        Ok(())
    }

    async fn release(&self, resource: &str) -> Result<()> {
        let guard = self
            .held
            .lock()
            .map_err(|_| poisoned(resource))?
            .remove(resource);

        match guard {
            Some(guard) => {
                drop(guard);
                debug!(resource = %resource, "Exclusive hold released");
                Ok(())
            }
            None => Err(TransactionError::Hold {
                resource: resource.to_string(),
                message: "resource is not held".to_string(),
            }),
        }
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;

    /// Counts acquire/release calls per resource and keeps the call log
    #[derive(Clone, Default)]
    pub struct RecordingHolds {
        log: Arc<Mutex<Vec<String>>>,
        fail_acquire: bool,
    }

    impl RecordingHolds {
        pub fn new() -> Self {
            Self::default()
        }

        /// Holds whose acquire always fails
        pub fn failing_acquire() -> Self {
            Self {
                fail_acquire: true,
                ..Self::default()
            }
        }

        /// Entries look like `acquire:ledger` / `release:ledger`
        pub fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }

        pub fn acquire_count(&self, resource: &str) -> usize {
            self.count(&format!("acquire:{}", resource))
        }

        pub fn release_count(&self, resource: &str) -> usize {
            self.count(&format!("release:{}", resource))
        }

        fn count(&self, entry: &str) -> usize {
            self.log.lock().unwrap().iter().filter(|e| *e == entry).count()
        }
    }

    #[async_trait]
    impl ExclusiveHold for RecordingHolds {
        async fn acquire(&self, resource: &str) -> Result<()> {
            if self.fail_acquire {
                return Err(TransactionError::Hold {
                    resource: resource.to_string(),
                    message: "acquire refused".to_string(),
                });
            }
            self.log.lock().unwrap().push(format!("acquire:{}", resource));
            Ok(())
        }

        async fn release(&self, resource: &str) -> Result<()> {
            if self.acquire_count(resource) <= self.release_count(resource) {
                return Err(TransactionError::Hold {
                    resource: resource.to_string(),
                    message: "resource is not held".to_string(),
                });
            }
            self.log.lock().unwrap().push(format!("release:{}", resource));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_acquire_and_release() {
        let holds = LocalHolds::new();
        holds.acquire("ledger").await.unwrap();
        assert!(holds.is_held("ledger"));

        holds.release("ledger").await.unwrap();
        assert!(!holds.is_held("ledger"));
    }

    #[tokio::test]
    async fn test_double_release_rejected() {
        let holds = LocalHolds::new();
        holds.acquire("ledger").await.unwrap();
        holds.release("ledger").await.unwrap();

        let err = holds.release("ledger").await.unwrap_err();
        assert!(err.to_string().contains("not held"));
    }

    #[tokio::test]
    async fn test_second_acquire_waits_for_release() {
        let holds = Arc::new(LocalHolds::new());
        holds.acquire("ledger").await.unwrap();

        let contender = {
            let holds = holds.clone();
            tokio::spawn(async move { holds.acquire("ledger").await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        holds.release("ledger").await.unwrap();
        let acquired = tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .expect("contender should acquire after release")
            .unwrap();
        assert!(acquired.is_ok());
        assert!(holds.is_held("ledger"));
    }

    #[tokio::test]
    async fn test_distinct_resources_do_not_block() {
        let holds = LocalHolds::new();
        holds.acquire("accounts").await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), holds.acquire("audit"))
            .await
            .expect("independent resource should not wait")
            .unwrap();
    }
}
