// Transaction Lifecycle State Machine

use super::error::{DomainError, Result};
use serde::{Deserialize, Serialize};

/// Transaction ID (assigned by the IdProvider when execution starts)
pub type TransactionId = String;

/// Transaction State
///
/// ```text
/// Created -> Locking -> Validating -> Performing -> Committed ----> Finalizing -> Succeeded
///    |          |           |             |            |               ^    \
///    |          |           +-------------+------------+-> RollingBack-+     +-> Failed
///    +----------+------------------------------------------------------+
/// Succeeded -> Compensated
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionState {
    Created,
    Locking,
    Validating,
    Performing,
    Committed,
    RollingBack,
    Finalizing,
    Succeeded,
    Failed,
    Compensated,
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Created => write!(f, "CREATED"),
            TransactionState::Locking => write!(f, "LOCKING"),
            TransactionState::Validating => write!(f, "VALIDATING"),
            TransactionState::Performing => write!(f, "PERFORMING"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::RollingBack => write!(f, "ROLLING_BACK"),
            TransactionState::Finalizing => write!(f, "FINALIZING"),
            TransactionState::Succeeded => write!(f, "SUCCEEDED"),
            TransactionState::Failed => write!(f, "FAILED"),
            TransactionState::Compensated => write!(f, "COMPENSATED"),
        }
    }
}

impl TransactionState {
    /// Check whether `next` is reachable from this state in one step
    pub fn can_transition_to(&self, next: TransactionState) -> bool {
        use TransactionState::*;

        matches!(
            (self, next),
            (Created, Locking)
                | (Created, Validating)
                | (Created, Finalizing)
                | (Locking, Validating)
                | (Locking, Finalizing)
                | (Validating, Performing)
                | (Validating, RollingBack)
                | (Performing, Committed)
                | (Performing, RollingBack)
                | (Committed, Finalizing)
                | (Committed, RollingBack)
                | (RollingBack, Finalizing)
                | (Finalizing, Succeeded)
                | (Finalizing, Failed)
                | (Succeeded, Compensated)
        )
    }

    /// Move to `next`, rejecting transitions outside the lifecycle graph
    pub fn transition(&mut self, next: TransactionState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(DomainError::InvalidStateTransition {
                from: self.to_string(),
                to: next.to_string(),
            });
        }
        *self = next;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Succeeded | TransactionState::Failed | TransactionState::Compensated
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_with_lock() {
        let mut state = TransactionState::Created;
        for next in [
            TransactionState::Locking,
            TransactionState::Validating,
            TransactionState::Performing,
            TransactionState::Committed,
            TransactionState::Finalizing,
            TransactionState::Succeeded,
        ] {
            assert!(state.transition(next).is_ok(), "{} -> {}", state, next);
        }
        assert!(state.is_terminal());
    }

    #[test]
    fn test_rollback_path() {
        let mut state = TransactionState::Validating;
        assert!(state.transition(TransactionState::RollingBack).is_ok());
        assert!(state.transition(TransactionState::Finalizing).is_ok());
        assert!(state.transition(TransactionState::Failed).is_ok());
    }

    #[test]
    fn test_cannot_execute_twice() {
        let mut state = TransactionState::Succeeded;
        let err = state.transition(TransactionState::Validating).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid transaction state transition: SUCCEEDED -> VALIDATING"
        );
        assert_eq!(state, TransactionState::Succeeded);
    }

    #[test]
    fn test_only_succeeded_can_be_compensated() {
        assert!(TransactionState::Succeeded.can_transition_to(TransactionState::Compensated));
        assert!(!TransactionState::Failed.can_transition_to(TransactionState::Compensated));
        assert!(!TransactionState::Created.can_transition_to(TransactionState::Compensated));
    }

    #[test]
    fn test_serde_uses_screaming_case() {
        let json = serde_json::to_string(&TransactionState::RollingBack).unwrap();
        assert_eq!(json, "\"ROLLING_BACK\"");
    }
}
