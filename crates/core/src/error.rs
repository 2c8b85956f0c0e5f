// Central Error Type for the Transaction Engine

use thiserror::Error;

/// Boxed error returned by user-supplied work, validation and compensation code
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result of user-supplied work
pub type WorkResult = std::result::Result<(), BoxError>;

/// Engine-level error type
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Validation failed: {0}")]
    ValidationFailed(#[source] BoxError),

    #[error("Perform failed: {0}")]
    PerformFailed(#[source] BoxError),

    /// A side effect could not be reverted. Remaining reverts were skipped.
    #[error("Side effect revert failed: {source} (original failure: {original})")]
    SideEffectRevertFailed {
        #[source]
        source: BoxError,
        original: Box<TransactionError>,
    },

    /// `cleanup_after_failure` itself failed after all side effects were reverted.
    #[error("Cleanup after failure failed: {source} (original failure: {original})")]
    CleanupFailed {
        #[source]
        source: BoxError,
        original: Box<TransactionError>,
    },

    /// Compensating an already-succeeded transaction failed
    #[error("Compensation of transaction {transaction} failed: {source}")]
    CompensationFailed {
        transaction: String,
        #[source]
        source: BoxError,
    },

    #[error("Invalid chain step at position {position}: {reason}")]
    InvalidChainStep { position: usize, reason: String },

    #[error("Event construction invalid: {0}")]
    EventConstructionInvalid(String),

    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Exclusive hold error on '{resource}': {message}")]
    Hold { resource: String, message: String },

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl TransactionError {
    /// Wrap a validation error, passing nested transaction errors through unchanged
    pub fn validation(err: BoxError) -> Self {
        match err.downcast::<TransactionError>() {
            Ok(inner) => *inner,
            Err(other) => TransactionError::ValidationFailed(other),
        }
    }

    /// Wrap a perform error, passing nested transaction errors through unchanged
    pub fn perform(err: BoxError) -> Self {
        match err.downcast::<TransactionError>() {
            Ok(inner) => *inner,
            Err(other) => TransactionError::PerformFailed(other),
        }
    }

    /// The failure that was superseded by a failing compensation, if any
    pub fn superseded(&self) -> Option<&TransactionError> {
        match self {
            TransactionError::SideEffectRevertFailed { original, .. }
            | TransactionError::CleanupFailed { original, .. } => Some(original),
            _ => None,
        }
    }

    /// True when a compensation step failed and rollback is incomplete
    pub fn is_compensation_failure(&self) -> bool {
        self.superseded().is_some()
    }
}

/// Result type alias using TransactionError
pub type Result<T> = std::result::Result<T, TransactionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perform_wraps_foreign_error() {
        let err = TransactionError::perform("disk full".into());
        assert!(matches!(err, TransactionError::PerformFailed(_)));
        assert_eq!(err.to_string(), "Perform failed: disk full");
    }

    #[test]
    fn test_perform_passes_nested_error_through() {
        let nested: BoxError = Box::new(TransactionError::InvalidChainStep {
            position: 2,
            reason: "not a transaction".to_string(),
        });
        let err = TransactionError::perform(nested);
        assert!(matches!(
            err,
            TransactionError::InvalidChainStep { position: 2, .. }
        ));
    }

    #[test]
    fn test_validation_wraps_foreign_error() {
        let err = TransactionError::validation("already done".into());
        assert!(matches!(err, TransactionError::ValidationFailed(_)));
    }

    #[test]
    fn test_superseded_keeps_original() {
        let err = TransactionError::SideEffectRevertFailed {
            source: "revert broke".into(),
            original: Box::new(TransactionError::PerformFailed("boom".into())),
        };
        assert!(err.is_compensation_failure());
        assert!(matches!(
            err.superseded(),
            Some(TransactionError::PerformFailed(_))
        ));
        assert!(err.to_string().contains("original failure: Perform failed: boom"));
    }
}
