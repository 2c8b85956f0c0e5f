// Notification Domain Model

use super::error::{DomainError, Result};
use super::state::TransactionId;
use serde::{Deserialize, Serialize};

/// Notification published after a transaction succeeds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub name: String,
    /// Set when the notification was built from the transaction itself
    pub transaction_id: Option<TransactionId>,
    pub payload: serde_json::Value,
    /// Epoch millis, stamped by the engine right before publishing
    pub occurred_at: i64,
}

impl Notification {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transaction_id: None,
            payload: serde_json::Value::Null,
            occurred_at: 0,
        }
    }

    pub fn for_transaction(mut self, id: impl Into<TransactionId>) -> Self {
        self.transaction_id = Some(id.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Check the notification is publishable
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "notification name cannot be empty".to_string(),
            ));
        }
        if let Some(id) = &self.transaction_id {
            if id.is_empty() {
                return Err(DomainError::ValidationError(format!(
                    "notification '{}' refers to a transaction without an id",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder() {
        let n = Notification::new("ledger.transfer.completed")
            .for_transaction("tx-1")
            .with_payload(json!({"amount": 10}));

        assert_eq!(n.transaction_id.as_deref(), Some("tx-1"));
        assert_eq!(n.payload["amount"], 10);
        assert!(n.validate().is_ok());
    }

    #[test]
    fn test_empty_name_rejected() {
        let err = Notification::new("  ").validate().unwrap_err();
        assert!(err.to_string().contains("cannot be empty"));
    }

    #[test]
    fn test_empty_transaction_id_rejected() {
        let n = Notification::new("fired").for_transaction("");
        assert!(n.validate().is_err());
    }
}
