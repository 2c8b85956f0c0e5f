// Notification Publisher Port

use crate::domain::Notification;
use crate::error::{Result, TransactionError};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;

#[cfg(test)]
use mockall::automock;

/// Publishes notifications of successful transactions
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    async fn publish(&self, notification: Notification) -> Result<()>;
}

/// Forwards notifications into an unbounded channel
pub struct ChannelPublisher {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelPublisher {
    /// Create a publisher and the receiving end listeners consume from
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl NotificationPublisher for ChannelPublisher {
    async fn publish(&self, notification: Notification) -> Result<()> {
        self.tx.send(notification).map_err(|e| {
            TransactionError::Publish(format!(
                "no listener for notification '{}'",
                e.0.name
            ))
        })
    }
}

/// Only logs notifications (useful when nobody listens)
pub struct TracingPublisher;

#[async_trait]
impl NotificationPublisher for TracingPublisher {
    async fn publish(&self, notification: Notification) -> Result<()> {
        info!(
            name = %notification.name,
            transaction_id = ?notification.transaction_id,
            payload = %notification.payload,
            "Notification published"
        );
        Ok(())
    }
}
