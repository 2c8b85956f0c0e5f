// Domain Layer - Transaction lifecycle and notifications

pub mod error;
pub mod notification;
pub mod state;

// Re-exports
pub use error::DomainError;
pub use notification::Notification;
pub use state::{TransactionId, TransactionState};
