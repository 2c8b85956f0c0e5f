// Port Layer - Interfaces for external collaborators

pub mod atomic_scope;
pub mod exclusive_hold;
pub mod id_provider; // For deterministic testing
pub mod publisher;
pub mod time_provider;

// Re-exports
pub use atomic_scope::{run_atomically, AtomicScope, PassthroughScope};
pub use exclusive_hold::{ExclusiveHold, LocalHolds};
pub use id_provider::{IdProvider, UuidProvider};
pub use publisher::{ChannelPublisher, NotificationPublisher, TracingPublisher};
pub use time_provider::{SystemTimeProvider, TimeProvider};
