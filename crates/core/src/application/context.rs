// Execution Context - collaborators injected into every execute() call

use crate::port::{
    AtomicScope, ExclusiveHold, IdProvider, NotificationPublisher, PassthroughScope,
    SystemTimeProvider, TimeProvider, UuidProvider,
};
use std::sync::Arc;

/// Collaborators a transaction needs while executing
///
/// Passed by reference into `execute` and forwarded unchanged to nested
/// transactions, so a whole chain shares one store, one hold registry and
/// one publisher.
#[derive(Clone)]
pub struct ExecutionContext {
    atomic_scope: Arc<dyn AtomicScope>,
    holds: Option<Arc<dyn ExclusiveHold>>,
    publisher: Option<Arc<dyn NotificationPublisher>>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl ExecutionContext {
    pub fn builder(atomic_scope: Arc<dyn AtomicScope>) -> ExecutionContextBuilder {
        ExecutionContextBuilder {
            context: ExecutionContext {
                atomic_scope,
                holds: None,
                publisher: None,
                id_provider: Arc::new(UuidProvider),
                time_provider: Arc::new(SystemTimeProvider),
            },
        }
    }

    /// Context without a backing store, holds or publisher
    pub fn unscoped() -> Self {
        Self::builder(Arc::new(PassthroughScope)).build()
    }

    pub fn atomic_scope(&self) -> &dyn AtomicScope {
        self.atomic_scope.as_ref()
    }

    pub fn holds(&self) -> Option<&dyn ExclusiveHold> {
        self.holds.as_deref()
    }

    pub fn publisher(&self) -> Option<&dyn NotificationPublisher> {
        self.publisher.as_deref()
    }

    pub fn id_provider(&self) -> &dyn IdProvider {
        self.id_provider.as_ref()
    }

    pub fn time_provider(&self) -> &dyn TimeProvider {
        self.time_provider.as_ref()
    }
}

pub struct ExecutionContextBuilder {
    context: ExecutionContext,
}

impl ExecutionContextBuilder {
    pub fn with_holds(mut self, holds: Arc<dyn ExclusiveHold>) -> Self {
        self.context.holds = Some(holds);
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn NotificationPublisher>) -> Self {
        self.context.publisher = Some(publisher);
        self
    }

    pub fn with_id_provider(mut self, id_provider: Arc<dyn IdProvider>) -> Self {
        self.context.id_provider = id_provider;
        self
    }

    pub fn with_time_provider(mut self, time_provider: Arc<dyn TimeProvider>) -> Self {
        self.context.time_provider = time_provider;
        self
    }

    pub fn build(self) -> ExecutionContext {
        self.context
    }
}
