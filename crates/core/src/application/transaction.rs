// Transaction Engine - validate, perform, commit or roll back, finalize, notify

use super::context::ExecutionContext;
use super::side_effect::{SideEffect, SideEffectStack};
use crate::domain::{DomainError, Notification, TransactionId, TransactionState};
use crate::error::{Result, TransactionError, WorkResult};
use crate::port::{run_atomically, ExclusiveHold};
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::{debug, error, info, warn};

/// Business logic wrapped by a [`Transaction`]
///
/// Only `perform` is required. Every other hook defaults to a no-op.
#[async_trait]
pub trait UnitOfWork: Send + 'static {
    /// Reject the transaction before any side effect is recorded
    async fn validate(&mut self, _ctx: &ExecutionContext) -> WorkResult {
        Ok(())
    }

    /// Do the work. Register anything that must be undone on failure with
    /// [`WorkContext::add_side_effect`].
    async fn perform(&mut self, cx: &mut WorkContext<'_>) -> WorkResult;

    /// Undo effects that are not modeled as side effects (uploads, emails, ...).
    /// Runs after every registered side effect has been reverted.
    async fn cleanup_after_failure(&mut self, _ctx: &ExecutionContext) -> WorkResult {
        Ok(())
    }

    /// Runs after the exclusive hold is taken, before the atomic scope opens
    async fn before_atomic_scope(&mut self, _ctx: &ExecutionContext) -> WorkResult {
        Ok(())
    }

    /// Runs after the atomic scope committed
    async fn after_atomic_scope(&mut self, _ctx: &ExecutionContext) -> WorkResult {
        Ok(())
    }

    /// Runs on every exit path, before the exclusive hold is released
    async fn finally(&mut self, _ctx: &ExecutionContext) {}

    /// Last chance to translate the failure handed back to the caller
    fn on_failure(&mut self, error: TransactionError) -> TransactionError {
        error
    }
}

/// Handle given to [`UnitOfWork::perform`]
pub struct WorkContext<'a> {
    transaction_id: &'a str,
    side_effects: &'a mut SideEffectStack,
    execution: &'a ExecutionContext,
}

impl<'a> WorkContext<'a> {
    /// Record an action to revert if this transaction fails
    pub fn add_side_effect(&mut self, effect: impl SideEffect + 'static) {
        self.side_effects.push(Box::new(effect));
    }

    /// Collaborators to hand to nested transactions
    pub fn execution(&self) -> &'a ExecutionContext {
        self.execution
    }

    pub fn transaction_id(&self) -> &str {
        self.transaction_id
    }

    pub fn side_effect_count(&self) -> usize {
        self.side_effects.len()
    }
}

type NotificationFactory<W> = Box<dyn Fn(&Transaction<W>) -> Notification + Send + Sync>;

/// A unit of work with validation, atomic execution, rollback of side
/// effects and an optional success notification. Executes exactly once.
pub struct Transaction<W: UnitOfWork> {
    id: Option<TransactionId>,
    work: W,
    state: TransactionState,
    side_effects: SideEffectStack,
    lock_resource: Option<String>,
    notification: Option<NotificationFactory<W>>,
}

impl<W: UnitOfWork> Transaction<W> {
    pub fn new(work: W) -> Self {
        Self {
            id: None,
            work,
            state: TransactionState::Created,
            side_effects: SideEffectStack::new(),
            lock_resource: None,
            notification: None,
        }
    }

    /// Hold `resource` exclusively for the duration of the atomic scope
    pub fn with_lock(mut self, resource: impl Into<String>) -> Self {
        self.lock_resource = Some(resource.into());
        self
    }

    /// Publish a bare notification named `name` on success
    pub fn with_event(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.notification = Some(Box::new(move |_| Notification::new(name.clone())));
        self
    }

    /// Publish the notification built from the succeeded transaction
    pub fn with_notification<F>(mut self, factory: F) -> Self
    where
        F: Fn(&Transaction<W>) -> Notification + Send + Sync + 'static,
    {
        self.notification = Some(Box::new(factory));
        self
    }

    pub fn work(&self) -> &W {
        &self.work
    }

    pub fn work_mut(&mut self) -> &mut W {
        &mut self.work
    }

    pub fn into_work(self) -> W {
        self.work
    }

    /// Assigned when execution starts
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn lock_resource(&self) -> Option<&str> {
        self.lock_resource.as_deref()
    }

    /// Side effects still registered (not yet reverted)
    pub fn side_effect_count(&self) -> usize {
        self.side_effects.len()
    }

    fn check_configuration(&self, ctx: &ExecutionContext) -> Result<()> {
        if let Some(resource) = &self.lock_resource {
            if ctx.holds().is_none() {
                return Err(TransactionError::Config(format!(
                    "transaction holds '{}' but no exclusive hold collaborator is configured",
                    resource
                )));
            }
        }
        if self.notification.is_some() && ctx.publisher().is_none() {
            return Err(TransactionError::Config(
                "transaction publishes a notification but no publisher is configured".to_string(),
            ));
        }
        Ok(())
    }

    fn build_notification(&self, ctx: &ExecutionContext) -> Result<Option<Notification>> {
        let Some(factory) = &self.notification else {
            return Ok(None);
        };

        let mut notification = factory(self);
        notification
            .validate()
            .map_err(|e| TransactionError::EventConstructionInvalid(e.to_string()))?;
        notification.occurred_at = ctx.time_provider().now_millis();
        Ok(Some(notification))
    }

    /// before hook, atomic {validate, perform}, after hook, or the failure path
    async fn run_scoped(&mut self, ctx: &ExecutionContext) -> Result<()> {
        let before = guarded("before_atomic_scope", self.work.before_atomic_scope(ctx)).await;
        if let Err(e) = before {
            return Err(self.work.on_failure(TransactionError::perform(e)));
        }

        advance(&mut self.state, TransactionState::Validating);

        let Self {
            id,
            work,
            state,
            side_effects,
            ..
        } = self;
        let transaction_id = id.as_deref().unwrap_or_default();

        let scoped = run_atomically(
            ctx.atomic_scope(),
            Box::pin(async move {
                guarded("validate", work.validate(ctx))
                    .await
                    .map_err(TransactionError::validation)?;

                advance(state, TransactionState::Performing);
                let mut cx = WorkContext {
                    transaction_id,
                    side_effects,
                    execution: ctx,
                };
                guarded("perform", work.perform(&mut cx))
                    .await
                    .map_err(TransactionError::perform)
            }),
        )
        .await;

        let failure = match scoped {
            Ok(()) => {
                advance(&mut self.state, TransactionState::Committed);
                let after = self.work.after_atomic_scope(ctx);
                match guarded("after_atomic_scope", after).await {
                    Ok(()) => return Ok(()),
                    Err(e) => TransactionError::perform(e),
                }
            }
            Err(e) => e,
        };

        Err(self.roll_back(ctx, failure).await)
    }

    /// Revert side effects LIFO, run cleanup, then hand the failure to `on_failure`
    async fn roll_back(&mut self, ctx: &ExecutionContext, failure: TransactionError) -> TransactionError {
        advance(&mut self.state, TransactionState::RollingBack);
        let transaction_id = self.id.clone().unwrap_or_default();

        warn!(
            transaction_id = %transaction_id,
            error = %failure,
            side_effects = self.side_effects.len(),
            "Transaction failed, rolling back"
        );

        let failure = match self.side_effects.revert_all().await {
            Err(source) => {
                error!(
                    transaction_id = %transaction_id,
                    error = %source,
                    superseded = %failure,
                    remaining = self.side_effects.len(),
                    "Side effect revert failed, remaining reverts skipped"
                );
                TransactionError::SideEffectRevertFailed {
                    source,
                    original: Box::new(failure),
                }
            }
            Ok(_) => match guarded("cleanup_after_failure", self.work.cleanup_after_failure(ctx))
                .await
            {
                Ok(()) => failure,
                Err(source) => {
                    error!(
                        transaction_id = %transaction_id,
                        error = %source,
                        superseded = %failure,
                        "Cleanup after failure failed"
                    );
                    TransactionError::CleanupFailed {
                        source,
                        original: Box::new(failure),
                    }
                }
            },
        };

        self.work.on_failure(failure)
    }
}

/// Run a user hook, turning a panic into an ordinary failure so the
/// rollback path and the hold release still run
async fn guarded<F>(hook: &'static str, future: F) -> WorkResult
where
    F: Future<Output = WorkResult>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(hook, panic_msg = %message, "Transaction hook panicked");
            Err(format!("{} panicked: {}", hook, message).into())
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn advance(state: &mut TransactionState, next: TransactionState) {
    debug_assert!(
        state.can_transition_to(next),
        "invalid transition {} -> {}",
        state,
        next
    );
    debug!(from = %state, to = %next, "Transaction state change");
    *state = next;
}

impl<W: UnitOfWork> std::fmt::Debug for Transaction<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("work", &std::any::type_name::<W>())
            .field("id", &self.id)
            .field("state", &self.state)
            .field("lock_resource", &self.lock_resource)
            .field("side_effects", &self.side_effects)
            .field("notifies", &self.notification.is_some())
            .finish()
    }
}

/// Object-safe face of every transaction, used by chains and adapters
#[async_trait]
pub trait Executable: Send + 'static {
    /// Run the full lifecycle. Fails with the (possibly superseded) error
    /// after rollback has completed.
    async fn execute(&mut self, ctx: &ExecutionContext) -> Result<()>;

    /// Undo a transaction that already succeeded: revert its retained side
    /// effects LIFO, then run its cleanup
    async fn compensate(&mut self, ctx: &ExecutionContext) -> Result<()>;

    fn id(&self) -> Option<&str>;

    fn state(&self) -> TransactionState;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl dyn Executable {
    /// Recover the concrete transaction behind a trait object
    pub fn downcast_ref<W: UnitOfWork>(&self) -> Option<&Transaction<W>> {
        self.as_any().downcast_ref::<Transaction<W>>()
    }

    pub fn downcast_mut<W: UnitOfWork>(&mut self) -> Option<&mut Transaction<W>> {
        self.as_any_mut().downcast_mut::<Transaction<W>>()
    }

    /// Shortcut for `downcast_ref::<W>().map(Transaction::work)`
    pub fn work<W: UnitOfWork>(&self) -> Option<&W> {
        self.downcast_ref::<W>().map(|tx| tx.work())
    }
}

impl std::fmt::Debug for dyn Executable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executable")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}

#[async_trait]
impl<W: UnitOfWork> Executable for Transaction<W> {
    async fn execute(&mut self, ctx: &ExecutionContext) -> Result<()> {
        if self.state != TransactionState::Created {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: TransactionState::Validating.to_string(),
            }
            .into());
        }
        self.check_configuration(ctx)?;

        let transaction_id = ctx.id_provider().generate_id();
        self.id = Some(transaction_id.clone());
        info!(
            transaction_id = %transaction_id,
            work = %std::any::type_name::<W>(),
            lock = ?self.lock_resource,
            "Executing transaction"
        );

        let mut held: Option<(&dyn ExclusiveHold, String)> = None;
        let mut outcome = Ok(());

        if let (Some(resource), Some(holds)) = (self.lock_resource.clone(), ctx.holds()) {
            advance(&mut self.state, TransactionState::Locking);
            match holds.acquire(&resource).await {
                Ok(()) => held = Some((holds, resource)),
                Err(e) => outcome = Err(self.work.on_failure(e)),
            }
        }

        if outcome.is_ok() {
            // hooks are guarded individually; this catches panics from
            // side effect reverts and on_failure
            outcome = match AssertUnwindSafe(self.run_scoped(ctx)).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(
                        transaction_id = %transaction_id,
                        panic_msg = %message,
                        remaining_side_effects = self.side_effects.len(),
                        "Transaction panicked outside a guarded hook"
                    );
                    if !self.state.can_transition_to(TransactionState::Finalizing) {
                        advance(&mut self.state, TransactionState::RollingBack);
                    }
                    Err(TransactionError::PerformFailed(
                        format!("transaction panicked: {}", message).into(),
                    ))
                }
            };
        }

        advance(&mut self.state, TransactionState::Finalizing);
        if let Err(payload) = AssertUnwindSafe(self.work.finally(ctx)).catch_unwind().await {
            error!(
                transaction_id = %transaction_id,
                panic_msg = %panic_message(payload.as_ref()),
                "finally hook panicked"
            );
        }

        if let Some((holds, resource)) = held {
            if let Err(e) = holds.release(&resource).await {
                error!(
                    transaction_id = %transaction_id,
                    resource = %resource,
                    error = %e,
                    "Failed to release exclusive hold"
                );
                if outcome.is_ok() {
                    outcome = Err(e);
                }
            }
        }

        if let Err(e) = outcome {
            advance(&mut self.state, TransactionState::Failed);
            return Err(e);
        }

        advance(&mut self.state, TransactionState::Succeeded);
        info!(transaction_id = %transaction_id, "Transaction succeeded");

        if let Some(notification) = self.build_notification(ctx)? {
            if let Some(publisher) = ctx.publisher() {
                debug!(
                    transaction_id = %transaction_id,
                    notification = %notification.name,
                    "Publishing notification"
                );
                publisher.publish(notification).await?;
            }
        }

        Ok(())
    }

    async fn compensate(&mut self, ctx: &ExecutionContext) -> Result<()> {
        if self.state != TransactionState::Succeeded {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: TransactionState::Compensated.to_string(),
            }
            .into());
        }

        let transaction_id = self.id.clone().unwrap_or_default();
        info!(
            transaction_id = %transaction_id,
            side_effects = self.side_effects.len(),
            "Compensating transaction"
        );

        if let Err(source) = self.side_effects.revert_all().await {
            error!(transaction_id = %transaction_id, error = %source, "Compensation revert failed");
            return Err(TransactionError::CompensationFailed {
                transaction: transaction_id,
                source,
            });
        }
        let cleanup = self.work.cleanup_after_failure(ctx);
        if let Err(source) = guarded("cleanup_after_failure", cleanup).await {
            error!(transaction_id = %transaction_id, error = %source, "Compensation cleanup failed");
            return Err(TransactionError::CompensationFailed {
                transaction: transaction_id,
                source,
            });
        }

        advance(&mut self.state, TransactionState::Compensated);
        Ok(())
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn state(&self) -> TransactionState {
        self.state
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
