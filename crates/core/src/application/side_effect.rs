// Side Effects - individually revertible consequences of a transaction's work

use crate::error::BoxError;
use async_trait::async_trait;
use tracing::debug;

/// An action taken during `perform` that must be undone if the transaction fails
#[async_trait]
pub trait SideEffect: Send {
    /// Undo the action. Consumes the side effect so it can only run once.
    async fn revert(self: Box<Self>) -> Result<(), BoxError>;

    /// Short label for logs
    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

/// Side effect backed by a closure
pub struct RevertFn<F> {
    description: String,
    revert: F,
}

/// Build a side effect from a closure that undoes the action
pub fn revert_fn<F>(description: impl Into<String>, revert: F) -> RevertFn<F>
where
    F: FnOnce() -> Result<(), BoxError> + Send,
{
    RevertFn {
        description: description.into(),
        revert,
    }
}

#[async_trait]
impl<F> SideEffect for RevertFn<F>
where
    F: FnOnce() -> Result<(), BoxError> + Send,
{
    async fn revert(self: Box<Self>) -> Result<(), BoxError> {
        let RevertFn { revert, .. } = *self;
        revert()
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

/// LIFO stack of registered side effects, in registration order
#[derive(Default)]
pub struct SideEffectStack {
    effects: Vec<Box<dyn SideEffect>>,
}

impl SideEffectStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, effect: Box<dyn SideEffect>) {
        debug!(
            side_effect = %effect.describe(),
            depth = self.effects.len() + 1,
            "Side effect registered"
        );
        self.effects.push(effect);
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Pop and revert every side effect, most recently registered first.
    ///
    /// Stops at the first revert that fails; the remaining side effects stay
    /// on the stack.
    pub async fn revert_all(&mut self) -> Result<usize, BoxError> {
        let mut reverted = 0;
        while let Some(effect) = self.effects.pop() {
            let description = effect.describe();
            effect.revert().await?;
            debug!(side_effect = %description, "Side effect reverted");
            reverted += 1;
        }
        Ok(reverted)
    }
}

impl std::fmt::Debug for SideEffectStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.effects.iter().map(|e| e.describe()))
            .finish()
    }
}
