// Chained Transactions - sequential steps with reverse-order compensation

use super::context::ExecutionContext;
use super::transaction::{Executable, Transaction, UnitOfWork, WorkContext};
use crate::error::{BoxError, TransactionError, WorkResult};
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Builds a step from the steps completed before it, in completion order
pub type StepFactory = Box<
    dyn FnOnce(&[Box<dyn Executable>]) -> std::result::Result<Box<dyn Executable>, BoxError>
        + Send,
>;

/// One entry of a chain
pub enum ChainStep {
    /// A transaction built up front
    Ready(Box<dyn Executable>),
    /// A transaction built when the chain reaches it
    Deferred(StepFactory),
}

impl ChainStep {
    pub fn deferred<F>(factory: F) -> Self
    where
        F: FnOnce(&[Box<dyn Executable>]) -> std::result::Result<Box<dyn Executable>, BoxError>
            + Send
            + 'static,
    {
        ChainStep::Deferred(Box::new(factory))
    }

    fn kind(&self) -> &'static str {
        match self {
            ChainStep::Ready(_) => "ready",
            ChainStep::Deferred(_) => "deferred",
        }
    }
}

impl<W: UnitOfWork> From<Transaction<W>> for ChainStep {
    fn from(transaction: Transaction<W>) -> Self {
        ChainStep::Ready(Box::new(transaction))
    }
}

impl From<Box<dyn Executable>> for ChainStep {
    fn from(transaction: Box<dyn Executable>) -> Self {
        ChainStep::Ready(transaction)
    }
}

impl std::fmt::Debug for ChainStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainStep::Ready(tx) => f.debug_tuple("Ready").field(tx).finish(),
            ChainStep::Deferred(_) => f.write_str("Deferred"),
        }
    }
}

/// Ordered steps plus the ones that already completed
#[derive(Default)]
pub struct Chain {
    steps: Vec<ChainStep>,
    completed: Vec<Box<dyn Executable>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: impl Into<ChainStep>) {
        self.steps.push(step.into());
    }

    /// Steps not yet started
    pub fn pending(&self) -> usize {
        self.steps.len()
    }

    /// Completed steps, oldest first
    pub fn completed(&self) -> &[Box<dyn Executable>] {
        &self.completed
    }

    fn resolve(&self, position: usize, step: ChainStep) -> crate::error::Result<Box<dyn Executable>> {
        match step {
            ChainStep::Ready(tx) => Ok(tx),
            ChainStep::Deferred(factory) => {
                factory(&self.completed).map_err(|e| TransactionError::InvalidChainStep {
                    position,
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[async_trait]
impl UnitOfWork for Chain {
    async fn perform(&mut self, cx: &mut WorkContext<'_>) -> WorkResult {
        let steps = std::mem::take(&mut self.steps);
        let total = steps.len();

        for (position, step) in steps.into_iter().enumerate() {
            debug!(
                chain_id = %cx.transaction_id(),
                position,
                total,
                kind = step.kind(),
                "Running chain step"
            );

            let mut tx = self.resolve(position, step)?;
            if let Err(e) = tx.execute(cx.execution()).await {
                warn!(
                    chain_id = %cx.transaction_id(),
                    position,
                    error = %e,
                    skipped = total - position - 1,
                    "Chain step failed"
                );
                return Err(e.into());
            }
            self.completed.push(tx);
        }

        info!(chain_id = %cx.transaction_id(), steps = total, "Chain completed");
        Ok(())
    }

    /// Compensate completed steps, most recently completed first
    async fn cleanup_after_failure(&mut self, ctx: &ExecutionContext) -> WorkResult {
        while let Some(mut tx) = self.completed.pop() {
            debug!(step_id = ?tx.id(), "Compensating chain step");
            tx.compensate(ctx).await?;
        }
        Ok(())
    }
}

/// Transaction running a [`Chain`]
pub type ChainedTransaction = Transaction<Chain>;

impl ChainedTransaction {
    pub fn chain() -> Self {
        Transaction::new(Chain::new())
    }

    /// Append a step
    pub fn add(mut self, step: impl Into<ChainStep>) -> Self {
        self.work_mut().push(step);
        self
    }

    /// Append a step built from the steps completed before it
    pub fn add_deferred<F>(self, factory: F) -> Self
    where
        F: FnOnce(&[Box<dyn Executable>]) -> std::result::Result<Box<dyn Executable>, BoxError>
            + Send
            + 'static,
    {
        self.add(ChainStep::deferred(factory))
    }

    /// Append a sequence of steps, keeping their order
    pub fn add_all<I>(mut self, steps: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<ChainStep>,
    {
        for step in steps {
            self.work_mut().push(step);
        }
        self
    }

    pub fn completed(&self) -> &[Box<dyn Executable>] {
        self.work().completed()
    }
}
