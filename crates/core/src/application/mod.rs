// Application Layer - transaction engine, closures, chains and responders

pub mod chain;
pub mod closure;
pub mod context;
pub mod responder;
pub mod side_effect;
pub mod transaction;

// Re-exports
pub use chain::{Chain, ChainStep, ChainedTransaction, StepFactory};
pub use closure::{ClosureTransaction, ClosureWork};
pub use context::{ExecutionContext, ExecutionContextBuilder};
pub use responder::{error_code, Responder, TransactionResponse};
pub use side_effect::{revert_fn, RevertFn, SideEffect, SideEffectStack};
pub use transaction::{Executable, Transaction, UnitOfWork, WorkContext};
