// Compensable Core - Transaction Engine & Ports
// NO infrastructure dependencies (hexagonal: adapters live in sibling crates)

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use application::{
    ChainedTransaction, ClosureTransaction, Executable, ExecutionContext, SideEffect,
    Transaction, UnitOfWork, WorkContext,
};
pub use error::{BoxError, Result, TransactionError, WorkResult};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
