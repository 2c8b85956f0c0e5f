// Compensable Infrastructure - SQLite Adapter
// Implements: AtomicScope (nested scopes map to savepoints)

mod connection;
mod error;
mod store;

pub use connection::open_connection;
pub use error::map_sqlx_error;
pub use store::SqliteStore;

// Note: sqlx::Error conversion goes through map_sqlx_error
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for TransactionError here)
