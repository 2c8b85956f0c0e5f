// SQLite Atomic Scope - one connection, nested scopes as savepoints

use crate::connection::open_connection;
use crate::error::map_sqlx_error;
use async_trait::async_trait;
use compensable_core::error::{Result, TransactionError};
use compensable_core::port::AtomicScope;
use sqlx::sqlite::SqliteConnection;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, warn};

struct StoreState {
    conn: SqliteConnection,
    depth: usize,
}

/// SQLite-backed atomic scope
///
/// The outermost scope is a real transaction; every nested scope is a
/// savepoint named after its depth, so an inner rollback only discards the
/// inner scope's statements.
pub struct SqliteStore {
    state: Mutex<StoreState>,
}

impl SqliteStore {
    pub fn new(conn: SqliteConnection) -> Self {
        Self {
            state: Mutex::new(StoreState { conn, depth: 0 }),
        }
    }

    pub async fn open(database_url: &str) -> Result<Self> {
        Ok(Self::new(open_connection(database_url).await?))
    }

    /// Connection for statements that belong to the current scope
    ///
    /// Drop the guard before the scope commits or rolls back.
    pub async fn connection(&self) -> MappedMutexGuard<'_, SqliteConnection> {
        MutexGuard::map(self.state.lock().await, |state| &mut state.conn)
    }

    /// Number of open scopes
    pub async fn depth(&self) -> usize {
        self.state.lock().await.depth
    }

    /// Run a statement outside any scope bookkeeping (schema setup)
    pub async fn execute(&self, sql: &str) -> Result<u64> {
        let mut conn = self.connection().await;
        let result = sqlx::query(sql)
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}

async fn run(conn: &mut SqliteConnection, sql: &str) -> Result<()> {
    sqlx::query(sql)
        .execute(conn)
        .await
        .map_err(map_sqlx_error)?;
    Ok(())
}

/// Undo and close a savepoint; both statements run even if the first fails
async fn discard_savepoint(conn: &mut SqliteConnection, name: &str) -> Result<()> {
    let rolled_back = run(conn, &format!("ROLLBACK TO SAVEPOINT {}", name)).await;
    let released = run(conn, &format!("RELEASE SAVEPOINT {}", name)).await;
    rolled_back.and(released)
}

fn no_open_scope(action: &str) -> TransactionError {
    TransactionError::Store(format!("cannot {} without an open scope", action))
}

#[async_trait]
impl AtomicScope for SqliteStore {
    async fn begin(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let depth = state.depth;

        if depth == 0 {
            run(&mut state.conn, "BEGIN").await?;
        } else {
            run(&mut state.conn, &format!("SAVEPOINT scope_{}", depth)).await?;
        }
        state.depth += 1;
        debug!(depth = state.depth, "Scope opened");
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.depth == 0 {
            return Err(no_open_scope("commit"));
        }
        state.depth -= 1;
        let depth = state.depth;

        if depth == 0 {
            if let Err(e) = run(&mut state.conn, "COMMIT").await {
                warn!(error = %e, "Commit failed, rolling back");
                if let Err(rollback_err) = run(&mut state.conn, "ROLLBACK").await {
                    warn!(error = %rollback_err, "Rollback after failed commit failed");
                }
                return Err(e);
            }
        } else {
            let savepoint = format!("scope_{}", depth);
            let released = run(&mut state.conn, &format!("RELEASE SAVEPOINT {}", savepoint)).await;
            if let Err(e) = released {
                warn!(error = %e, savepoint = %savepoint, "Release failed, discarding savepoint");
                if let Err(discard_err) = discard_savepoint(&mut state.conn, &savepoint).await {
                    warn!(error = %discard_err, "Discarding savepoint after failed release failed");
                }
                return Err(e);
            }
        }
        debug!(depth, "Scope committed");
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.depth == 0 {
            return Err(no_open_scope("roll back"));
        }
        state.depth -= 1;
        let depth = state.depth;

        if depth == 0 {
            run(&mut state.conn, "ROLLBACK").await?;
        } else {
            discard_savepoint(&mut state.conn, &format!("scope_{}", depth)).await?;
        }
        debug!(depth, "Scope rolled back");
        Ok(())
    }
}
