// SQLite Connection Setup

use crate::error::map_sqlx_error;
use compensable_core::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteJournalMode};
use sqlx::ConnectOptions;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Open a single SQLite connection with WAL mode and foreign keys enabled
pub async fn open_connection(database_url: &str) -> Result<SqliteConnection> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(map_sqlx_error)?
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .create_if_missing(true)
        .foreign_keys(true);

    debug!(database_url, "Opening SQLite connection");
    options.connect().await.map_err(map_sqlx_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory() {
        let mut conn = open_connection("sqlite::memory:").await.unwrap();
        let fk: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&mut conn)
            .await
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[tokio::test]
    async fn test_invalid_url_is_store_error() {
        let err = open_connection("sqlite:///nonexistent-dir/nested/ledger.db").await.unwrap_err();
        assert!(matches!(
            err,
            compensable_core::error::TransactionError::Store(_)
        ));
    }
}
