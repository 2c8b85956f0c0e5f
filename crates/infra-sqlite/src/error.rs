// sqlx::Error -> TransactionError::Store

use compensable_core::error::TransactionError;

/// Convert a sqlx error into a store error, keeping the SQLite result code
pub fn map_sqlx_error(err: sqlx::Error) -> TransactionError {
    match &err {
        sqlx::Error::Database(db_err) => match db_err.code() {
            // SQLite result codes: https://www.sqlite.org/rescode.html
            Some(code) => match code.as_ref() {
                "2067" | "1555" => TransactionError::Store(format!(
                    "Unique constraint violation: {} ({})",
                    db_err.message(),
                    code
                )),
                "787" | "3850" => TransactionError::Store(format!(
                    "Foreign key constraint violation: {} ({})",
                    db_err.message(),
                    code
                )),
                "5" => TransactionError::Store(format!(
                    "Database locked (SQLITE_BUSY): {}",
                    db_err.message()
                )),
                other => TransactionError::Store(format!(
                    "Database error [{}]: {}",
                    other,
                    db_err.message()
                )),
            },
            None => TransactionError::Store(format!("Database error: {}", db_err.message())),
        },
        sqlx::Error::RowNotFound => TransactionError::Store("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            TransactionError::Store(format!("Column not found: {}", col))
        }
        _ => TransactionError::Store(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found() {
        let err = map_sqlx_error(sqlx::Error::RowNotFound);
        assert_eq!(err.to_string(), "Store error: Row not found");
    }

    #[test]
    fn test_column_not_found() {
        let err = map_sqlx_error(sqlx::Error::ColumnNotFound("balance".to_string()));
        assert!(err.to_string().contains("balance"));
    }
}
