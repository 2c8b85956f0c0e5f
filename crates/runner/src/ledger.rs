// Ledger Transfer - debit, credit and journal steps chained under one hold

use async_trait::async_trait;
use compensable_core::application::{
    revert_fn, ChainedTransaction, ClosureTransaction, ExecutionContext, Transaction, UnitOfWork,
    WorkContext,
};
use compensable_core::domain::Notification;
use compensable_core::error::{Result, TransactionError, WorkResult};
use compensable_infra_sqlite::{map_sqlx_error, SqliteStore};
use serde_json::json;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

pub const LEDGER_RESOURCE: &str = "ledger";
pub const TRANSFER_COMPLETED: &str = "ledger.transfer.completed";

/// In-memory audit lines kept next to the ledger rows
pub type Journal = Arc<Mutex<Vec<String>>>;

fn append(journal: &Journal, line: &str) -> WorkResult {
    journal
        .lock()
        .map_err(|_| "journal lock poisoned")?
        .push(line.to_string());
    Ok(())
}

fn remove(journal: &Journal, line: &str) -> WorkResult {
    let mut lines = journal.lock().map_err(|_| "journal lock poisoned")?;
    match lines.iter().rposition(|l| l == line) {
        Some(index) => {
            lines.remove(index);
            Ok(())
        }
        None => Err(format!("journal line '{}' already gone", line).into()),
    }
}

/// Create the accounts table and open any missing accounts
pub async fn prepare(store: &SqliteStore, opening: &[(&str, i64)]) -> Result<()> {
    store
        .execute(
            "CREATE TABLE IF NOT EXISTS accounts (
                name TEXT PRIMARY KEY,
                balance INTEGER NOT NULL CHECK (balance >= 0)
            )",
        )
        .await?;

    let mut conn = store.connection().await;
    for (name, balance) in opening {
        sqlx::query("INSERT OR IGNORE INTO accounts (name, balance) VALUES (?, ?)")
            .bind(*name)
            .bind(*balance)
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
    }
    Ok(())
}

pub async fn find_balance(store: &SqliteStore, account: &str) -> Result<Option<i64>> {
    let mut conn = store.connection().await;
    sqlx::query_scalar("SELECT balance FROM accounts WHERE name = ?")
        .bind(account)
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_sqlx_error)
}

async fn adjust(store: &SqliteStore, account: &str, delta: i64) -> Result<()> {
    let mut conn = store.connection().await;
    let result = sqlx::query("UPDATE accounts SET balance = balance + ? WHERE name = ?")
        .bind(delta)
        .bind(account)
        .execute(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;

    if result.rows_affected() == 0 {
        return Err(TransactionError::Store(format!(
            "account '{}' disappeared",
            account
        )));
    }
    Ok(())
}

/// Withdraw from one account
pub struct Debit {
    store: Arc<SqliteStore>,
    journal: Journal,
    account: String,
    amount: i64,
}

#[async_trait]
impl UnitOfWork for Debit {
    async fn validate(&mut self, _ctx: &ExecutionContext) -> WorkResult {
        if self.amount <= 0 {
            return Err(format!("amount must be positive, got {}", self.amount).into());
        }
        match find_balance(&self.store, &self.account).await? {
            None => Err(format!("unknown account '{}'", self.account).into()),
            Some(balance) if balance < self.amount => Err(format!(
                "insufficient funds: '{}' has {}, needs {}",
                self.account, balance, self.amount
            )
            .into()),
            Some(_) => Ok(()),
        }
    }

    async fn perform(&mut self, cx: &mut WorkContext<'_>) -> WorkResult {
        adjust(&self.store, &self.account, -self.amount).await?;

        let line = format!("debit {} {}", self.account, self.amount);
        append(&self.journal, &line)?;
        let journal = self.journal.clone();
        cx.add_side_effect(revert_fn(format!("journal: {}", line), move || {
            remove(&journal, &line)
        }));

        debug!(account = %self.account, amount = self.amount, "Debited");
        Ok(())
    }
}

/// Deposit into one account; `reject` forces a failure after the deposit
pub struct Credit {
    store: Arc<SqliteStore>,
    journal: Journal,
    account: String,
    amount: i64,
    reject: bool,
}

#[async_trait]
impl UnitOfWork for Credit {
    async fn validate(&mut self, _ctx: &ExecutionContext) -> WorkResult {
        if find_balance(&self.store, &self.account).await?.is_none() {
            return Err(format!("unknown account '{}'", self.account).into());
        }
        Ok(())
    }

    async fn perform(&mut self, cx: &mut WorkContext<'_>) -> WorkResult {
        adjust(&self.store, &self.account, self.amount).await?;

        let line = format!("credit {} {}", self.account, self.amount);
        append(&self.journal, &line)?;
        let journal = self.journal.clone();
        cx.add_side_effect(revert_fn(format!("journal: {}", line), move || {
            remove(&journal, &line)
        }));

        if self.reject {
            return Err(format!("credit to '{}' rejected", self.account).into());
        }
        debug!(account = %self.account, amount = self.amount, "Credited");
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub from: String,
    pub to: String,
    pub amount: i64,
    pub reject_credit: bool,
}

/// Debit, credit and journal summary as one chain holding the ledger
pub fn transfer(
    store: Arc<SqliteStore>,
    journal: Journal,
    request: &TransferRequest,
) -> ChainedTransaction {
    let summary = format!(
        "transfer {} -> {}: {}",
        request.from, request.to, request.amount
    );
    let payload = json!({
        "from": request.from,
        "to": request.to,
        "amount": request.amount,
    });

    info!(
        from = %request.from,
        to = %request.to,
        amount = request.amount,
        "Preparing transfer"
    );

    ChainedTransaction::chain()
        .add(Transaction::new(Debit {
            store: store.clone(),
            journal: journal.clone(),
            account: request.from.clone(),
            amount: request.amount,
        }))
        .add(Transaction::new(Credit {
            store,
            journal: journal.clone(),
            account: request.to.clone(),
            amount: request.amount,
            reject: request.reject_credit,
        }))
        .add(ClosureTransaction::new_with_rollback(
            |(journal, line): &(Journal, String)| append(journal, line),
            |(journal, line): &(Journal, String)| remove(journal, line),
            (journal, summary),
        ))
        .with_lock(LEDGER_RESOURCE)
        .with_notification(move |tx: &ChainedTransaction| {
            let mut payload = payload.clone();
            payload["steps"] = json!(tx.completed().len());
            Notification::new(TRANSFER_COMPLETED)
                .for_transaction(tx.id().unwrap_or_default())
                .with_payload(payload)
        })
}
