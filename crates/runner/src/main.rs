//! Compensable Runner - Main Entry Point
//! Runs one ledger transfer as a chained, compensable transaction

mod config;
mod ledger;

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use compensable_core::application::{error_code, Executable, ExecutionContext};
use compensable_core::port::{ChannelPublisher, LocalHolds, SystemTimeProvider, UuidProvider};
use compensable_infra_sqlite::SqliteStore;
use config::{LogFormat, RunnerConfig};
use ledger::{Journal, TransferRequest};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn init_logging(format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("compensable=info"))?;

    match format {
        LogFormat::Json => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Pretty => {
            // Development: Pretty formatting with colors
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load configuration
    let config = RunnerConfig::from_env();

    // 2. Initialize logging
    init_logging(config.log_format)?;
    info!("Compensable runner v{} starting...", VERSION);

    // 3. Initialize database
    if let Some(parent) = Path::new(&config.db_path).parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    info!(db_path = %config.db_path, "Opening ledger...");
    let store = Arc::new(
        SqliteStore::open(&config.db_path)
            .await
            .map_err(|e| anyhow::anyhow!("Ledger open failed: {}", e))?,
    );
    ledger::prepare(&store, &[("alice", 100), ("bob", 0)])
        .await
        .map_err(|e| anyhow::anyhow!("Ledger setup failed: {}", e))?;

    // 4. Setup dependencies (DI wiring)
    let (publisher, mut notifications) = ChannelPublisher::new();
    let ctx = ExecutionContext::builder(store.clone())
        .with_holds(Arc::new(LocalHolds::new()))
        .with_publisher(Arc::new(publisher))
        .with_id_provider(Arc::new(UuidProvider))
        .with_time_provider(Arc::new(SystemTimeProvider))
        .build();

    // 5. Run the transfer
    let request = TransferRequest {
        from: "alice".to_string(),
        to: "bob".to_string(),
        amount: config.transfer_amount,
        reject_credit: config.fail_credit,
    };
    let journal = Journal::default();
    let mut transfer = ledger::transfer(store.clone(), journal.clone(), &request);
    let outcome = transfer.execute(&ctx).await;

    match &outcome {
        Ok(()) => info!(transaction_id = ?transfer.id(), "Transfer committed"),
        Err(e) => error!(
            transaction_id = ?transfer.id(),
            code = error_code(e),
            error = %e,
            "Transfer rolled back"
        ),
    }

    // 6. Report
    for account in [&request.from, &request.to] {
        let balance = ledger::find_balance(&store, account)
            .await
            .map_err(|e| anyhow::anyhow!("Balance lookup failed: {}", e))?;
        info!(account = %account, balance = ?balance, "Balance");
    }
    let lines = journal
        .lock()
        .map(|lines| lines.clone())
        .unwrap_or_default();
    info!(journal = ?lines, "Journal");

    while let Ok(notification) = notifications.try_recv() {
        info!(
            notification = %notification.name,
            transaction_id = ?notification.transaction_id,
            payload = %serde_json::to_string(&notification.payload)?,
            "Notification received"
        );
    }

    outcome.map_err(|e| anyhow::anyhow!("Transfer failed: {}", e))
}
