// Runner Configuration - environment variables with defaults

const DEFAULT_DB_PATH: &str = "~/.compensable/ledger.db";
const DEFAULT_TRANSFER_AMOUNT: i64 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Filesystem path of the ledger database (tilde expanded)
    pub db_path: String,
    pub log_format: LogFormat,
    /// Make the credit step fail so the transfer rolls back
    pub fail_credit: bool,
    pub transfer_amount: i64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            db_path: shellexpand::tilde(DEFAULT_DB_PATH).into_owned(),
            log_format: LogFormat::Pretty,
            fail_credit: false,
            transfer_amount: DEFAULT_TRANSFER_AMOUNT,
        }
    }
}

impl RunnerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or unparsable values keep their default
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let db_path = lookup("COMPENSABLE_DB_PATH")
            .map(|p| shellexpand::tilde(&p).into_owned())
            .unwrap_or(defaults.db_path);

        let log_format = match lookup("COMPENSABLE_LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        let fail_credit = lookup("COMPENSABLE_FAIL_CREDIT")
            .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
            .unwrap_or(defaults.fail_credit);

        let transfer_amount = lookup("COMPENSABLE_TRANSFER_AMOUNT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.transfer_amount);

        Self {
            db_path,
            log_format,
            fail_credit,
            transfer_amount,
        }
    }
}
