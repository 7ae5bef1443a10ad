//! Layered configuration: built-in defaults, then an optional
//! `config/bodega.toml`, then `BODEGA__*` environment variables.

use config::{Config, ConfigBuilder, ConfigError, Environment, File, builder::DefaultState};
use serde::Deserialize;
use thiserror::Error;

use crate::ledger::{DEFAULT_MAX_COMMIT_ATTEMPTS, DEFAULT_RETRY_BACKOFF};
use crate::query::{DEFAULT_HISTORY_LIMIT, DEFAULT_LOW_STOCK_THRESHOLD, MAX_HISTORY_LIMIT};

const CONFIG_FILE: &str = "config/bodega";
const ENV_PREFIX: &str = "BODEGA";
const DEFAULT_DATABASE_URL: &str = "postgres://localhost:5432/bodega";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// Read-plan-commit cycles per ledger operation before giving up on conflicts.
    pub max_commit_attempts: u32,
    /// Base delay in milliseconds before re-planning after a lost race.
    pub retry_backoff_ms: u64,
    pub low_stock_threshold: i64,
    /// Default movement history page size.
    pub history_limit: u32,
    /// JSON log lines instead of human-readable output.
    pub log_json: bool,
}

#[derive(Debug, Error)]
pub enum LedgerConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_commit_attempts: DEFAULT_MAX_COMMIT_ATTEMPTS,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF.as_millis() as u64,
            low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
            history_limit: DEFAULT_HISTORY_LIMIT,
            log_json: false,
        }
    }
}

impl LedgerConfig {
    /// Load from defaults, `config/bodega.{toml,...}` if present, and the environment.
    pub fn load() -> Result<Self, LedgerConfigError> {
        Self::from_builder(
            defaults()?
                .add_source(File::with_name(CONFIG_FILE).required(false))
                .add_source(Environment::with_prefix(ENV_PREFIX).separator("__")),
        )
    }

    /// Like [`LedgerConfig::load`] but with an explicit file in place of `config/bodega`.
    pub fn load_from(path: &str) -> Result<Self, LedgerConfigError> {
        Self::from_builder(
            defaults()?
                .add_source(File::with_name(path).required(true))
                .add_source(Environment::with_prefix(ENV_PREFIX).separator("__")),
        )
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, LedgerConfigError> {
        let config: LedgerConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LedgerConfigError> {
        if self.database_url.trim().is_empty() {
            return Err(LedgerConfigError::Invalid("database_url cannot be empty".into()));
        }
        if self.max_connections == 0 {
            return Err(LedgerConfigError::Invalid("max_connections must be at least 1".into()));
        }
        if self.max_commit_attempts == 0 {
            return Err(LedgerConfigError::Invalid(
                "max_commit_attempts must be at least 1".into(),
            ));
        }
        if self.low_stock_threshold < 0 {
            return Err(LedgerConfigError::Invalid(
                "low_stock_threshold cannot be negative".into(),
            ));
        }
        if self.history_limit == 0 || self.history_limit > MAX_HISTORY_LIMIT {
            return Err(LedgerConfigError::Invalid(format!(
                "history_limit must be within 1..={MAX_HISTORY_LIMIT}"
            )));
        }
        Ok(())
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let d = LedgerConfig::default();
    Config::builder()
        .set_default("database_url", d.database_url)?
        .set_default("max_connections", d.max_connections)?
        .set_default("max_commit_attempts", d.max_commit_attempts)?
        .set_default("retry_backoff_ms", d.retry_backoff_ms)?
        .set_default("low_stock_threshold", d.low_stock_threshold)?
        .set_default("history_limit", d.history_limit)?
        .set_default("log_json", d.log_json)
}

#[cfg(test)]
mod tests {
    use config::FileFormat;

    use super::*;

    fn from_toml(toml: &str) -> Result<LedgerConfig, LedgerConfigError> {
        LedgerConfig::from_builder(
            defaults()
                .unwrap()
                .add_source(File::from_str(toml, FileFormat::Toml)),
        )
    }

    #[test]
    fn defaults_are_valid() {
        let config = from_toml("").unwrap();
        assert_eq!(config, LedgerConfig::default());
        assert_eq!(config.max_commit_attempts, 5);
        assert_eq!(config.retry_backoff_ms, 5);
        assert_eq!(config.low_stock_threshold, 10);
        assert_eq!(config.history_limit, 50);
    }

    #[test]
    fn file_values_override_defaults() {
        let config = from_toml(
            r#"
            low_stock_threshold = 20
            history_limit = 100
            log_json = true
            "#,
        )
        .unwrap();
        assert_eq!(config.low_stock_threshold, 20);
        assert_eq!(config.history_limit, 100);
        assert!(config.log_json);
        assert_eq!(config.max_connections, 5);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        assert!(matches!(
            from_toml("max_commit_attempts = 0"),
            Err(LedgerConfigError::Invalid(_))
        ));
        assert!(matches!(
            from_toml("history_limit = 5000"),
            Err(LedgerConfigError::Invalid(_))
        ));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(from_toml("colour = \"red\""), Err(LedgerConfigError::Load(_))));
    }
}
