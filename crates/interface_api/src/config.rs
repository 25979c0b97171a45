//! API configuration
//!
//! Values come from `API_`-prefixed environment variables, with `__` between
//! nested keys (`API_DATABASE__URL`). A `.env` file is read first when the
//! server binary starts.

use std::time::Duration;

use serde::Deserialize;

use core_kernel::{Currency, MoneyError, RetryPolicy};

/// Where aggregates and the ledger are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local maps; state is lost on restart
    #[default]
    Memory,
    /// PostgreSQL through infra_db
    Postgres,
}

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Database connection settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// PostgreSQL connection string
    pub url: String,
    /// Pool ceiling
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/backoffice".to_string(),
            max_connections: 10,
        }
    }
}

/// API configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    pub storage: StorageBackend,
    pub database: DatabaseSettings,
    /// Log level or `EnvFilter` directive
    pub log_level: String,
    pub log_format: LogFormat,
    /// Server-side deadline for a single request
    pub request_timeout_secs: u64,
    /// Attempts per tracker operation when a version conflict is hit
    pub max_conflict_retries: u32,
    /// Seconds between background drains of the pending posting queue; 0 disables
    pub retry_pending_interval_secs: u64,
    /// ISO code of the ledger currency
    pub currency: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            storage: StorageBackend::Memory,
            database: DatabaseSettings::default(),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            request_timeout_secs: 30,
            max_conflict_retries: 5,
            retry_pending_interval_secs: 60,
            currency: "USD".to_string(),
        }
    }
}

impl ApiConfig {
    /// Loads configuration from environment
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::with_prefix("API")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Returns the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_conflict_retries)
    }

    /// Ledger currency
    pub fn ledger_currency(&self) -> Result<Currency, MoneyError> {
        self.currency.parse()
    }

    /// Interval of the background pending-queue drain, if enabled
    pub fn retry_pending_interval(&self) -> Option<Duration> {
        (self.retry_pending_interval_secs > 0).then(|| Duration::from_secs(self.retry_pending_interval_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ApiConfig::default();
        assert_eq!(config.server_addr(), "0.0.0.0:8080");
        assert_eq!(config.storage, StorageBackend::Memory);
        assert_eq!(config.ledger_currency().unwrap(), Currency::USD);
        assert_eq!(config.retry_policy().max_attempts(), 5);
    }

    #[test]
    fn test_zero_timeout_is_raised_to_one_second() {
        let config = ApiConfig {
            request_timeout_secs: 0,
            ..ApiConfig::default()
        };
        assert_eq!(config.request_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_unknown_currency_is_rejected() {
        let config = ApiConfig {
            currency: "XYZ".to_string(),
            ..ApiConfig::default()
        };
        assert!(config.ledger_currency().is_err());
    }

    #[test]
    fn test_retry_drain_can_be_disabled() {
        let config = ApiConfig {
            retry_pending_interval_secs: 0,
            ..ApiConfig::default()
        };
        assert!(config.retry_pending_interval().is_none());
        assert_eq!(ApiConfig::default().retry_pending_interval(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_nested_keys_deserialize() {
        let config: ApiConfig = config::Config::builder()
            .set_override("storage", "postgres")
            .unwrap()
            .set_override("database.url", "postgres://db/test")
            .unwrap()
            .set_override("log_format", "json")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(config.storage, StorageBackend::Postgres);
        assert_eq!(config.database.url, "postgres://db/test");
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.port, 8080);
    }
}
