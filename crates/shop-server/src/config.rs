//! Server configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shop_auth::RateLimitConfig;
use shop_commerce::catalog::StockScope;
use shop_commerce::checkout::OrderConfig;
use shop_commerce::payment::PaymentPolicy;
use shop_commerce::retry::RetryPolicy;

use crate::logging::LoggingConfig;

/// Server configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ListenConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub orders: OrdersConfig,

    /// Minimum amount and refund limits.
    #[serde(default)]
    pub payments: PaymentPolicy,

    #[serde(default)]
    pub outbox: OutboxConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl ServerConfig {
    /// Load config from a file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display()))
        }
    }
}

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListenConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

/// Where documents are stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    /// SQLite file, created on first start.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("shop.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

/// Event relay settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutboxConfig {
    /// Pause between relay passes.
    #[serde(default = "default_relay_interval_ms")]
    pub relay_interval_ms: u64,

    /// Events published per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_relay_interval_ms() -> u64 {
    1000
}

fn default_batch_size() -> usize {
    100
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            relay_interval_ms: default_relay_interval_ms(),
            batch_size: default_batch_size(),
        }
    }
}

impl OutboxConfig {
    pub fn relay_interval(&self) -> Duration {
        Duration::from_millis(self.relay_interval_ms.max(1))
    }
}

/// Order placement settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrdersConfig {
    /// Count only the order branch's stock for variant lines.
    #[serde(default)]
    pub branch_scoped_stock: bool,

    /// Give up waiting for the store after this long.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_timeout_ms: Option<u64>,

    /// Retry keyed creations once after a transient store failure.
    #[serde(default = "default_true")]
    pub retry_transient_once: bool,
}

fn default_true() -> bool {
    true
}

impl Default for OrdersConfig {
    fn default() -> Self {
        Self {
            branch_scoped_stock: false,
            transaction_timeout_ms: None,
            retry_transient_once: true,
        }
    }
}

impl OrdersConfig {
    pub fn to_order_config(&self) -> OrderConfig {
        OrderConfig {
            stock_scope: if self.branch_scoped_stock {
                StockScope::OrderBranch
            } else {
                StockScope::AllLocations
            },
            retry: if self.retry_transient_once {
                RetryPolicy::default()
            } else {
                RetryPolicy::none()
            },
            transaction_timeout: self.transaction_timeout_ms.map(Duration::from_millis),
            ..OrderConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogFormat;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.payments.max_refund_attempts, 3);
        assert_eq!(config.payments.refund_window_days, 30);
        assert_eq!(config.payments.min_amount, 1000);
        assert_eq!(config.database.path, PathBuf::from("shop.db"));
        assert_eq!(config.outbox.relay_interval(), Duration::from_secs(1));
        assert_eq!(config.outbox.batch_size, 100);
        assert!(config.orders.retry_transient_once);
    }

    #[test]
    fn test_parse_toml() {
        let config: ServerConfig = toml::from_str(
            r#"
            [server]
            bind = "0.0.0.0:9000"

            [logging]
            level = "debug"
            format = "json"

            [orders]
            branch_scoped_stock = true
            transaction_timeout_ms = 1500
            retry_transient_once = false

            [database]
            path = "/var/lib/shop/orders.db"

            [payments]
            max_refund_attempts = 5
            min_amount = 5000

            [outbox]
            relay_interval_ms = 250

            [rate_limit]
            max_requests = 10
            window_secs = 1
            "#,
        )
        .unwrap();

        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.payments.max_refund_attempts, 5);
        assert_eq!(config.payments.refund_window_days, 30);
        assert_eq!(config.payments.min_amount, 5000);
        assert_eq!(config.database.path, PathBuf::from("/var/lib/shop/orders.db"));
        assert_eq!(config.outbox.relay_interval(), Duration::from_millis(250));
        assert_eq!(config.outbox.batch_size, 100);
        assert_eq!(config.rate_limit.max_requests, 10);

        let orders = config.orders.to_order_config();
        assert_eq!(orders.stock_scope, StockScope::OrderBranch);
        assert_eq!(orders.transaction_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(orders.retry.max_attempts, 0);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = ServerConfig::load("/definitely/not/here/shop.toml").unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn test_load_json() {
        let path = std::env::temp_dir().join(format!("shop-server-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"server": {"bind": "127.0.0.1:7000"}}"#).unwrap();
        let config = ServerConfig::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(config.server.bind, "127.0.0.1:7000");
    }
}
