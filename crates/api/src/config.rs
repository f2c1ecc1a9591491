//! Application configuration loaded from environment variables.
//!
//! [`Config::from_env`] is called once in `main`; each component receives
//! its own section.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use event_channel::ChannelConfig;
use saga::{RestorePolicy, SagaConfig};
use thiserror::Error;

use crate::gateway::GatewayConfig;

/// Configuration problems that prevent start-up.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("TABLE_NAME rejected: {0}")]
    InvalidTableName(#[from] record_store::RecordStoreError),
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Where records live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub table_name: String,
    /// Postgres connection string. `None` selects the in-memory store.
    pub database_url: Option<String>,
    /// Re-derive the category and customer indexes at start-up.
    pub rebuild_indexes: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            table_name: "records".to_string(),
            database_url: None,
            rebuild_indexes: false,
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `pretty` or `json`
/// - `TABLE_NAME`, `DATABASE_URL`, `REBUILD_INDEXES`: record store
/// - `EVENT_BUS_NAME`, `CHANNEL_PARTITIONS`, `MAX_DELIVERY_ATTEMPTS`,
///   `HANDLER_TIMEOUT_MS`, `CHANNEL_RETAINED_EVENTS`: event channel
/// - `RESTORE_POLICY`, `SAGA_CONSUMERS`: saga participants
/// - `REQUEST_TIMEOUT_MS`: gateway deadline
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub store: StoreConfig,
    pub channel: ChannelConfig,
    pub saga: SagaConfig,
    pub gateway: GatewayConfig,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// Malformed values fall back to their defaults with a warning. An
    /// unusable table name is an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let table_name = lookup("TABLE_NAME").unwrap_or(defaults.store.table_name);
        record_store::validate_table_name(&table_name)?;

        let channel = ChannelConfig {
            bus_name: lookup("EVENT_BUS_NAME").unwrap_or(defaults.channel.bus_name),
            partitions: parse_or(&lookup, "CHANNEL_PARTITIONS", defaults.channel.partitions)
                .max(1),
            max_delivery_attempts: parse_or(
                &lookup,
                "MAX_DELIVERY_ATTEMPTS",
                defaults.channel.max_delivery_attempts,
            )
            .max(1),
            handler_timeout: millis_or(
                &lookup,
                "HANDLER_TIMEOUT_MS",
                defaults.channel.handler_timeout,
            ),
            idle_poll_interval: defaults.channel.idle_poll_interval,
            retained_events: parse_or(
                &lookup,
                "CHANNEL_RETAINED_EVENTS",
                defaults.channel.retained_events,
            )
            .max(1),
        };

        let saga = SagaConfig {
            restore_policy: parse_or(&lookup, "RESTORE_POLICY", RestorePolicy::default()),
            consumers_per_participant: parse_or(
                &lookup,
                "SAGA_CONSUMERS",
                defaults.saga.consumers_per_participant,
            )
            .max(1),
        };

        Ok(Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_or(&lookup, "PORT", defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: parse_or(&lookup, "LOG_FORMAT", defaults.log_format),
            store: StoreConfig {
                table_name,
                database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
                rebuild_indexes: parse_or(&lookup, "REBUILD_INDEXES", false),
            },
            channel,
            saga,
            gateway: GatewayConfig {
                request_timeout: millis_or(
                    &lookup,
                    "REQUEST_TIMEOUT_MS",
                    defaults.gateway.request_timeout,
                ),
            },
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
            store: StoreConfig::default(),
            channel: ChannelConfig::default(),
            saga: SagaConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(key, value = %raw, error = %e, fallback = %default, "ignoring malformed setting");
            default
        }
    }
}

fn millis_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: Duration) -> Duration {
    let millis = parse_or(lookup, key, default.as_millis() as u64);
    if millis == 0 {
        tracing::warn!(key, "zero timeout ignored");
        return default;
    }
    Duration::from_millis(millis)
}

impl Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}
