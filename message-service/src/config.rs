/// Configuration for the message service
///
/// Values come from environment variables; a `.env` file is loaded first when
/// present. Every setting has a default so the service starts with no
/// configuration at all.
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use shared::database::DatabaseConfig as StoreConnectionConfig;
use shared::observability::{LogConfig, LogFormat, LogLevel};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub broker: BrokerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub bootstrap_servers: String,
    pub client_id: String,
    pub message_timeout_ms: u64,
    pub flush_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "sqlite://messages.db".to_string(),
            },
            broker: BrokerConfig {
                bootstrap_servers: "localhost:9092".to_string(),
                client_id: "message-service".to_string(),
                message_timeout_ms: 30_000,
                flush_timeout_seconds: 15,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let defaults = Self::default();
        Ok(Self {
            server: ServerConfig {
                host: std::env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_var("SERVER_PORT", defaults.server.port)?,
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL").unwrap_or(defaults.database.url),
            },
            broker: BrokerConfig {
                bootstrap_servers: std::env::var("KAFKA_BOOTSTRAP_SERVERS")
                    .unwrap_or(defaults.broker.bootstrap_servers),
                client_id: std::env::var("KAFKA_CLIENT_ID").unwrap_or(defaults.broker.client_id),
                message_timeout_ms: parse_var(
                    "KAFKA_MESSAGE_TIMEOUT_MS",
                    defaults.broker.message_timeout_ms,
                )?,
                flush_timeout_seconds: parse_var(
                    "PUBLISH_FLUSH_TIMEOUT_SECONDS",
                    defaults.broker.flush_timeout_seconds,
                )?,
            },
            logging: LoggingConfig {
                level: std::env::var("LOG_LEVEL").unwrap_or(defaults.logging.level),
                format: std::env::var("LOG_FORMAT").unwrap_or(defaults.logging.format),
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            bail!("SERVER_PORT must be non-zero");
        }
        if self.database.url.trim().is_empty() {
            bail!("DATABASE_URL must not be empty");
        }
        if self.broker.bootstrap_servers.trim().is_empty() {
            bail!("KAFKA_BOOTSTRAP_SERVERS must not be empty");
        }
        if self.broker.flush_timeout_seconds == 0 {
            bail!("PUBLISH_FLUSH_TIMEOUT_SECONDS must be at least 1");
        }
        self.log_config()?;
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_secs(self.broker.flush_timeout_seconds)
    }

    pub fn store_config(&self) -> StoreConnectionConfig {
        StoreConnectionConfig {
            url: self.database.url.clone(),
            ..Default::default()
        }
    }

    pub fn log_config(&self) -> Result<LogConfig> {
        let level: LogLevel = self.logging.level.parse().context("Invalid LOG_LEVEL")?;
        let format: LogFormat = self.logging.format.parse().context("Invalid LOG_FORMAT")?;

        Ok(LogConfig {
            level,
            format,
            service_name: "message-service".to_string(),
            ..Default::default()
        })
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {}", name, value)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.flush_timeout(), Duration::from_secs(15));
        assert_eq!(config.broker.bootstrap_servers, "localhost:9092");
    }

    #[test]
    fn test_zero_flush_timeout_is_rejected() {
        let mut config = Config::default();
        config.broker.flush_timeout_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_bootstrap_servers_is_rejected() {
        let mut config = Config::default();
        config.broker.bootstrap_servers = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_log_format_is_rejected() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_store_config_uses_database_url() {
        let mut config = Config::default();
        config.database.url = "sqlite::memory:".to_string();
        assert_eq!(config.store_config().url, "sqlite::memory:");
    }

    #[test]
    fn test_parse_var_falls_back_to_default() {
        let port: u16 = parse_var("MESSAGE_SERVICE_TEST_UNSET_PORT", 9000).unwrap();
        assert_eq!(port, 9000);
    }
}
