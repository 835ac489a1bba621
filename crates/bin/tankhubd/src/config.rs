//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `tankhub.toml` in the working directory (or the path in
//! `TANKHUB_CONFIG`). Every field has a sensible default so the file is
//! optional. Environment variables take precedence over file values.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use tankhub_adapter_mqtt::MqttConfig;
use tankhub_app::resilient_store::RetryPolicy;
use tankhub_app::services::execution_coordinator::CoordinatorSettings;
use tankhub_domain::role::Role;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Database settings.
    pub database: DatabaseConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Backing-store timeout and retry settings.
    pub store: StoreConfig,
    /// Execution coordinator settings.
    pub coordinator: CoordinatorConfig,
    /// Work-log retention scheduling.
    pub retention: RetentionConfig,
    /// MQTT device transport.
    pub mqtt: MqttConfig,
    /// API credentials.
    pub auth: AuthConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to (e.g. `0.0.0.0`).
    pub host: String,
    /// TCP port.
    pub port: u16,
}

/// `SQLite` database configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `SQLite` connection URL or file path.
    pub url: String,
    pub max_connections: u32,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Deadline of a single backing-store call, in milliseconds.
    pub timeout_ms: u64,
    /// Attempts per call, including the first.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Lifetime of the start lock if its holder crashes.
    pub lock_ttl_secs: u64,
    /// Fail running executions silent for this long. Disabled when absent.
    pub stale_after_secs: Option<u64>,
    pub reaper_interval_secs: u64,
    /// Executions listed by the status endpoint.
    pub recent_executions: usize,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// How often to check whether an automatic cleanup is due.
    pub scheduler_interval_secs: u64,
}

/// Token → role table. Empty disables authentication.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub tokens: HashMap<String, Role>,
}

impl Config {
    /// Load configuration from `tankhub.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("TANKHUB_CONFIG").unwrap_or_else(|_| "tankhub.toml".to_string());
        let mut config = Self::from_file(&path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("TANKHUB_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = std::env::var("TANKHUB_PORT")
            && let Ok(port) = val.parse()
        {
            self.server.port = port;
        }
        if let Ok(val) = std::env::var("TANKHUB_BIND")
            && let Some((host, port)) = val.rsplit_once(':')
        {
            self.server.host = host.to_string();
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Ok(val) = std::env::var("TANKHUB_DATABASE_URL") {
            self.database.url = val;
        }
        if let Ok(val) = std::env::var("TANKHUB_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("TANKHUB_MQTT_HOST") {
            self.mqtt.broker_host = val;
            self.mqtt.enabled = true;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("port must be non-zero".to_string()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Validation(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        if self.store.max_attempts == 0 || self.store.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "store.max_attempts and store.timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.coordinator.lock_ttl_secs == 0 || self.coordinator.reaper_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "coordinator intervals must be non-zero".to_string(),
            ));
        }
        if self.retention.scheduler_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "retention.scheduler_interval_secs must be non-zero".to_string(),
            ));
        }
        if self.mqtt.enabled {
            let base = &self.mqtt.base_topic;
            if base.is_empty() || base.contains(['+', '#']) {
                return Err(ConfigError::Validation(
                    "mqtt.base_topic must be non-empty and free of wildcards".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Return the `host:port` bind address.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Return the database URL in `sqlx`-compatible format.
    #[must_use]
    pub fn database_url(&self) -> &str {
        &self.database.url
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(self.store.timeout_ms),
            max_attempts: self.store.max_attempts,
            initial_backoff: Duration::from_millis(self.store.initial_backoff_ms),
        }
    }

    #[must_use]
    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            lock_ttl: Duration::from_secs(self.coordinator.lock_ttl_secs),
            recent_limit: self.coordinator.recent_executions,
        }
    }

    /// Silence threshold after which the reaper fails an execution.
    #[must_use]
    pub fn stale_after(&self) -> Option<chrono::Duration> {
        self.coordinator
            .stale_after_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .map(chrono::Duration::seconds)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:tankhub.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "tankhubd=info,tankhub=info,tower_http=debug".to_string(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            timeout_ms: u64::try_from(policy.timeout.as_millis()).unwrap_or(5_000),
            max_attempts: policy.max_attempts,
            initial_backoff_ms: u64::try_from(policy.initial_backoff.as_millis()).unwrap_or(50),
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        let settings = CoordinatorSettings::default();
        Self {
            lock_ttl_secs: settings.lock_ttl.as_secs(),
            stale_after_secs: None,
            reaper_interval_secs: 30,
            recent_executions: settings.recent_limit,
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            scheduler_interval_secs: 3600,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_produce_sensible_defaults() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.database.url, "sqlite:tankhub.db?mode=rwc");
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.coordinator_settings(), CoordinatorSettings::default());
        assert!(config.stale_after().is_none());
        assert!(!config.mqtt.enabled);
        assert!(config.auth.tokens.is_empty());
    }

    #[test]
    fn should_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 3000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn should_parse_full_toml() {
        let toml = "
            [server]
            host = '127.0.0.1'
            port = 9090

            [database]
            url = 'sqlite:test.db'
            max_connections = 2

            [logging]
            filter = 'debug'

            [store]
            timeout_ms = 250
            max_attempts = 5
            initial_backoff_ms = 10

            [coordinator]
            lock_ttl_secs = 10
            stale_after_secs = 300
            reaper_interval_secs = 15
            recent_executions = 3

            [retention]
            scheduler_interval_secs = 60

            [mqtt]
            enabled = true
            broker_host = 'broker.local'
            base_topic = 'barn'

            [auth.tokens]
            'admin-secret' = 'admin'
            'pump-key' = 'device'
        ";
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.database.url, "sqlite:test.db");
        assert_eq!(config.database.max_connections, 2);
        assert_eq!(config.logging.filter, "debug");
        assert_eq!(config.retry_policy().timeout, Duration::from_millis(250));
        assert_eq!(config.retry_policy().max_attempts, 5);
        assert_eq!(config.coordinator_settings().lock_ttl, Duration::from_secs(10));
        assert_eq!(config.coordinator_settings().recent_limit, 3);
        assert_eq!(config.stale_after(), Some(chrono::Duration::minutes(5)));
        assert_eq!(config.retention.scheduler_interval_secs, 60);
        assert!(config.mqtt.enabled);
        assert_eq!(config.mqtt.broker_host, "broker.local");
        assert_eq!(config.auth.tokens.get("pump-key"), Some(&Role::Device));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn should_return_default_when_file_not_found() {
        let config = Config::from_file("nonexistent.toml").unwrap();
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn should_reject_zero_port() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_zero_store_attempts() {
        let mut config = Config::default();
        config.store.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_wildcard_base_topic_when_mqtt_enabled() {
        let mut config = Config::default();
        config.mqtt.base_topic = "farm/#".to_string();
        assert!(config.validate().is_ok());
        config.mqtt.enabled = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_unknown_role() {
        let result: Result<Config, _> = toml::from_str("[auth.tokens]\n'x' = 'root'");
        assert!(result.is_err());
    }

    #[test]
    fn should_format_bind_addr() {
        let mut config = Config::default();
        assert_eq!(config.bind_addr(), "0.0.0.0:3000");
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 9090;
        assert_eq!(config.bind_addr(), "127.0.0.1:9090");
    }

    #[test]
    fn should_report_parse_error_for_invalid_toml() {
        let result: Result<Config, _> = toml::from_str("invalid {{{");
        assert!(result.is_err());
    }
}
