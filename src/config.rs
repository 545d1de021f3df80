use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::messaging::ReconnectPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub broker: BrokerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_host")]
    pub host: String,

    #[serde(default = "default_db_port")]
    pub port: u16,

    #[serde(default = "default_db_user")]
    pub user: String,

    #[serde(default)]
    pub password: String,

    #[serde(default = "default_db_name")]
    pub dbname: String,

    #[serde(default = "default_sslmode")]
    pub sslmode: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Bootstrap servers, e.g. `127.0.0.1:9092`
    #[serde(default = "default_broker_url")]
    pub url: String,

    #[serde(default = "default_true")]
    pub auto_reconnect: bool,

    #[serde(default = "default_max_reconnects")]
    pub max_reconnects: u32,

    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,

    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            user: default_db_user(),
            password: String::new(),
            dbname: default_db_name(),
            sslmode: default_sslmode(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: default_broker_url(),
            auto_reconnect: true,
            max_reconnects: default_max_reconnects(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            operation_timeout_ms: default_operation_timeout_ms(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Load `path` if it exists, otherwise start from defaults, then apply
    /// environment overrides. Returns whether the file was found.
    pub fn load(path: impl AsRef<Path>) -> Result<(Self, bool), ConfigError> {
        let path = path.as_ref();
        let found = path.exists();
        let mut config = if found {
            Self::from_file(path)?
        } else {
            Self::default()
        };

        config.merge_env(|key| std::env::var(key).ok());
        Ok((config, found))
    }

    /// Merge `TENANT_*` variables into the config (they take precedence).
    pub fn merge_env<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) {
        if let Some(val) = lookup("TENANT_SERVER_HOST") {
            self.server.host = val;
        }
        if let Some(port) = lookup("TENANT_SERVER_PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }

        if let Some(val) = lookup("TENANT_DATABASE_HOST") {
            self.database.host = val;
        }
        if let Some(port) = lookup("TENANT_DATABASE_PORT").and_then(|v| v.parse().ok()) {
            self.database.port = port;
        }
        if let Some(val) = lookup("TENANT_DATABASE_USER") {
            self.database.user = val;
        }
        if let Some(val) = lookup("TENANT_DATABASE_PASSWORD") {
            self.database.password = val;
        }
        if let Some(val) = lookup("TENANT_DATABASE_DBNAME") {
            self.database.dbname = val;
        }
        if let Some(val) = lookup("TENANT_DATABASE_SSLMODE") {
            self.database.sslmode = val;
        }
        if let Some(max) = lookup("TENANT_DATABASE_MAX_CONNECTIONS").and_then(|v| v.parse().ok()) {
            self.database.max_connections = max;
        }

        if let Some(val) = lookup("TENANT_BROKER_URL") {
            self.broker.url = val;
        }
        if let Some(enabled) = lookup("TENANT_BROKER_AUTO_RECONNECT").and_then(|v| v.parse().ok()) {
            self.broker.auto_reconnect = enabled;
        }
        if let Some(max) = lookup("TENANT_BROKER_MAX_RECONNECTS").and_then(|v| v.parse().ok()) {
            self.broker.max_reconnects = max;
        }
        if let Some(delay) = lookup("TENANT_BROKER_RECONNECT_DELAY_MS").and_then(|v| v.parse().ok()) {
            self.broker.reconnect_delay_ms = delay;
        }
        if let Some(timeout) = lookup("TENANT_BROKER_OPERATION_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.broker.operation_timeout_ms = timeout;
        }
        if let Some(timeout) = lookup("TENANT_BROKER_ACQUIRE_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.broker.acquire_timeout_ms = timeout;
        }

        if let Some(val) = lookup("TENANT_LOG_LEVEL") {
            self.logging.level = val;
        }
        match lookup("TENANT_LOG_FORMAT").as_deref() {
            Some("json") => self.logging.format = LogFormat::Json,
            Some("pretty") => self.logging.format = LogFormat::Pretty,
            _ => {}
        }
    }
}

impl DatabaseConfig {
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.user, self.password, self.host, self.port, self.dbname, self.sslmode
        )
    }
}

impl BrokerConfig {
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            enabled: self.auto_reconnect,
            max_reconnects: self.max_reconnects,
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            acquire_timeout: Duration::from_millis(self.acquire_timeout_ms),
        }
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_db_host() -> String {
    "127.0.0.1".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_db_user() -> String {
    "postgres".to_string()
}

fn default_db_name() -> String {
    "tenant".to_string()
}

fn default_sslmode() -> String {
    "disable".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_broker_url() -> String {
    "127.0.0.1:9092".to_string()
}

fn default_max_reconnects() -> u32 {
    5
}

fn default_reconnect_delay_ms() -> u64 {
    2000
}

fn default_operation_timeout_ms() -> u64 {
    5000
}

fn default_acquire_timeout_ms() -> u64 {
    10_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}
