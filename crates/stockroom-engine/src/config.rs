//! # Engine Configuration
//!
//! Configuration for the inventory engine.
//!
//! ## Configuration Sources (Priority Order)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   Configuration Priority                                │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     STOCKROOM_DATABASE_PATH, STOCKROOM_CACHE_BACKEND, REDIS_URL, ...   │
//! │                                                                         │
//! │  2. TOML file (path from STOCKROOM_CONFIG)                             │
//! │     [cache] backend = "redis"                                          │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     ./stockroom.db, in-memory cache, reject negative stock             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example stockroom.toml
//! ```toml
//! database_path = "/var/lib/stockroom/stockroom.db"
//! max_connections = 8
//!
//! [cache]
//! backend = "redis"
//! redis_url = "redis://127.0.0.1:6379"
//! stock_ttl_secs = 60
//!
//! [stock]
//! allow_negative_stock = false
//!
//! [write]
//! timeout_ms = 5000
//! max_retries = 3
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use stockroom_core::StockPolicy;
use stockroom_db::DbConfig;

/// Environment variable naming the TOML config file.
pub const CONFIG_PATH_ENV: &str = "STOCKROOM_CONFIG";

// =============================================================================
// Errors
// =============================================================================

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

// =============================================================================
// Cache Settings
// =============================================================================

/// Which cache backend the engine runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// No cache; every read goes to the database.
    None,

    /// Process-local cache.
    #[default]
    Memory,

    /// Shared Redis cache for multi-process deployments.
    Redis,
}

impl fmt::Display for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheMode::None => write!(f, "none"),
            CacheMode::Memory => write!(f, "memory"),
            CacheMode::Redis => write!(f, "redis"),
        }
    }
}

impl FromStr for CacheMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "off" => Ok(CacheMode::None),
            "memory" => Ok(CacheMode::Memory),
            "redis" => Ok(CacheMode::Redis),
            _ => Err(ConfigError::InvalidValue {
                key: "cache.backend".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default)]
    pub backend: CacheMode,

    /// Required when `backend = "redis"`.
    #[serde(default)]
    pub redis_url: Option<String>,

    /// TTL for point and bulk stock entries.
    #[serde(default = "default_stock_ttl")]
    pub stock_ttl_secs: u64,

    /// TTL for report entries.
    #[serde(default = "default_report_ttl")]
    pub report_ttl_secs: u64,
}

fn default_stock_ttl() -> u64 {
    60
}

fn default_report_ttl() -> u64 {
    30
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            backend: CacheMode::default(),
            redis_url: None,
            stock_ttl_secs: default_stock_ttl(),
            report_ttl_secs: default_report_ttl(),
        }
    }
}

// =============================================================================
// Stock Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockSettings {
    /// Global negative-stock policy. Stores may override it.
    #[serde(default)]
    pub allow_negative_stock: bool,

    /// How long a raised low-stock alert stays in the cache.
    #[serde(default = "default_alert_ttl")]
    pub low_stock_alert_ttl_secs: u64,
}

fn default_alert_ttl() -> u64 {
    86_400
}

impl Default for StockSettings {
    fn default() -> Self {
        StockSettings {
            allow_negative_stock: false,
            low_stock_alert_ttl_secs: default_alert_ttl(),
        }
    }
}

// =============================================================================
// Write Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteSettings {
    /// Upper bound on one append, including lock wait and retries.
    #[serde(default = "default_write_timeout")]
    pub timeout_ms: u64,

    /// Attempts after the first one for transient store errors.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_write_timeout() -> u64 {
    5_000
}
fn default_max_retries() -> u32 {
    3
}
fn default_initial_backoff() -> u64 {
    50
}
fn default_max_backoff() -> u64 {
    1_000
}

impl Default for WriteSettings {
    fn default() -> Self {
        WriteSettings {
            timeout_ms: default_write_timeout(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

// =============================================================================
// Engine Config
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub stock: StockSettings,

    #[serde(default)]
    pub write: WriteSettings,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./stockroom.db")
}

fn default_max_connections() -> u32 {
    5
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            database_path: default_database_path(),
            max_connections: default_max_connections(),
            cache: CacheSettings::default(),
            stock: StockSettings::default(),
            write: WriteSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (`config_path`, else `$STOCKROOM_CONFIG`)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = config_path.or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => {
                debug!("No config file given, using defaults");
                Self::default()
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Parses a TOML config file. Missing sections fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        info!(path = %path.display(), "Loading engine config from file");
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&contents)?)
    }

    /// Applies overrides from a key lookup (the process environment in
    /// production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("STOCKROOM_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database_path = PathBuf::from(path);
        }
        if let Some(v) = lookup("STOCKROOM_MAX_CONNECTIONS") {
            self.max_connections = parse("STOCKROOM_MAX_CONNECTIONS", &v)?;
        }
        if let Some(v) = lookup("STOCKROOM_CACHE_BACKEND") {
            self.cache.backend = v.parse()?;
        }
        if let Some(url) = lookup("REDIS_URL") {
            self.cache.redis_url = Some(url);
        }
        if let Some(v) = lookup("STOCKROOM_STOCK_TTL_SECS") {
            self.cache.stock_ttl_secs = parse("STOCKROOM_STOCK_TTL_SECS", &v)?;
        }
        if let Some(v) = lookup("STOCKROOM_REPORT_TTL_SECS") {
            self.cache.report_ttl_secs = parse("STOCKROOM_REPORT_TTL_SECS", &v)?;
        }
        if let Some(v) = lookup("STOCKROOM_ALLOW_NEGATIVE_STOCK") {
            self.stock.allow_negative_stock = parse("STOCKROOM_ALLOW_NEGATIVE_STOCK", &v)?;
        }
        if let Some(v) = lookup("STOCKROOM_WRITE_TIMEOUT_MS") {
            self.write.timeout_ms = parse("STOCKROOM_WRITE_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("STOCKROOM_MAX_RETRIES") {
            self.write.max_retries = parse("STOCKROOM_MAX_RETRIES", &v)?;
        }
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.backend == CacheMode::Redis && self.cache.redis_url.is_none() {
            return Err(ConfigError::MissingRequired("REDIS_URL".to_string()));
        }
        if self.max_connections == 0 {
            return Err(invalid("max_connections", "0"));
        }
        if self.write.timeout_ms == 0 {
            return Err(invalid("write.timeout_ms", "0"));
        }
        if self.write.initial_backoff_ms > self.write.max_backoff_ms {
            return Err(invalid(
                "write.initial_backoff_ms",
                &self.write.initial_backoff_ms.to_string(),
            ));
        }
        Ok(())
    }

    // =========================================================================
    // Builders (tests and embedding)
    // =========================================================================

    /// Defaults pointing at an in-memory database with the memory cache.
    pub fn in_memory() -> Self {
        EngineConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1,
            ..Default::default()
        }
    }

    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    pub fn with_cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache.backend = mode;
        self
    }

    pub fn with_allow_negative_stock(mut self, allow: bool) -> Self {
        self.stock.allow_negative_stock = allow;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write.timeout_ms = timeout.as_millis().max(1) as u64;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.write.max_retries = retries;
        self
    }

    // =========================================================================
    // Derived Values
    // =========================================================================

    /// Database pool configuration.
    pub fn db_config(&self) -> DbConfig {
        if self.database_path.as_os_str() == ":memory:" {
            DbConfig::in_memory()
        } else {
            DbConfig::new(&self.database_path).max_connections(self.max_connections)
        }
    }

    /// Global stock policy.
    pub fn stock_policy(&self) -> StockPolicy {
        StockPolicy {
            allow_negative: self.stock.allow_negative_stock,
        }
    }

    pub fn stock_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.stock_ttl_secs)
    }

    pub fn report_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.report_ttl_secs)
    }

    pub fn alert_ttl(&self) -> Duration {
        Duration::from_secs(self.stock.low_stock_alert_ttl_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write.timeout_ms)
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.database_path, PathBuf::from("./stockroom.db"));
        assert_eq!(config.cache.backend, CacheMode::Memory);
        assert_eq!(config.stock_ttl(), Duration::from_secs(60));
        assert_eq!(config.report_ttl(), Duration::from_secs(30));
        assert!(!config.stock.allow_negative_stock);
        assert_eq!(config.write_timeout(), Duration::from_secs(5));
        assert_eq!(config.write.max_retries, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_partial_file_keeps_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            database_path = "/tmp/inv.db"

            [stock]
            allow_negative_stock = true
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/inv.db"));
        assert!(config.stock.allow_negative_stock);
        assert_eq!(config.cache.stock_ttl_secs, 60);
        assert_eq!(config.write.max_retries, 3);
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stockroom.toml");
        std::fs::write(&path, "[cache]\nbackend = \"none\"\nstock_ttl_secs = 10\n").unwrap();

        let mut config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.cache.backend, CacheMode::None);

        config
            .apply_overrides(env(&[
                ("STOCKROOM_CACHE_BACKEND", "memory"),
                ("STOCKROOM_MAX_RETRIES", "7"),
            ]))
            .unwrap();

        assert_eq!(config.cache.backend, CacheMode::Memory);
        assert_eq!(config.cache.stock_ttl_secs, 10);
        assert_eq!(config.write.max_retries, 7);
    }

    #[test]
    fn test_invalid_env_value_is_an_error() {
        let mut config = EngineConfig::default();
        let err = config
            .apply_overrides(env(&[("STOCKROOM_WRITE_TIMEOUT_MS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        assert!(config
            .apply_overrides(env(&[("STOCKROOM_CACHE_BACKEND", "memcached")]))
            .is_err());
    }

    #[test]
    fn test_redis_requires_url() {
        let config = EngineConfig::default().with_cache_mode(CacheMode::Redis);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingRequired(_))
        ));
    }

    #[test]
    fn test_in_memory_db_config() {
        assert!(EngineConfig::in_memory().db_config().is_in_memory());
        assert!(!EngineConfig::default().db_config().is_in_memory());
    }
}
