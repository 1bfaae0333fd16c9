//! Configuration management for the rsauthz server.
//!
//! Configuration is layered:
//! 1. Default values (hardcoded)
//! 2. Configuration file (YAML)
//! 3. Environment variables (override)
//!
//! Environment variables use the `RSAUTHZ_` prefix and `__` as the nested key
//! separator, e.g. `RSAUTHZ_ENGINE__MAX_DEPTH=50` overrides `engine.max_depth`.
//!
//! # Example
//!
//! ```ignore
//! use rsauthz_server::config::ServerConfig;
//!
//! let config = ServerConfig::load("rsauthz.yaml")?;
//! let resolver = config.resolver_config();
//! ```

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use rsauthz_domain::resolver::ResolverConfig;
use serde::{Deserialize, Serialize};

const ENV_PREFIX: &str = "RSAUTHZ";

/// Server configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    /// Resolver limits
    #[serde(default)]
    pub engine: EngineSettings,

    /// Compiled schema cache
    #[serde(default)]
    pub schema_cache: SchemaCacheSettings,

    /// Storage settings
    #[serde(default)]
    pub storage: StorageSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Limits applied to check, expand and lookup.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EngineSettings {
    /// Maximum recursion depth of a single evaluation.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Deadline for one check/expand/lookup call, in milliseconds.
    #[serde(default = "default_check_timeout_ms")]
    pub check_timeout_ms: u64,

    /// Candidate checks run concurrently during lookup.
    #[serde(default = "default_lookup_concurrency")]
    pub lookup_concurrency: usize,

    /// Page size used when a lookup request does not set one.
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            check_timeout_ms: default_check_timeout_ms(),
            lookup_concurrency: default_lookup_concurrency(),
            default_page_size: default_page_size(),
        }
    }
}

fn default_max_depth() -> u32 {
    100
}

fn default_check_timeout_ms() -> u64 {
    30_000
}

fn default_lookup_concurrency() -> usize {
    16
}

fn default_page_size() -> u32 {
    50
}

/// Settings for the per-version compiled schema cache.
///
/// # Example YAML Configuration
///
/// ```yaml
/// schema_cache:
///   enabled: true
///   max_capacity: 1000
///   ttl_secs: 300
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SchemaCacheSettings {
    /// When disabled every request recompiles the stored DSL.
    /// Environment variable: `RSAUTHZ_SCHEMA_CACHE__ENABLED`
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum number of cached schema versions across tenants.
    #[serde(default = "default_cache_capacity")]
    pub max_capacity: u64,

    /// Time-to-live of a cached schema, in seconds.
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

impl Default for SchemaCacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_capacity: default_cache_capacity(),
            ttl_secs: default_cache_ttl(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cache_capacity() -> u64 {
    1000
}

fn default_cache_ttl() -> u64 {
    300
}

/// Storage backend settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StorageSettings {
    /// Storage backend type. Only "memory" is available.
    #[serde(default = "default_storage_backend")]
    pub backend: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
        }
    }
}

fn default_storage_backend() -> String {
    "memory".to_string()
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format (true for production, false for development)
    #[serde(default)]
    pub json: bool,

    /// Emit span enter/exit events
    #[serde(default)]
    pub spans: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            spans: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

fn invalid(message: impl Into<String>) -> ConfigLoadError {
    ConfigLoadError::Invalid {
        message: message.into(),
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(environment())
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;
        Ok(server_config)
    }

    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(environment())
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;
        Ok(server_config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.engine.max_depth == 0 {
            return Err(invalid("engine.max_depth must be greater than 0"));
        }
        if self.engine.check_timeout_ms == 0 {
            return Err(invalid("engine.check_timeout_ms must be greater than 0"));
        }
        if self.engine.lookup_concurrency == 0 {
            return Err(invalid("engine.lookup_concurrency must be greater than 0"));
        }
        if self.engine.default_page_size == 0 {
            return Err(invalid("engine.default_page_size must be greater than 0"));
        }

        if self.schema_cache.enabled && self.schema_cache.max_capacity == 0 {
            return Err(invalid(
                "schema_cache.max_capacity must be greater than 0 when the cache is enabled",
            ));
        }

        let valid_backends = ["memory"];
        if !valid_backends.contains(&self.storage.backend.as_str()) {
            return Err(invalid(format!(
                "storage.backend must be one of: {:?}, got: {}",
                valid_backends, self.storage.backend
            )));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(invalid(format!(
                "logging.level must be one of: {:?}, got: {}",
                valid_levels, self.logging.level
            )));
        }

        Ok(())
    }

    /// Resolver limits derived from the `engine` section.
    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig::default()
            .with_max_depth(self.engine.max_depth)
            .with_timeout(Duration::from_millis(self.engine.check_timeout_ms))
            .with_lookup_concurrency(self.engine.lookup_concurrency)
            .with_default_page_size(self.engine.default_page_size)
    }
}

// RSAUTHZ_ENGINE__MAX_DEPTH -> engine.max_depth
fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    #[serial]
    fn test_can_load_config_from_yaml_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
engine:
  max_depth: 25
  check_timeout_ms: 500
  lookup_concurrency: 4

schema_cache:
  enabled: false

storage:
  backend: memory

logging:
  level: debug
  json: true
  spans: true
"#
        )
        .unwrap();

        let config = ServerConfig::load(file.path()).unwrap();

        assert_eq!(config.engine.max_depth, 25);
        assert_eq!(config.engine.check_timeout_ms, 500);
        assert_eq!(config.engine.lookup_concurrency, 4);
        // Unset keys keep their defaults
        assert_eq!(config.engine.default_page_size, 50);
        assert!(!config.schema_cache.enabled);
        assert_eq!(config.schema_cache.ttl_secs, 300);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
        assert!(config.logging.spans);
    }

    #[test]
    #[serial]
    fn test_can_override_config_with_env_vars() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
engine:
  max_depth: 25
"#
        )
        .unwrap();

        std::env::set_var("RSAUTHZ_ENGINE__MAX_DEPTH", "7");
        std::env::set_var("RSAUTHZ_LOGGING__LEVEL", "warn");

        let config = ServerConfig::load(file.path());

        std::env::remove_var("RSAUTHZ_ENGINE__MAX_DEPTH");
        std::env::remove_var("RSAUTHZ_LOGGING__LEVEL");

        let config = config.unwrap();
        assert_eq!(config.engine.max_depth, 7);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    #[serial]
    fn test_from_env_loads_defaults_with_env_overrides() {
        std::env::set_var("RSAUTHZ_ENGINE__DEFAULT_PAGE_SIZE", "10");

        let config = ServerConfig::from_env();

        std::env::remove_var("RSAUTHZ_ENGINE__DEFAULT_PAGE_SIZE");

        let config = config.unwrap();
        assert_eq!(config.engine.default_page_size, 10);
        assert_eq!(config.engine.max_depth, 100);
        assert_eq!(config.storage.backend, "memory");
    }

    #[test]
    fn test_config_validation_catches_errors() {
        let mut config = ServerConfig::default();
        config.engine.max_depth = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigLoadError::Invalid { message }) if message.contains("max_depth")
        ));

        let mut config = ServerConfig::default();
        config.engine.check_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.engine.lookup_concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.storage.backend = "postgres".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigLoadError::Invalid { message }) if message.contains("storage.backend")
        ));

        let mut config = ServerConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());

        // Level matching is case-insensitive
        let mut config = ServerConfig::default();
        config.logging.level = "DEBUG".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_returns_clear_error() {
        let err = ServerConfig::load("/nonexistent/rsauthz.yaml").unwrap_err();
        assert!(matches!(err, ConfigLoadError::FileNotFound { .. }));
        assert!(err.to_string().contains("/nonexistent/rsauthz.yaml"));
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_resolver_config_mirrors_engine_settings() {
        let mut config = ServerConfig::default();
        config.engine.max_depth = 12;
        config.engine.check_timeout_ms = 250;
        config.engine.lookup_concurrency = 3;
        config.engine.default_page_size = 20;

        let resolver = config.resolver_config();
        assert_eq!(resolver.max_depth, 12);
        assert_eq!(resolver.timeout, Duration::from_millis(250));
        assert_eq!(resolver.lookup_concurrency, 3);
        assert_eq!(resolver.default_page_size, 20);
    }
}
