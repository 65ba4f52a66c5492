//! Data-access configuration.
//!
//! # Invariants
//! - Every field has a default, so a partial JSON document is accepted.
//! - A loaded config is validated before it is returned.

use crate::cache::serializer::{validate_type_property, DEFAULT_TYPE_PROPERTY};
use crate::db::DbOptions;
use crate::logging::default_log_level;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "failed to parse config: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub database_path: PathBuf,
    pub busy_timeout_ms: u64,
    pub foreign_keys: bool,
    /// Emits statement text at debug level.
    pub log_sql: bool,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data.sqlite3"),
            busy_timeout_ms: 5_000,
            foreign_keys: true,
            log_sql: false,
            cache: CacheConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl DataConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "database_path cannot be empty".to_string(),
            ));
        }
        if self.busy_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "busy_timeout_ms must be greater than zero".to_string(),
            ));
        }
        validate_type_property(&self.cache.type_property)
            .map_err(|err| ConfigError::Invalid(format!("cache.type_property: {err}")))?;
        Ok(())
    }

    pub fn db_options(&self) -> DbOptions {
        DbOptions {
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
            foreign_keys: self.foreign_keys,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Prepended to every key the cache service touches.
    pub key_prefix: String,
    pub type_property: String,
    /// Applied by `CacheService::save_default`; `0` means no expiry.
    pub default_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key_prefix: String::new(),
            type_property: DEFAULT_TYPE_PROPERTY.to_string(),
            default_ttl_seconds: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Absolute directory for rotated log files; stderr when unset.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level().to_string(),
            directory: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, DataConfig};
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn partial_document_keeps_defaults() {
        let config = DataConfig::from_json_str(
            r#"{"database_path": "/tmp/app.db", "cache": {"key_prefix": "app:"}}"#,
        )
        .expect("partial config should load");

        assert_eq!(config.busy_timeout_ms, 5_000);
        assert!(config.foreign_keys);
        assert!(!config.log_sql);
        assert_eq!(config.cache.key_prefix, "app:");
        assert_eq!(config.cache.type_property, "@type");
        assert_eq!(config.cache.default_ttl_seconds, 0);
        assert!(config.logging.directory.is_none());
    }

    #[test]
    fn validate_rejects_empty_path_and_zero_timeout() {
        let err = DataConfig::from_json_str(r#"{"database_path": ""}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(message) if message.contains("database_path")));

        let err = DataConfig::from_json_str(r#"{"busy_timeout_ms": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(message) if message.contains("busy_timeout")));
    }

    #[test]
    fn validate_rejects_type_property_that_shadows_payload() {
        let err = DataConfig::from_json_str(r#"{"cache": {"type_property": "value"}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(message) if message.contains("type_property")));

        let err = DataConfig::from_json_str(r#"{"cache": {"type_property": " "}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = DataConfig::from_json_str("{ nope").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn loads_from_file_and_maps_db_options() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{"database_path": "/srv/data.db", "busy_timeout_ms": 250, "foreign_keys": false}}"#
        )
        .expect("write config");

        let config = DataConfig::from_json_file(file.path()).expect("config should load");
        let options = config.db_options();
        assert_eq!(options.busy_timeout, Duration::from_millis(250));
        assert!(!options.foreign_keys);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = DataConfig::from_json_file("/definitely/not/here.json").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.json"));
    }
}
