//! Process configuration, loaded once at start-up.
//!
//! Configuration is a flat TOML table. Every key is optional; missing keys fall
//! back to the defaults below.
//!
//! ```toml
//! db_path = "mcap.db"
//! cache_size = 128
//! log_path = "query_log.txt"
//! date_format = "%Y-%m-%d"
//! log_max_bytes = 1048576
//! log_backup_count = 5
//! busy_timeout_ms = 50
//! ```

use chrono::NaiveDate;
use chrono::format::{Item, StrftimeItems};
use mcapdb_core::{LookupError, Result};
use serde::Deserialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Settings for a [`LookupContext`](crate::LookupContext).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LookupConfig {
    /// Location of the SQLite store file.
    pub db_path: PathBuf,
    /// Maximum number of cached lookups.
    pub cache_size: usize,
    /// Location of the append-only call log.
    pub log_path: PathBuf,
    /// `strftime` format that text dates must match.
    pub date_format: String,
    /// Size at which the call log is rolled over.
    pub log_max_bytes: u64,
    /// Number of rolled-over call logs to keep.
    pub log_backup_count: usize,
    /// Upper bound on how long a query waits for a locked store, in milliseconds.
    pub busy_timeout_ms: u64,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("mcap.db"),
            cache_size: 128,
            log_path: PathBuf::from("query_log.txt"),
            date_format: "%Y-%m-%d".to_string(),
            log_max_bytes: 1_048_576,
            log_backup_count: 5,
            busy_timeout_ms: 50,
        }
    }
}

impl LookupConfig {
    /// Load configuration from `path`, falling back to defaults if the file does not exist.
    ///
    /// # Errors
    /// Returns [`LookupError::Config`] if the file exists but cannot be read, parsed or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "Config file not found, using defaults");
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }
        Self::from_path(path)
    }

    /// Read and validate configuration from a TOML file.
    ///
    /// # Errors
    /// Returns [`LookupError::Config`] if the file cannot be read, parsed or validated.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            LookupError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config = Self::from_toml_str(&contents)?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse and validate configuration from TOML text.
    ///
    /// # Errors
    /// Returns [`LookupError::Config`] if the text is not valid TOML or fails validation.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| LookupError::Config(format!("failed to parse config TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every setting is usable.
    ///
    /// # Errors
    /// Returns [`LookupError::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.db_path.as_os_str().is_empty() {
            return Err(invalid("db_path", "must not be empty"));
        }
        if self.log_path.as_os_str().is_empty() {
            return Err(invalid("log_path", "must not be empty"));
        }
        if self.cache_size == 0 {
            return Err(invalid("cache_size", "must be > 0"));
        }
        if self.log_max_bytes == 0 {
            return Err(invalid("log_max_bytes", "must be > 0"));
        }
        if !date_format_round_trips(&self.date_format) {
            return Err(invalid(
                "date_format",
                &format!("{:?} cannot format and parse a calendar date", self.date_format),
            ));
        }
        Ok(())
    }

    /// Busy timeout as a [`Duration`].
    #[must_use]
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

fn invalid(field: &str, reason: &str) -> LookupError {
    LookupError::Config(format!("invalid value for {field}: {reason}"))
}

fn date_format_round_trips(format: &str) -> bool {
    let items: Vec<Item<'_>> = StrftimeItems::new(format).collect();
    if items.is_empty() || items.iter().any(|item| matches!(item, Item::Error)) {
        return false;
    }
    let Some(sample) = NaiveDate::from_ymd_opt(2024, 12, 31) else {
        return false;
    };
    let mut rendered = String::new();
    if write!(rendered, "{}", sample.format_with_items(items.into_iter())).is_err() {
        return false;
    }
    NaiveDate::parse_from_str(&rendered, format).is_ok_and(|parsed| parsed == sample)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LookupConfig::default();
        assert_eq!(config.db_path, PathBuf::from("mcap.db"));
        assert_eq!(config.cache_size, 128);
        assert_eq!(config.log_path, PathBuf::from("query_log.txt"));
        assert_eq!(config.busy_timeout(), Duration::from_millis(50));
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = LookupConfig::from_toml_str(
            r#"
            db_path = "/data/daily.db"
            cache_size = 4096
            "#,
        )
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/data/daily.db"));
        assert_eq!(config.cache_size, 4096);
        assert_eq!(config.log_path, PathBuf::from("query_log.txt"));
        assert_eq!(config.date_format, "%Y-%m-%d");
    }

    #[test]
    fn test_rejects_unknown_keys() {
        let err = LookupConfig::from_toml_str("table_name = \"mcap\"").unwrap_err();
        assert!(matches!(err, LookupError::Config(_)));
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(LookupConfig::from_toml_str("cache_size = 0").is_err());
        assert!(LookupConfig::from_toml_str("log_max_bytes = 0").is_err());
        assert!(LookupConfig::from_toml_str("db_path = \"\"").is_err());
        assert!(LookupConfig::from_toml_str("cache_size = -1").is_err());
    }

    #[test]
    fn test_date_format_validation() {
        assert!(date_format_round_trips("%Y-%m-%d"));
        assert!(date_format_round_trips("%d/%m/%Y"));
        assert!(!date_format_round_trips("%Y-%m"));
        assert!(!date_format_round_trips("%H:%M"));
        assert!(!date_format_round_trips("%Q"));
        assert!(!date_format_round_trips(""));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = LookupConfig::load(dir.path().join("config.toml")).unwrap();
        assert_eq!(config, LookupConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "log_path = \"calls.log\"\nlog_backup_count = 2\n").unwrap();

        let config = LookupConfig::load(&path).unwrap();
        assert_eq!(config.log_path, PathBuf::from("calls.log"));
        assert_eq!(config.log_backup_count, 2);
    }
}
