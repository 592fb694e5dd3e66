//! Configuration for migration history resolution
//!
//! Values come from environment variables and may be overridden
//! programmatically (the CLI does this for its flags).

use regex::Regex;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::error::MigrateError;

pub const DEFAULT_MIGRATIONS_DIR: &str = "migrations";
pub const DEFAULT_MIGRATIONS_TABLE: &str = "_elif_migrations";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}")]
    MissingEnvVar { var: String },

    #[error("Invalid value for {field}: '{value}', expected {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },
}

impl From<ConfigError> for MigrateError {
    fn from(err: ConfigError) -> Self {
        MigrateError::configuration(err.to_string())
    }
}

/// Settings for one resolution run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrateConfig {
    /// Target database URL
    pub database_url: Option<String>,
    /// Directory holding one sub-directory per migration
    pub migrations_dir: PathBuf,
    /// Ledger table name
    pub migrations_table: String,
    /// Upper bound on establishing the database connection
    pub connect_timeout: Duration,
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            migrations_dir: PathBuf::from(DEFAULT_MIGRATIONS_DIR),
            migrations_table: DEFAULT_MIGRATIONS_TABLE.to_string(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

impl MigrateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    ///
    /// `DATABASE_URL`, `MIGRATIONS_DIR`, `MIGRATIONS_TABLE` and
    /// `DATABASE_CONNECT_TIMEOUT` (seconds) are read; unset variables keep
    /// their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::new();

        config.database_url = env::var("DATABASE_URL").ok();

        if let Ok(dir) = env::var("MIGRATIONS_DIR") {
            config.migrations_dir = PathBuf::from(dir);
        }

        if let Ok(table) = env::var("MIGRATIONS_TABLE") {
            config.migrations_table = table;
        }

        if let Ok(timeout_str) = env::var("DATABASE_CONNECT_TIMEOUT") {
            let secs: u64 = timeout_str.parse().map_err(|_| ConfigError::InvalidValue {
                field: "connect_timeout".to_string(),
                value: timeout_str.clone(),
                expected: "a whole number of seconds".to_string(),
            })?;
            config.connect_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn with_migrations_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.migrations_dir = dir.into();
        self
    }

    pub fn with_migrations_table(mut self, table: impl Into<String>) -> Self {
        self.migrations_table = table.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let identifier = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex");
        if !identifier.is_match(&self.migrations_table) {
            return Err(ConfigError::InvalidValue {
                field: "migrations_table".to_string(),
                value: self.migrations_table.clone(),
                expected: "a plain SQL identifier (letters, digits, underscores)".to_string(),
            });
        }

        if self.connect_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "connect_timeout".to_string(),
                value: "0".to_string(),
                expected: "a timeout greater than zero".to_string(),
            });
        }

        Ok(())
    }

    /// The database URL, or an error naming the variable to set
    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar {
                var: "DATABASE_URL".to_string(),
            })
    }
}
