//! Diagnostic logging for the CLI
//!
//! Diagnostics go to stderr; stdout carries only command output.

use clap::ValueEnum;
use std::io;
use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOGGED_CRATES: [&str; 2] = ["elif_migrate", "elifrs"];

/// Output format of diagnostic logs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration for the CLI
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Level applied to the elif crates (e.g. "warn", "debug")
    pub level: String,
    /// Explicit filter; takes precedence over `RUST_LOG`
    pub env_filter: Option<String>,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            env_filter: None,
            format: LogFormat::Text,
        }
    }
}

impl LoggingConfig {
    /// Set the level from `--log-level`
    pub fn with_level(mut self, level: &str) -> Self {
        self.level = level.to_string();
        self.env_filter = Some(self.default_filter());
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Filter covering the elif crates at the configured level
    pub fn default_filter(&self) -> String {
        LOGGED_CRATES
            .iter()
            .map(|krate| format!("{}={}", krate, self.level))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Install the global subscriber
pub fn init_logging(config: LoggingConfig) -> anyhow::Result<()> {
    let filter = match &config.env_filter {
        Some(filter) => EnvFilter::try_new(filter)?,
        None => EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(config.default_filter()))?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == LogFormat::Json {
        registry
            .with(Layer::new().with_writer(io::stderr).json())
            .try_init()?;
    } else {
        registry
            .with(Layer::new().with_writer(io::stderr).without_time())
            .try_init()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert_eq!(
            LoggingConfig::default().default_filter(),
            "elif_migrate=warn,elifrs=warn"
        );
    }

    #[test]
    fn test_json_format() {
        let config = LoggingConfig::default().with_format(LogFormat::Json);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(LogFormat::from_str("json", true).unwrap(), LogFormat::Json);
    }

    #[test]
    fn test_log_level_override() {
        let config = LoggingConfig::default().with_level("debug");
        assert_eq!(
            config.env_filter.as_deref(),
            Some("elif_migrate=debug,elifrs=debug")
        );
    }
}
