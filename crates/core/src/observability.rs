//! Structured logging setup
//!
//! Binaries call [`init_logging`] once at startup. `RUST_LOG` takes precedence
//! over the configured level.

use crate::error::{CurriculaError, Result};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

impl LogConfig {
    pub fn validate(&self) -> Result<()> {
        if !VALID_LOG_LEVELS.contains(&self.level.to_lowercase().as_str()) {
            return Err(CurriculaError::config(
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
                "CURRICULA__LOGGING__LEVEL",
            ));
        }
        Ok(())
    }
}

/// Install the global tracing subscriber
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.level.to_lowercase()))
        .map_err(|e| CurriculaError::config(e.to_string(), "CURRICULA__LOGGING__LEVEL"))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };

    result.map_err(|e| CurriculaError::ConfigurationError {
        message: format!("Failed to install tracing subscriber: {}", e),
        key: None,
    })
}
