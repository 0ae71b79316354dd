//! Application settings shared by binaries in the workspace

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while reading settings
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    /// Unknown log format name
    #[error("Unknown log format '{0}', expected 'plain' or 'json'")]
    UnknownLogFormat(String),
}

/// Output format of the tracing subscriber
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Plain,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" | "text" | "pretty" => Ok(Self::Plain),
            "json" => Ok(Self::Json),
            other => Err(SettingsError::UnknownLogFormat(other.to_string())),
        }
    }
}

/// Main settings structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Application name
    pub app_name: String,
    /// Environment (development, production, etc.)
    pub environment: String,
    /// Log output format
    pub log_format: LogFormat,
    /// Filter directive used when `RUST_LOG` is unset
    pub default_log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "equity-research".to_string(),
            environment: "development".to_string(),
            log_format: LogFormat::Plain,
            default_log_filter: "warn,equity_research=info".to_string(),
        }
    }
}

impl Settings {
    /// Read settings from `EQUITY_RESEARCH_ENV` and `EQUITY_RESEARCH_LOG_FORMAT`
    pub fn from_env() -> Result<Self, SettingsError> {
        let mut settings = Self::default();

        if let Ok(environment) = std::env::var("EQUITY_RESEARCH_ENV") {
            settings.environment = environment;
        }
        if let Ok(format) = std::env::var("EQUITY_RESEARCH_LOG_FORMAT") {
            settings.log_format = format.parse()?;
        }

        Ok(settings)
    }

    /// Whether the settings describe a production deployment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}
