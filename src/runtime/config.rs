//! Runtime configuration

use serde::{Deserialize, Serialize};

use crate::categories::datasource::CsvOptions;

/// Settings for a [`BlockRuntime`](super::BlockRuntime)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Past results kept per block besides the current one. `0` keeps only
    /// the current result.
    pub history_limit: usize,
    /// CSV dialect used by the ingestion cache
    pub csv: CsvOptions,
}

impl RuntimeConfig {
    /// Parse and validate a JSON configuration; missing fields take defaults
    ///
    /// ```
    /// use cellular::runtime::RuntimeConfig;
    ///
    /// let config = RuntimeConfig::from_json_str(r#"{"history_limit": 5}"#).unwrap();
    /// assert_eq!(config.history_limit, 5);
    /// assert_eq!(config.csv.delimiter, ',');
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the CSV dialect
    pub fn validate(&self) -> Result<(), ConfigError> {
        let CsvOptions {
            delimiter, quote, ..
        } = self.csv;
        if !delimiter.is_ascii() {
            return Err(ConfigError::Invalid(format!(
                "csv.delimiter {:?} must be an ASCII character",
                delimiter
            )));
        }
        if !quote.is_ascii() {
            return Err(ConfigError::Invalid(format!(
                "csv.quote {:?} must be an ASCII character",
                quote
            )));
        }
        if delimiter == quote {
            return Err(ConfigError::Invalid(
                "csv.delimiter and csv.quote must differ".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration JSON: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
