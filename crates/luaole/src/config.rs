//! Bridge options (luaole.toml)
//!
//! All fields are optional; a missing field takes its default.
//!
//! ```toml
//! global_name = "CreateObject"
//! chunk_name = "(anonymous)"
//! max_table_depth = 32
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading options
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the options file
    #[error("Failed to read options file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse options: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Validation error
    #[error("Invalid options: {0}")]
    ValidationError(String),
}

/// Bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeOptions {
    /// Global the object-creation entry point is installed under
    pub global_name: String,

    /// Chunk name used when reloading captured bytecode
    pub chunk_name: String,

    /// Maximum table nesting followed by the recursive pull
    pub max_table_depth: usize,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            global_name: "CreateObject".to_string(),
            chunk_name: "(anonymous)".to_string(),
            max_table_depth: 32,
        }
    }
}

impl BridgeOptions {
    /// Parse options from a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let options: BridgeOptions = toml::from_str(source)?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.global_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "global_name must not be empty".to_string(),
            ));
        }
        if self.max_table_depth == 0 {
            return Err(ConfigError::ValidationError(
                "max_table_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
