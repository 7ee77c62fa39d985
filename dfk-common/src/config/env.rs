//! Environment variable parsing with type safety.
//!
//! Collects errors during parsing so all bad `DFK_*` overrides can be
//! reported at once instead of failing on the first.

use std::env;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during environment variable parsing.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Invalid value for a variable.
    #[error("Invalid value for {var}: expected {expected}, got '{value}'")]
    InvalidValue {
        var: String,
        expected: String,
        value: String,
    },

    /// Value out of valid range.
    #[error("Value out of range for {var}: {value} (valid: {min}..={max})")]
    OutOfRange {
        var: String,
        value: String,
        min: String,
        max: String,
    },

    /// Invalid log level.
    #[error("Invalid log level for {var}: {value}")]
    InvalidLogLevel { var: String, value: String },
}

/// Type-safe environment variable parser.
pub struct EnvParser {
    prefix: &'static str,
    errors: Vec<EnvError>,
}

impl Default for EnvParser {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvParser {
    /// Create a new parser with the DFK_ prefix.
    pub fn new() -> Self {
        Self {
            prefix: "DFK_",
            errors: Vec::new(),
        }
    }

    pub fn errors(&self) -> &[EnvError] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn take_errors(&mut self) -> Vec<EnvError> {
        std::mem::take(&mut self.errors)
    }

    fn var_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Get an optional string value.
    pub fn get_string(&mut self, name: &str) -> Option<String> {
        env::var(self.var_name(name)).ok().filter(|v| !v.is_empty())
    }

    /// Get an optional path value.
    pub fn get_path(&mut self, name: &str) -> Option<PathBuf> {
        self.get_string(name).map(PathBuf::from)
    }

    /// Get a boolean value.
    ///
    /// Accepts: 1, true, yes, on (for true)
    ///          0, false, no, off (for false)
    pub fn get_bool(&mut self, name: &str) -> Option<bool> {
        let var_name = self.var_name(name);
        let value = env::var(&var_name).ok()?;
        match value.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" | "" => Some(false),
            _ => {
                self.errors.push(EnvError::InvalidValue {
                    var: var_name,
                    expected: "boolean (true/false/1/0/yes/no)".to_string(),
                    value,
                });
                None
            }
        }
    }

    /// Get a u32 value with range validation.
    pub fn get_u32_range(&mut self, name: &str, min: u32, max: u32) -> Option<u32> {
        let var_name = self.var_name(name);
        let value = env::var(&var_name).ok()?;
        match value.parse::<u32>() {
            Ok(n) if n >= min && n <= max => Some(n),
            Ok(n) => {
                self.errors.push(EnvError::OutOfRange {
                    var: var_name,
                    value: n.to_string(),
                    min: min.to_string(),
                    max: max.to_string(),
                });
                None
            }
            Err(_) => {
                self.errors.push(EnvError::InvalidValue {
                    var: var_name,
                    expected: "unsigned 32-bit integer".to_string(),
                    value,
                });
                None
            }
        }
    }

    /// Get a log level (trace, debug, info, warn, error, off).
    pub fn get_log_level(&mut self, name: &str) -> Option<String> {
        let var_name = self.var_name(name);
        let value = env::var(&var_name).ok()?;
        let lower = value.to_lowercase();
        match lower.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" | "off" => Some(lower),
            _ => {
                self.errors.push(EnvError::InvalidLogLevel {
                    var: var_name,
                    value,
                });
                None
            }
        }
    }
}
