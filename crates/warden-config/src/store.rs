//! Typed option store keyed by configuration path and option name.
//!
//! The store mirrors the contract the broker consumes from its external
//! configuration collaborator: string, integer, boolean, and list getters
//! addressed by a hierarchical path (for example `config/domains/example.com`)
//! and an option name, each with a caller-supplied default. Values are stored
//! as strings; typed getters parse on read so a malformed value surfaces as a
//! [`ConfigError`] at the call site that cares about it.

use std::collections::HashMap;

use thiserror::Error;

/// Errors raised when reading typed options.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A stored value could not be parsed into the requested type.
    #[error("invalid value '{value}' for option '{option}' at '{path}'")]
    InvalidValue {
        /// Configuration path of the offending option.
        path: String,
        /// Option name.
        option: String,
        /// Stored raw value.
        value: String,
    },
}

impl ConfigError {
    /// Creates an invalid-value error.
    #[must_use]
    pub fn invalid_value(
        path: impl Into<String>,
        option: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            path: path.into(),
            option: option.into(),
            value: value.into(),
        }
    }
}

/// In-memory option store addressed by (path, option) pairs.
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    values: HashMap<(String, String), Vec<String>>,
}

impl ConfigStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an option to a single value, replacing any previous values.
    pub fn set(&mut self, path: impl Into<String>, option: impl Into<String>, value: impl Into<String>) {
        self.values
            .insert((path.into(), option.into()), vec![value.into()]);
    }

    /// Sets an option to a list of values, replacing any previous values.
    pub fn set_list(
        &mut self,
        path: impl Into<String>,
        option: impl Into<String>,
        values: Vec<String>,
    ) {
        self.values.insert((path.into(), option.into()), values);
    }

    /// Returns the first value of an option, or `None` when unset.
    #[must_use]
    pub fn get_string(&self, path: &str, option: &str) -> Option<&str> {
        self.values
            .get(&(path.to_owned(), option.to_owned()))
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Returns an option parsed as an integer, falling back to `default`.
    pub fn get_int(&self, path: &str, option: &str, default: i64) -> Result<i64, ConfigError> {
        match self.get_string(path, option) {
            None => Ok(default),
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid_value(path, option, raw)),
        }
    }

    /// Returns an option parsed as a boolean, falling back to `default`.
    ///
    /// Accepted spellings are `true`/`false` (case-insensitive).
    pub fn get_bool(&self, path: &str, option: &str, default: bool) -> Result<bool, ConfigError> {
        match self.get_string(path, option) {
            None => Ok(default),
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(ConfigError::invalid_value(path, option, raw)),
            },
        }
    }

    /// Returns all values of an option; unset options yield an empty slice.
    #[must_use]
    pub fn get_list(&self, path: &str, option: &str) -> &[String] {
        self.values
            .get(&(path.to_owned(), option.to_owned()))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}
