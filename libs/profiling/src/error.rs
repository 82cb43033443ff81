//! Profiling Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProfilingError {
    /// Options were neither a flag nor a key/value map, or named unknown keys
    #[error("Invalid profiling options: {message}")]
    InvalidOptions { message: String },

    /// An option value could not be converted to its declared type
    #[error("Invalid value for profiling option {key}: {value}")]
    InvalidValue { key: String, value: String },

    /// `nest` was asked to descend into a key that holds a plain value
    #[error("The value of key {key} is {found}, but a nested tree is expected")]
    NotATree { key: String, found: String },
}

/// Result type alias for profiling operations
pub type Result<T> = std::result::Result<T, ProfilingError>;

impl ProfilingError {
    pub fn invalid_options(message: impl Into<String>) -> Self {
        Self::InvalidOptions {
            message: message.into(),
        }
    }

    pub fn invalid_value(key: impl Into<String>, value: impl ToString) -> Self {
        Self::InvalidValue {
            key: key.into(),
            value: value.to_string(),
        }
    }

    pub fn not_a_tree(key: impl Into<String>, found: impl Into<String>) -> Self {
        Self::NotATree {
            key: key.into(),
            found: found.into(),
        }
    }
}
