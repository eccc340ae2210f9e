//! Error types for ctxflow.
//!
//! The data path (get/set/clear, guards, the slot) never fails: lookups on
//! missing keys return `None`. The variants here cover the strict typed
//! accessor and process-wide configuration.

use thiserror::Error;

/// The main error type for ctxflow operations.
#[derive(Debug, Error)]
pub enum ContextError {
    /// No entry is visible under the requested key.
    #[error("no context data for key `{key}`")]
    MissingData {
        /// The key that was looked up.
        key: String,
    },

    /// An entry exists but holds a payload of a different type.
    #[error("context data for key `{key}` is not a `{expected}`")]
    TypeMismatch {
        /// The key that was looked up.
        key: String,
        /// The type name the caller asked for.
        expected: &'static str,
    },

    /// `configure` was called after the configuration was already fixed.
    #[error("ctxflow configuration is already installed")]
    AlreadyConfigured,

    /// A configuration document could not be parsed.
    #[error("invalid ctxflow configuration: {0}")]
    InvalidConfig(#[from] serde_json::Error),
}

impl ContextError {
    /// Creates a missing-data error for `key`.
    #[must_use]
    pub fn missing(key: impl Into<String>) -> Self {
        Self::MissingData { key: key.into() }
    }

    /// Creates a type-mismatch error for `key`.
    #[must_use]
    pub fn type_mismatch<T>(key: impl Into<String>) -> Self {
        Self::TypeMismatch {
            key: key.into(),
            expected: std::any::type_name::<T>(),
        }
    }

    /// Returns true if this error reports an absent entry.
    #[must_use]
    pub const fn is_missing(&self) -> bool {
        matches!(self, Self::MissingData { .. })
    }
}
