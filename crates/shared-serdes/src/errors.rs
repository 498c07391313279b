//! Error types for the serialization layer.

use thiserror::Error;

/// Errors from identifier and UUID operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SerdesError {
    /// The name is already interned and still live.
    #[error("Identifier '{0}' already exists")]
    DuplicateIdentifier(String),

    /// The name (or token) has never been interned or was destroyed.
    #[error("Unknown identifier '{0}'")]
    UnknownIdentifier(String),

    /// The input is not a valid packed or canonical UUID.
    #[error("Malformed UUID '{input}': {reason}")]
    MalformedUuid { input: String, reason: String },
}

impl SerdesError {
    pub(crate) fn malformed(input: &str, reason: impl Into<String>) -> Self {
        Self::MalformedUuid {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}
