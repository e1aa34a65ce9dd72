//! Error types for ID parsing.

use thiserror::Error;

/// Errors that can occur when parsing IDs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The ID string is empty.
    #[error("{kind} cannot be empty")]
    Empty { kind: &'static str },

    /// The string is not a valid UUID.
    #[error("invalid {kind}: {message}")]
    InvalidUuid { kind: &'static str, message: String },
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty { .. })
    }

    /// The ID type that failed to parse.
    pub fn kind(&self) -> &'static str {
        match self {
            IdError::Empty { kind } | IdError::InvalidUuid { kind, .. } => kind,
        }
    }
}
