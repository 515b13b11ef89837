//! Error types for the Keel engine.

use crate::resource::ResourceKind;
use crate::store::StoreError;
use thiserror::Error;

/// All possible errors from the Keel engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Configuration and validation errors
    #[error("invalid identity {identity:?}: expected '{expected}'")]
    InvalidIdentity {
        identity: String,
        expected: &'static str,
    },

    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("invalid extended JSON in {field}: {reason}")]
    InvalidExtendedJson { field: String, reason: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    // Conflict and lookup errors
    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: ResourceKind, id: String },

    #[error("{kind} not found: {id} ({detail})")]
    NotFound {
        kind: ResourceKind,
        id: String,
        detail: String,
    },

    #[error("{kind} {id} cannot be updated in place, replace required for: {}", fields.join(", "))]
    ReplaceRequired {
        kind: ResourceKind,
        id: String,
        fields: Vec<String>,
    },

    // Store errors
    #[error("create {kind} failed: {message}")]
    CreateFailed { kind: ResourceKind, message: String },

    #[error("{operation} failed: {source}")]
    Store {
        operation: &'static str,
        #[source]
        source: StoreError,
    },

    // Call context errors
    #[error("call cancelled")]
    Cancelled,

    #[error("call deadline exceeded")]
    DeadlineExceeded,
}

impl Error {
    /// Shorthand for a validation error on a named field.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a store failure with the operation that produced it.
    pub fn store(operation: &'static str, source: StoreError) -> Self {
        Error::Store { operation, source }
    }

    /// Whether this error came from validating caller input.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidIdentity { .. }
                | Error::Validation { .. }
                | Error::InvalidExtendedJson { .. }
        )
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
