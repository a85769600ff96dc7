//! Error types for block and signal operations.

use cf_core::CoreError;
use thiserror::Error;

/// Result type for block and signal operations.
pub type ControlResult<T> = Result<T, ControlError>;

/// Errors that can occur while configuring or evaluating blocks.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControlError {
    /// Unrecognized or ill-typed configuration option.
    #[error("Configuration error: {what}")]
    Config { what: String },

    /// Named signal or block does not exist.
    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    /// Name is already taken within its collection.
    #[error("{kind} '{name}' already exists")]
    DuplicateName { kind: &'static str, name: String },

    /// Inputs of incompatible shape or arity.
    #[error("Shape error: {what}")]
    Shape { what: String },

    /// Invalid argument provided to a block or model.
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    /// Hardware read or write failed.
    #[error("Device error: {what}")]
    Device { what: String },
}

impl ControlError {
    pub fn config(what: impl Into<String>) -> Self {
        Self::Config { what: what.into() }
    }

    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn duplicate(kind: &'static str, name: impl Into<String>) -> Self {
        Self::DuplicateName {
            kind,
            name: name.into(),
        }
    }

    pub fn shape(what: impl Into<String>) -> Self {
        Self::Shape { what: what.into() }
    }

    pub fn device(what: impl Into<String>) -> Self {
        Self::Device { what: what.into() }
    }
}

impl From<CoreError> for ControlError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Shape { what } => ControlError::Shape { what },
            CoreError::NonFinite { what, .. } | CoreError::OutOfRange { what, .. } => {
                ControlError::InvalidArg { what }
            }
        }
    }
}
