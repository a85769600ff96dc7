//! Error types for the controller runtime.

use cf_controls::ControlError;
use thiserror::Error;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Control(#[from] ControlError),

    /// Operation not allowed in the controller's current run state.
    #[error("Invalid state: {what}")]
    State { what: String },

    #[error("Clock error: {what}")]
    Clock { what: String },

    /// A block failed during a tick.
    #[error("Tick failed: {what}")]
    Tick { what: String },

    /// The scheduling thread failed and the controller is exiting.
    #[error("Fatal error: {what}")]
    Fatal { what: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RuntimeError {
    pub fn state(what: impl Into<String>) -> Self {
        Self::State { what: what.into() }
    }
}
