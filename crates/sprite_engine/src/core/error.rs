//! Engine error taxonomy
//!
//! Every fallible engine operation returns [`EngineResult`]. Backend-specific
//! errors ([`DeviceError`], [`AudioError`]) convert into
//! [`EngineError::BackendCallFailure`] so the frame driver only deals with one
//! type.

use crate::audio::backend::AudioError;
use crate::backend::DeviceError;
use crate::config::ConfigError;
use crate::script::ScriptError;
use thiserror::Error;

/// Result alias used across the engine
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// Missing file or asset
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// Graphics or audio device call failed
    #[error("Backend call failed (code {code:#x}): {message}")]
    BackendCallFailure {
        /// Backend-specific result code
        code: i32,
        /// Human readable description of the failed call
        message: String,
    },

    /// Malformed asset data
    #[error("Format validation failed: {0}")]
    FormatValidation(String),

    /// Error raised by a scripting hook; never inspected by the engine
    #[error("Scripting error: {0}")]
    Scripting(#[from] ScriptError),

    /// Handle was released or belongs to another manager
    #[error("Invalid {0} handle")]
    InvalidHandle(&'static str),

    /// A game object was borrowed while it was already being updated or edited
    #[error("Game object is in use")]
    ObjectInUse,

    /// Caller passed an out-of-range or inconsistent value
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration loading failed
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Shorthand for [`EngineError::InvalidArgument`]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// True for errors that originate in a scripting hook
    pub fn is_scripting(&self) -> bool {
        matches!(self, Self::Scripting(_))
    }
}

impl From<DeviceError> for EngineError {
    fn from(err: DeviceError) -> Self {
        Self::BackendCallFailure {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl From<AudioError> for EngineError {
    fn from(err: AudioError) -> Self {
        Self::BackendCallFailure {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_maps_to_backend_failure() {
        let err: EngineError = DeviceError::OutOfVideoMemory.into();
        match err {
            EngineError::BackendCallFailure { code, message } => {
                assert_eq!(code, DeviceError::OutOfVideoMemory.code());
                assert!(message.contains("video memory"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_script_error_is_flagged() {
        let err: EngineError = ScriptError::new("boom").into();
        assert!(err.is_scripting());
        assert!(!EngineError::invalid_argument("x").is_scripting());
    }
}
