use super::ffi::{Format, error_code};
use thiserror::Error;

/// Typed error enum for native engine operations
///
/// Native variants carry the engine's error code and the text the engine
/// itself produced for it, so callers can decide whether to retry or to
/// surface the condition to the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The native factory returned a null handle. Nothing is usable.
    #[error("Failed to create engine instance: {0}")]
    Creation(String),

    /// The initialization sequence failed. `initialize()` may be retried.
    #[error("Engine initialization failed: {message} (code: {code})")]
    Init { code: i32, message: String },

    /// Setting an option failed. Unknown option names or values are an
    /// expected case and land here.
    #[error("Failed to set option {key}={value}: {message} (code: {code})")]
    Option {
        key: String,
        value: String,
        code: i32,
        message: String,
    },

    /// Reading, observing or unobserving a property failed
    #[error("Property {name} failed: {message} (code: {code})")]
    Property {
        name: String,
        code: i32,
        message: String,
    },

    /// A command was rejected by the engine
    #[error("Command {name} failed: {message} (code: {code})")]
    Command {
        name: String,
        code: i32,
        message: String,
    },

    /// The requested data format is not decoded by this layer
    #[error("Unsupported property format: {0:?}")]
    UnsupportedFormat(Format),

    /// An argument could not be handed to the engine (e.g. interior NUL)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The engine handle has been disposed
    #[error("Engine has been disposed")]
    Disposed,
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Native error code, when the failure came from the engine
    pub fn code(&self) -> Option<i32> {
        match self {
            EngineError::Init { code, .. }
            | EngineError::Option { code, .. }
            | EngineError::Property { code, .. }
            | EngineError::Command { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_disposed(&self) -> bool {
        matches!(self, EngineError::Disposed)
    }

    /// True when an option was rejected because the engine does not know
    /// the name or cannot parse the value.
    pub fn is_unsupported_option(&self) -> bool {
        matches!(
            self,
            EngineError::Option { code, .. }
                if matches!(
                    *code,
                    error_code::OPTION_NOT_FOUND
                        | error_code::OPTION_FORMAT
                        | error_code::OPTION_ERROR
                )
        )
    }
}
