//! Engine error types
//!
//! One closed enum covers every failure the engine can report. Validation
//! errors are returned synchronously to the caller; render faults are never
//! surfaced from the realtime path and instead travel through the engine's
//! atomic error slot (see [`crate::audio::engine`]).

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors reported by the tone generation engine
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    #[error("sample rate {0} Hz is outside the supported range 8000..=192000")]
    InvalidSampleRate(u32),

    #[error("invalid layer configuration: {field} out of range")]
    InvalidConfiguration { field: &'static str },

    #[error("engine has not been initialized")]
    NotInitialized,

    #[error("buffer call does not match the engine channel mode")]
    ChannelModeMismatch,

    #[error("buffer geometry is invalid (mismatched or oversized planes)")]
    InvalidBufferGeometry,

    #[error("engine has been disposed")]
    Disposed,

    #[error("internal render fault")]
    InternalRenderFault,
}

impl EngineError {
    /// Encode the error kind for the engine's atomic error slot.
    ///
    /// Zero is reserved for "no error".
    pub(crate) fn code(&self) -> u8 {
        match self {
            EngineError::InvalidSampleRate(_) => 1,
            EngineError::InvalidConfiguration { .. } => 2,
            EngineError::NotInitialized => 3,
            EngineError::ChannelModeMismatch => 4,
            EngineError::InvalidBufferGeometry => 5,
            EngineError::Disposed => 6,
            EngineError::InternalRenderFault => 7,
        }
    }

    /// Decode an error slot code back into an error kind.
    ///
    /// Payload-carrying kinds are validation errors and never enter the
    /// slot, so only the payload-free kinds decode.
    pub(crate) fn from_code(code: u8) -> Option<Self> {
        match code {
            3 => Some(EngineError::NotInitialized),
            4 => Some(EngineError::ChannelModeMismatch),
            5 => Some(EngineError::InvalidBufferGeometry),
            6 => Some(EngineError::Disposed),
            7 => Some(EngineError::InternalRenderFault),
            _ => None,
        }
    }
}
