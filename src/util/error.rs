//! Error types for selfcal.

use crate::camera::LogicalRegister;
use thiserror::Error;

/// Result alias for selfcal operations.
pub type SelfCalResult<T> = std::result::Result<T, SelfCalError>;

/// Errors that can occur while driving the self-calibration engine.
///
/// Pixel processing never fails; these errors come from construction, from the
/// injected register callbacks, and from optional image loading.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SelfCalError {
    /// Image dimensions are zero or overflow.
    #[error("invalid dimensions: width={width}, height={height}")]
    InvalidDimensions { width: usize, height: usize },
    /// A frame buffer is shorter than the configured image.
    #[error("buffer too small: needed {needed}, got {got}")]
    BufferTooSmall { needed: usize, got: usize },
    /// The input data or parameters are invalid.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// A register callback returned a non-zero status.
    #[error("register {register:?} access failed with status {status}")]
    Register {
        register: LogicalRegister,
        status: i32,
    },
    /// A register read returned a response too short to decode.
    #[error("register {register:?} response too short: {got} bytes")]
    ShortResponse {
        register: LogicalRegister,
        got: usize,
    },
    /// The EEPROM busy bit never cleared within the poll budget.
    #[error("EEPROM commit did not complete after {polls} polls")]
    EepromTimeout { polls: u32 },
    /// The background worker thread could not be spawned.
    #[error("failed to spawn calibration worker: {reason}")]
    WorkerSpawn { reason: String },
    /// Loading an image from disk failed.
    #[error("image I/O failed: {reason}")]
    ImageIo { reason: String },
}

impl SelfCalError {
    /// Returns the raw callback status for register failures, if any.
    pub fn register_status(&self) -> Option<i32> {
        match self {
            SelfCalError::Register { status, .. } => Some(*status),
            _ => None,
        }
    }
}
