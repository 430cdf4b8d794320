//! # Error Types
//!
//! Failures of the frame codec. Every variant means the bytes at hand must
//! not be delivered as a message.

use tether_types::{CorrelationId, RegistryError};
use thiserror::Error;

/// Errors raised while encoding or decoding frames.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Fewer bytes than the fixed header are available.
    #[error("Data too short: {len} bytes (minimum {min})", min = crate::HEADER_LEN)]
    FrameTooShort { len: usize },

    /// The content does not hash to the digest carried in the header.
    #[error("Hash mismatch for request {correlation_id}: corrupted data detected")]
    IntegrityMismatch { correlation_id: CorrelationId },

    /// The buffer holds a different amount of content than the header says.
    #[error("Size mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// Content larger than the header can describe or the receiver accepts.
    #[error("Content too large: {size} bytes (max: {max})")]
    ContentTooLarge { size: usize, max: usize },

    /// The frame's type code is not registered.
    #[error(transparent)]
    UnknownType(#[from] RegistryError),

    /// The underlying stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// Whether the byte stream is still aligned on a frame boundary after
    /// this error, so that reading may continue with the next frame.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::IntegrityMismatch { .. } | Self::UnknownType(_)
        )
    }
}
