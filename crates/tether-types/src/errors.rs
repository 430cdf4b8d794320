//! # Error Types
//!
//! Errors raised by misuse of the message type registry.

use thiserror::Error;

/// Errors that can occur when registering or looking up message types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The code is already bound to a different definition.
    #[error("Code {code} already registered as '{existing}'")]
    DuplicateCode { code: u16, existing: String },

    /// No message type is registered under this code.
    #[error("Unknown message type code: {0}")]
    UnknownType(u16),

    /// The code lies in the system range (0-199) and is not part of the
    /// built-in catalog.
    #[error("Code {0} is reserved for system messages (0-199)")]
    ReservedCode(u16),

    /// Every code in the plugin range is taken.
    #[error("No free code left in the plugin range (500-65535)")]
    CodeSpaceExhausted,
}
