//! # Tether Types
//!
//! Vocabulary shared by every other crate in the workspace:
//!
//! - [`MessageType`]: a numeric code bound to a logical message kind.
//! - [`MessageTypeRegistry`]: the append-only code table, explicitly
//!   constructed and shared through an `Arc` (there is no global instance).
//! - [`system`]: the reserved catalog (`PING`, `PONG`, ...).
//! - [`CorrelationId`]: the 128-bit identifier that ties a reply to its request.
//!
//! ## Code Ranges
//!
//! | Range | Owner |
//! |-------|-------|
//! | `0..=199` | System (reserved) |
//! | `200..=499` | Application |
//! | `500..=65535` | Plugins / auto-assigned |

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod correlation;
pub mod errors;
pub mod message_type;
pub mod registry;
pub mod system;

pub use correlation::CorrelationId;
pub use errors::RegistryError;
pub use message_type::{CodeRange, MessageType};
pub use registry::MessageTypeRegistry;
