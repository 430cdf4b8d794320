//! # Tether Wire Protocol
//!
//! One frame = fixed 62-byte header + `content_length` content bytes.
//!
//! ```text
//! ┌──────────┬────────────────┬──────────────────┬──────────────┬────────────────┬─────────────┐
//! │ type (2) │ content len (4)│ SHA-256 digest   │ timestamp ms │ correlation id │ content     │
//! │  u16 BE  │    u32 BE      │      (32)        │  (8) u64 BE  │      (16)      │ (len bytes) │
//! └──────────┴────────────────┴──────────────────┴──────────────┴────────────────┴─────────────┘
//! ```
//!
//! The digest covers the content only. A frame whose content does not hash
//! to the header digest is rejected with [`FrameError::IntegrityMismatch`]
//! and must never reach application code.
//!
//! Frames are self-delimiting: a reader consumes the header, learns the
//! content length from it, then reads exactly that many bytes
//! (see [`read_frame`]). There is no delimiter scanning.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod errors;
pub mod frame;
pub mod message;
pub mod stream;

pub use errors::FrameError;
pub use frame::{decode, digest, encode, now_millis, Frame, FrameHeader, DIGEST_LEN, HEADER_LEN};
pub use message::{Request, Response};
pub use stream::read_frame;

/// Largest content a header can describe.
pub const MAX_CONTENT_LEN: usize = u32::MAX as usize;
