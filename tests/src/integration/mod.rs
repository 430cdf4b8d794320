//! # Integration Scenarios
//!
//! Real sockets on 127.0.0.1 with ephemeral ports; every test starts its own
//! server so tests can run in parallel.

pub mod broadcast;
pub mod lifecycle;
pub mod request_reply;
