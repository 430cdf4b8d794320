//! Built-in system message catalog (codes 0-199).
//!
//! Every [`MessageTypeRegistry`](crate::MessageTypeRegistry) starts with these
//! entries; applications cannot register anything else in the system range.

use crate::MessageType;

// Core system messages (0-9)
pub const PING: MessageType = MessageType::from_static(0, "ping", "Request latency measurement");
pub const PONG: MessageType = MessageType::from_static(1, "pong", "Response to PING request");
pub const HEARTBEAT: MessageType = MessageType::from_static(2, "heartbeat", "Keep-alive message");

// Connection management (10-19)
pub const HELLO: MessageType = MessageType::from_static(10, "hello", "Initial handshake");

// Error messages (20-29)
pub const ERROR: MessageType = MessageType::from_static(20, "error", "Generic error message");
pub const INVALID_REQUEST: MessageType =
    MessageType::from_static(21, "invalid_request", "Malformed request");

/// The whole catalog, in code order.
pub const CATALOG: [MessageType; 6] = [PING, PONG, HEARTBEAT, HELLO, ERROR, INVALID_REQUEST];
