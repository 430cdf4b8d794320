//! # Error Types
//!
//! Socket-level failures on connect and send, plus [`TransportError`], the
//! union returned by operations that both encode and send.

use std::net::SocketAddr;

use tether_types::RegistryError;
use tether_wire::FrameError;
use thiserror::Error;

/// Errors raised by the socket layer.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Connection to {addr} timed out after {timeout_ms}ms")]
    ConnectTimeout { addr: String, timeout_ms: u64 },

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Not connected")]
    NotConnected,

    /// The connection has been closed locally or by the peer.
    #[error("Connection to {peer} is closed")]
    Closed { peer: SocketAddr },

    #[error("Failed to send to {peer}: {source}")]
    Send {
        peer: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Any failure of a send path: encoding the message or writing it.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
