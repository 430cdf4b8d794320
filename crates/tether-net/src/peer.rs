//! Handle to the remote end of a live connection.
//!
//! On a server a `Peer` is one registered client; on a client it is the
//! server link. Handles are cheap to clone and all clones refer to the same
//! connection.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tether_wire::{Request, Response};

use crate::connection::Connection;
use crate::errors::TransportError;
use crate::request;

/// Identifier of a connection, unique within one server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(u64);

impl PeerId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A connected remote end.
#[derive(Clone)]
pub struct Peer {
    connection: Arc<Connection>,
}

/// The server's registry entry for one client.
pub type ClientInfo = Peer;

impl Peer {
    pub(crate) fn new(connection: Arc<Connection>) -> Self {
        Self { connection }
    }

    pub fn id(&self) -> PeerId {
        self.connection.id()
    }

    /// Remote socket address.
    pub fn addr(&self) -> SocketAddr {
        self.connection.peer_addr()
    }

    pub fn connected_at(&self) -> SystemTime {
        self.connection.connected_at()
    }

    pub fn is_connected(&self) -> bool {
        !self.connection.is_closed()
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Fire-and-forget send.
    pub async fn send(&self, request: &Request) -> Result<(), TransportError> {
        self.connection.send(request).await
    }

    /// Send and wait up to `timeout` for the reply carrying the same
    /// correlation ID. `Ok(None)` means no reply.
    ///
    /// Must not be awaited inside this peer's own callbacks: the reply is
    /// read by the task running the callback.
    pub async fn send_and_wait(
        &self,
        request: &Request,
        timeout: Duration,
    ) -> Result<Option<Response>, TransportError> {
        request::send_and_wait(&self.connection, request, timeout).await
    }

    /// Round trip a PING. The PONG's `latency()` is the round-trip time.
    pub async fn ping(&self, timeout: Duration) -> Result<Option<Response>, TransportError> {
        request::ping(&self.connection, timeout).await
    }

    /// Close the connection. Idempotent.
    pub fn close(&self) -> bool {
        self.connection.close()
    }
}

impl PartialEq for Peer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.connection, &other.connection)
    }
}

impl Eq for Peer {}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.id())
            .field("addr", &self.addr())
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id(), self.addr())
    }
}
