//! Request/response facade.
//!
//! Synchronous-style calls on top of a connection and its pending table.
//! A missing reply is a normal outcome: these functions return `Ok(None)`
//! on timeout or when the connection drops while waiting, and `Err` only
//! when the request could not be sent.

use std::time::Duration;

use tether_types::{system, CorrelationId};
use tether_wire::{Request, Response};
use tracing::{debug, info};

use crate::connection::Connection;
use crate::errors::TransportError;
use crate::pending::PendingRequestTable;

/// Abandons the pending entry if the waiting future is dropped before it
/// finishes.
struct WaitGuard<'a> {
    pending: &'a PendingRequestTable,
    correlation_id: CorrelationId,
    armed: bool,
}

impl<'a> WaitGuard<'a> {
    fn new(pending: &'a PendingRequestTable, correlation_id: CorrelationId) -> Self {
        Self {
            pending,
            correlation_id,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.pending.abandon(&self.correlation_id);
        }
    }
}

/// Send `request` and wait up to `timeout` for the frame that carries its
/// correlation ID back.
///
/// The reply is consumed here and never reaches ON_RECV.
pub async fn send_and_wait(
    connection: &Connection,
    request: &Request,
    timeout: Duration,
) -> Result<Option<Response>, TransportError> {
    let correlation_id = request.correlation_id();
    let pending = connection.pending();
    let mut rx = pending.register(correlation_id, request.message_type(), timeout);
    let mut guard = WaitGuard::new(pending, correlation_id);

    if let Err(e) = connection.send(request).await {
        guard.disarm();
        pending.cancel(&correlation_id);
        return Err(e);
    }

    let outcome = tokio::time::timeout(timeout, &mut rx).await;
    guard.disarm();

    match outcome {
        Ok(Ok(response)) => Ok(Some(response)),
        Ok(Err(_)) => {
            debug!(
                correlation_id = %correlation_id.short(),
                "Connection closed while waiting for reply"
            );
            Ok(None)
        }
        Err(_) => {
            if pending.expire(&correlation_id) {
                return Ok(None);
            }
            // Resolved between the deadline and the expiry.
            Ok(rx.try_recv().ok())
        }
    }
}

/// Send a PING and wait for the PONG. The PONG echoes the PING's
/// timestamp, so its `latency()` is the round-trip time in milliseconds.
pub async fn ping(
    connection: &Connection,
    timeout: Duration,
) -> Result<Option<Response>, TransportError> {
    let request = Request::new(system::PING, Vec::new());
    let pong = send_and_wait(connection, &request, timeout).await?;

    match &pong {
        Some(pong) => info!(
            peer = %connection.peer_addr(),
            latency_ms = pong.latency(),
            "Ping"
        ),
        None => debug!(peer = %connection.peer_addr(), "Ping went unanswered"),
    }
    Ok(pong)
}
