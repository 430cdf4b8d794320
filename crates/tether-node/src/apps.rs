//! Application message types used by the `tether` commands and the handlers
//! for the echo and chat servers.

use std::sync::Arc;

use tether_net::{Callback, Peer, Server};
use tether_types::{MessageType, MessageTypeRegistry, RegistryError};
use tether_wire::Request;
use tracing::warn;

pub const ECHO: MessageType = MessageType::from_static(200, "echo", "Echo request and reply");
pub const CHAT: MessageType = MessageType::from_static(201, "chat", "Chat message");
pub const JOIN: MessageType = MessageType::from_static(202, "join", "A peer joined the chat");
pub const LEAVE: MessageType = MessageType::from_static(203, "leave", "A peer left the chat");

/// A registry holding the system catalog and the application types.
pub fn registry() -> Result<Arc<MessageTypeRegistry>, RegistryError> {
    let registry = MessageTypeRegistry::new();
    for message_type in [ECHO, CHAT, JOIN, LEAVE] {
        registry.register(message_type)?;
    }
    Ok(Arc::new(registry))
}

/// Reply to every message with its own content, same type, same
/// correlation ID.
pub fn install_echo(server: &Server) {
    server.set_callback(Callback::on_recv(|peer, message| async move {
        let reply = message.respond(message.content().to_vec());
        if let Err(e) = peer.send(&reply).await {
            warn!(peer = %peer.addr(), error = %e, "Echo reply failed");
        }
    }));
}

/// Relay chat messages to everyone but the sender and announce joins and
/// leaves. The handlers hold the server weakly.
pub fn install_chat(server: &Server) {
    let relay = server.downgrade();
    server.set_callback(Callback::on_recv(move |peer, message| {
        let server = relay.clone();
        async move {
            let Some(server) = server.upgrade() else {
                return;
            };
            if message.message_type().code() != CHAT.code() {
                return;
            }
            let line = format!("[{}] {}", peer.addr(), message.text());
            announce(&server, &peer, Request::new(CHAT, line)).await;
        }
    }));

    let greeter = server.downgrade();
    server.set_callback(Callback::on_connect(move |peer| {
        let server = greeter.clone();
        async move {
            let Some(server) = server.upgrade() else {
                return;
            };
            let line = format!("{} joined", peer.addr());
            announce(&server, &peer, Request::new(JOIN, line)).await;
        }
    }));

    let farewell = server.downgrade();
    server.set_callback(Callback::on_disconnect(move |peer| {
        let server = farewell.clone();
        async move {
            let Some(server) = server.upgrade() else {
                return;
            };
            let line = format!("{} left", peer.addr());
            announce(&server, &peer, Request::new(LEAVE, line)).await;
        }
    }));
}

async fn announce(server: &Server, origin: &Peer, request: Request) {
    match server.broadcast(&request, &[origin.id()]).await {
        Ok(report) if !report.is_complete() => warn!(
            failed = report.failures.len(),
            "Some chat members were unreachable"
        ),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Chat broadcast failed"),
    }
}
