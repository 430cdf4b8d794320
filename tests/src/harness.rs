//! Shared fixtures for the end-to-end scenarios.

use std::sync::Arc;
use std::time::Duration;

use tether_net::{Callback, Client, ClientConfig, Server, ServerConfig};
use tether_types::{MessageType, MessageTypeRegistry};

/// Answered by the echo server with the same content.
pub const ECHO: MessageType = MessageType::from_static(200, "echo", "Echo request and reply");

/// Plain application traffic nobody replies to.
pub const NOTE: MessageType = MessageType::from_static(201, "note", "Unanswered message");

pub fn registry() -> Arc<MessageTypeRegistry> {
    let registry = MessageTypeRegistry::new();
    for message_type in [ECHO, NOTE] {
        registry
            .register(message_type)
            .expect("application codes are free");
    }
    Arc::new(registry)
}

/// A started server that never replies to anything but PING.
pub async fn silent_server() -> (Server, u16) {
    let server = Server::new(ServerConfig::for_testing(), registry());
    let addr = server.start().await.expect("bind loopback");
    (server, addr.port())
}

/// A started server that answers every message with `respond()`.
pub async fn echo_server() -> (Server, u16) {
    let (server, port) = silent_server().await;
    server.set_callback(Callback::on_recv(|peer, message| async move {
        let reply = message.respond(message.content().to_vec());
        let _ = peer.send(&reply).await;
    }));
    (server, port)
}

/// A client connected to `port`, already registered on `server`.
pub async fn connected_client(server: &Server, port: u16) -> Client {
    let before = server.client_count();
    let client = Client::new(ClientConfig::for_testing(port), registry());
    client.connect().await.expect("connect to loopback server");
    wait_until(|| server.client_count() > before).await;
    client
}

/// The server-side handle of `client`.
pub fn server_side(server: &Server, client: &Client) -> tether_net::Peer {
    let local = client.local_addr().expect("client is connected");
    server
        .clients()
        .into_iter()
        .find(|peer| peer.addr() == local)
        .expect("client is registered")
}

/// Poll `condition` every 10ms for up to 2s.
pub async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}
