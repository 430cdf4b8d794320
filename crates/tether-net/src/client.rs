//! Client.
//!
//! One outbound connection per client. Reconnecting after a disconnect
//! goes through [`Client::connect`] again.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tether_types::MessageTypeRegistry;
use tether_wire::{Request, Response};
use tokio::net::TcpStream;
use tracing::{info, info_span, Span};

use crate::config::ClientConfig;
use crate::connection::{Connection, ConnectionObserver};
use crate::dispatcher::{Callback, Event, EventDispatcher};
use crate::errors::{ConnectionError, TransportError};
use crate::peer::{Peer, PeerId};
use crate::request;

struct ClientInner {
    config: ClientConfig,
    registry: Arc<MessageTypeRegistry>,
    dispatcher: EventDispatcher,
    connection: Mutex<Option<Arc<Connection>>>,
    span: Span,
}

/// TCP client. Clones share the same connection.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    pub fn new(config: ClientConfig, registry: Arc<MessageTypeRegistry>) -> Self {
        let span = info_span!(
            "client",
            name = %config.name,
            server = %config.server_endpoint()
        );
        Self {
            inner: Arc::new(ClientInner {
                config,
                registry,
                dispatcher: EventDispatcher::new(),
                connection: Mutex::new(None),
                span,
            }),
        }
    }

    /// Install a callback, replacing any previous one for the same event.
    pub fn set_callback(&self, callback: Callback) {
        self.inner.dispatcher.set_callback(callback);
    }

    pub fn clear_callback(&self, event: Event) {
        self.inner.dispatcher.clear(event);
    }

    /// Connect to the configured server and start the receive task.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        if self.is_connected() {
            return Err(ConnectionError::AlreadyConnected);
        }

        let config = &self.inner.config;
        let endpoint = config.server_endpoint();
        let stream = match tokio::time::timeout(
            config.connect_timeout,
            TcpStream::connect(endpoint.as_str()),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(ConnectionError::Connect {
                    addr: endpoint,
                    source,
                })
            }
            Err(_) => {
                return Err(ConnectionError::ConnectTimeout {
                    addr: endpoint,
                    timeout_ms: config.connect_timeout.as_millis() as u64,
                })
            }
        };

        let connection = Connection::new(
            stream,
            PeerId::new(0),
            Arc::clone(&self.inner.registry),
            config.connection_settings(),
        )
        .map_err(|source| ConnectionError::Connect {
            addr: endpoint.clone(),
            source,
        })?;

        {
            let mut slot = self.inner.connection.lock();
            if slot.as_ref().is_some_and(|c| !c.is_closed()) {
                // Lost a race with a concurrent connect.
                return Err(ConnectionError::AlreadyConnected);
            }
            *slot = Some(Arc::clone(&connection));
        }

        info!(
            parent: &self.inner.span,
            server = %connection.peer_addr(),
            local = %connection.local_addr(),
            "Connected to server"
        );
        let observer: Arc<dyn ConnectionObserver> =
            Arc::clone(&self.inner) as Arc<dyn ConnectionObserver>;
        connection.start(observer, self.inner.span.clone());
        Ok(())
    }

    /// Close the connection and wait for the receive task. A no-op when
    /// not connected.
    pub async fn disconnect(&self) {
        let connection = self.inner.connection.lock().take();
        if let Some(connection) = connection {
            connection.close();
            connection.join().await;
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner
            .connection
            .lock()
            .as_ref()
            .is_some_and(|c| !c.is_closed())
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.connection.lock().as_ref().map(|c| c.local_addr())
    }

    /// The live server link.
    pub fn server(&self) -> Option<Peer> {
        self.live_connection().ok().map(Peer::new)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<MessageTypeRegistry> {
        &self.inner.registry
    }

    /// Fire-and-forget send to the server.
    pub async fn send(&self, request: &Request) -> Result<(), TransportError> {
        self.live_connection()?.send(request).await
    }

    /// Send and wait up to `timeout` for the server's correlated reply.
    /// `Ok(None)` means no reply arrived.
    pub async fn send_and_wait(
        &self,
        request: &Request,
        timeout: Duration,
    ) -> Result<Option<Response>, TransportError> {
        let connection = self.live_connection()?;
        request::send_and_wait(&connection, request, timeout).await
    }

    /// Ping the server. The PONG's `latency()` is the round-trip time.
    pub async fn ping_server(&self, timeout: Duration) -> Result<Option<Response>, TransportError> {
        let connection = self.live_connection()?;
        request::ping(&connection, timeout).await
    }

    fn live_connection(&self) -> Result<Arc<Connection>, ConnectionError> {
        self.inner
            .connection
            .lock()
            .as_ref()
            .filter(|c| !c.is_closed())
            .cloned()
            .ok_or(ConnectionError::NotConnected)
    }
}

#[async_trait]
impl ConnectionObserver for ClientInner {
    async fn on_open(&self, peer: &Peer) {
        self.dispatcher.dispatch_connect(peer).await;
    }

    async fn on_message(&self, peer: &Peer, response: Response) {
        self.dispatcher.dispatch_recv(peer, response).await;
    }

    async fn on_close(&self, peer: &Peer) {
        info!(server = %peer.addr(), "Disconnected from server");
        self.dispatcher.dispatch_disconnect(peer).await;
    }
}
