//! Server.
//!
//! Accepts connections on one accept task, keeps the live-client registry
//! and fans frames out with [`Server::broadcast`]. The registry lock is held
//! only to read, insert or remove entries; every send runs on a snapshot.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use tether_types::MessageTypeRegistry;
use tether_wire::{FrameError, Request, Response};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, field, info, info_span, warn, Instrument, Span};

use crate::config::ServerConfig;
use crate::connection::{Connection, ConnectionObserver};
use crate::dispatcher::{Callback, Event, EventDispatcher};
use crate::errors::{ConnectionError, TransportError};
use crate::peer::{Peer, PeerId};
use crate::request;

/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// One target a broadcast could not reach.
#[derive(Debug)]
pub struct BroadcastFailure {
    pub peer: PeerId,
    pub addr: SocketAddr,
    pub error: ConnectionError,
}

/// Aggregate outcome of a broadcast. One unreachable peer does not fail the
/// whole broadcast.
#[derive(Debug, Default)]
pub struct BroadcastReport {
    /// Targets a send was attempted to
    pub attempted: usize,
    /// Targets the frame was written to
    pub delivered: usize,
    /// Targets skipped because they were in the exclusion set
    pub excluded: usize,
    pub failures: Vec<BroadcastFailure>,
}

impl BroadcastReport {
    /// Delivered / attempted; 1.0 when nothing was attempted.
    pub fn success_rate(&self) -> f64 {
        if self.attempted == 0 {
            1.0
        } else {
            self.delivered as f64 / self.attempted as f64
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

struct Listening {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
}

struct ServerInner {
    config: ServerConfig,
    registry: Arc<MessageTypeRegistry>,
    dispatcher: EventDispatcher,
    clients: Mutex<BTreeMap<PeerId, Peer>>,
    next_id: AtomicU64,
    listening: Mutex<Option<Listening>>,
    span: Span,
}

/// Multi-client server. Clones share the same server.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

/// Non-owning handle to a [`Server`], for callbacks the server itself holds.
#[derive(Clone)]
pub struct WeakServer {
    inner: Weak<ServerInner>,
}

impl WeakServer {
    /// The server, if it is still alive.
    pub fn upgrade(&self) -> Option<Server> {
        self.inner.upgrade().map(|inner| Server { inner })
    }
}

impl Server {
    pub fn new(config: ServerConfig, registry: Arc<MessageTypeRegistry>) -> Self {
        let span = info_span!("server", name = %config.name, addr = field::Empty);
        Self {
            inner: Arc::new(ServerInner {
                config,
                registry,
                dispatcher: EventDispatcher::new(),
                clients: Mutex::new(BTreeMap::new()),
                next_id: AtomicU64::new(1),
                listening: Mutex::new(None),
                span,
            }),
        }
    }

    /// A handle that does not keep the server alive. Callbacks that need
    /// the server should capture this instead of a clone.
    pub fn downgrade(&self) -> WeakServer {
        WeakServer {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Install a callback, replacing any previous one for the same event.
    pub fn set_callback(&self, callback: Callback) {
        self.inner.dispatcher.set_callback(callback);
    }

    pub fn clear_callback(&self, event: Event) {
        self.inner.dispatcher.clear(event);
    }

    /// Bind the listener and spawn the accept task.
    ///
    /// Returns the bound address, which differs from the configured one
    /// when port 0 was requested. Starting a running server returns its
    /// current address.
    pub async fn start(&self) -> Result<SocketAddr, ConnectionError> {
        if let Some(addr) = self.local_addr() {
            return Ok(addr);
        }

        let bind_addr = self.inner.config.bind_address();
        let bind_error = |source| ConnectionError::Bind {
            addr: bind_addr.clone(),
            source,
        };
        let listener = TcpListener::bind(bind_addr.as_str()).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        let mut listening = self.inner.listening.lock();
        if let Some(existing) = listening.as_ref() {
            return Ok(existing.local_addr);
        }

        self.inner.span.record("addr", field::display(local_addr));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let accept_task = tokio::spawn(
            Arc::clone(&self.inner)
                .accept_loop(listener, shutdown_rx)
                .instrument(self.inner.span.clone()),
        );
        *listening = Some(Listening {
            local_addr,
            shutdown_tx,
            accept_task,
        });

        info!(
            parent: &self.inner.span,
            addr = %local_addr,
            max_clients = self.inner.config.max_clients,
            "Server listening"
        );
        Ok(local_addr)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.listening.lock().as_ref().map(|l| l.local_addr)
    }

    pub fn is_running(&self) -> bool {
        self.inner.listening.lock().is_some()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<MessageTypeRegistry> {
        &self.inner.registry
    }

    /// Snapshot of the registered clients, ordered by ID.
    pub fn clients(&self) -> Vec<Peer> {
        self.inner.clients.lock().values().cloned().collect()
    }

    pub fn client_count(&self) -> usize {
        self.inner.clients.lock().len()
    }

    pub fn client(&self, id: PeerId) -> Option<Peer> {
        self.inner.clients.lock().get(&id).cloned()
    }

    /// Fire-and-forget send to one client.
    pub async fn send(&self, client: &Peer, request: &Request) -> Result<(), TransportError> {
        client.send(request).await
    }

    /// Send to every registered client not in `except`.
    pub async fn broadcast(
        &self,
        request: &Request,
        except: &[PeerId],
    ) -> Result<BroadcastReport, FrameError> {
        let targets = self.clients();
        self.broadcast_to(request, &targets, except).await
    }

    /// Send to each of `targets` not in `except`.
    ///
    /// The frame is encoded once, so every recipient sees the same
    /// timestamp and correlation ID. Sends run concurrently.
    pub async fn broadcast_to(
        &self,
        request: &Request,
        targets: &[Peer],
        except: &[PeerId],
    ) -> Result<BroadcastReport, FrameError> {
        let bytes = request.encode()?;
        let (excluded, recipients): (Vec<&Peer>, Vec<&Peer>) =
            targets.iter().partition(|peer| except.contains(&peer.id()));

        let sends = recipients.iter().map(|peer| {
            let bytes = &bytes;
            async move { (*peer, peer.connection().send_encoded(bytes).await) }
        });
        let results = join_all(sends).await;

        let mut report = BroadcastReport {
            attempted: recipients.len(),
            excluded: excluded.len(),
            ..BroadcastReport::default()
        };
        for (peer, result) in results {
            match result {
                Ok(()) => report.delivered += 1,
                Err(error) => {
                    warn!(
                        parent: &self.inner.span,
                        peer = %peer.addr(),
                        error = %error,
                        "Broadcast send failed"
                    );
                    report.failures.push(BroadcastFailure {
                        peer: peer.id(),
                        addr: peer.addr(),
                        error,
                    });
                }
            }
        }

        info!(
            parent: &self.inner.span,
            message_type = %request.message_type(),
            attempted = report.attempted,
            delivered = report.delivered,
            excluded = report.excluded,
            failed = report.failures.len(),
            "Broadcast complete"
        );
        Ok(report)
    }

    /// Send to `client` and wait up to `timeout` for its correlated reply.
    ///
    /// Do not await this inside one of `client`'s own callbacks; use a
    /// spawned task instead (see [`Server::ping_client_detached`]).
    pub async fn send_and_wait(
        &self,
        client: &Peer,
        request: &Request,
        timeout: Duration,
    ) -> Result<Option<Response>, TransportError> {
        request::send_and_wait(client.connection(), request, timeout).await
    }

    /// Ping one client. The PONG's `latency()` is the round-trip time.
    pub async fn ping_client(
        &self,
        client: &Peer,
        timeout: Duration,
    ) -> Result<Option<Response>, TransportError> {
        request::ping(client.connection(), timeout).await
    }

    /// Ping one client on a task of its own. Safe to call from callbacks.
    pub fn ping_client_detached(
        &self,
        client: &Peer,
        timeout: Duration,
    ) -> JoinHandle<Result<Option<Response>, TransportError>> {
        let client = client.clone();
        tokio::spawn(
            async move { request::ping(client.connection(), timeout).await }
                .instrument(self.inner.span.clone()),
        )
    }

    /// Close one client's connection. Its ON_DISCONNECT fires and it leaves
    /// the registry once the receive task has stopped.
    pub fn close_client(&self, client: &Peer) -> bool {
        client.close()
    }

    /// Stop accepting, close every client and wait for their receive tasks.
    pub async fn close_all(&self) {
        let listening = self.inner.listening.lock().take();
        if let Some(listening) = listening {
            listening.shutdown_tx.send_replace(true);
            if tokio::time::timeout(ACCEPT_BACKOFF * 10, listening.accept_task)
                .await
                .is_err()
            {
                warn!(parent: &self.inner.span, "Accept task did not stop in time");
            }
        }

        let clients: Vec<Peer> = {
            let mut registry = self.inner.clients.lock();
            let snapshot = registry.values().cloned().collect();
            registry.clear();
            snapshot
        };

        for client in &clients {
            client.close();
        }
        join_all(clients.iter().map(|client| client.connection().join())).await;

        info!(
            parent: &self.inner.span,
            closed = clients.len(),
            "Server closed"
        );
    }
}

impl ServerInner {
    async fn accept_loop(self: Arc<Self>, listener: TcpListener, mut shutdown_rx: watch::Receiver<bool>) {
        loop {
            let accepted = tokio::select! {
                _ = shutdown_rx.changed() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, addr)) => self.admit(stream, addr),
                Err(e) => {
                    error!(error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
        debug!("Accept loop stopped");
    }

    /// Register the new client and start its receive task. ON_CONNECT runs
    /// on that task once the client is in the registry.
    fn admit(self: &Arc<Self>, stream: TcpStream, addr: SocketAddr) {
        let id = PeerId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let connection = match Connection::new(
            stream,
            id,
            Arc::clone(&self.registry),
            self.config.connection_settings(),
        ) {
            Ok(connection) => connection,
            Err(e) => {
                warn!(peer = %addr, error = %e, "Failed to set up connection");
                return;
            }
        };

        {
            let mut clients = self.clients.lock();
            if clients.len() >= self.config.max_clients {
                warn!(
                    peer = %addr,
                    max_clients = self.config.max_clients,
                    "Client limit reached, rejecting connection"
                );
                // Dropping the unstarted connection closes the socket.
                return;
            }
            clients.insert(id, Peer::new(Arc::clone(&connection)));
        }

        info!(peer = %addr, id = %id, "Client connected");
        let span = info_span!(parent: &self.span, "connection", id = %id, peer = %addr);
        let observer: Arc<dyn ConnectionObserver> = Arc::clone(self) as Arc<dyn ConnectionObserver>;
        connection.start(observer, span);
    }
}

#[async_trait]
impl ConnectionObserver for ServerInner {
    async fn on_open(&self, peer: &Peer) {
        self.dispatcher.dispatch_connect(peer).await;
    }

    async fn on_message(&self, peer: &Peer, response: Response) {
        self.dispatcher.dispatch_recv(peer, response).await;
    }

    async fn on_close(&self, peer: &Peer) {
        let remaining = {
            let mut clients = self.clients.lock();
            if clients.get(&peer.id()) == Some(peer) {
                clients.remove(&peer.id());
            }
            clients.len()
        };
        info!(peer = %peer.addr(), id = %peer.id(), remaining, "Client disconnected");
        self.dispatcher.dispatch_disconnect(peer).await;
    }
}
