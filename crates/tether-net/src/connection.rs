//! Connection and its receive loop.
//!
//! A [`Connection`] owns one TCP stream. [`Connection::start`] spawns exactly
//! one receive task that reads frame after frame and routes each one:
//!
//! 1. PING frames are answered with a PONG on the spot
//! 2. Frames matching a pending request complete that request
//! 3. Everything else goes to the observer (the event dispatcher)
//!
//! When the loop ends, for whatever reason, the connection is torn down
//! once: the socket is released, pending requests are aborted and the
//! observer's `on_close` runs exactly once.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use tether_types::{system, MessageTypeRegistry};
use tether_wire::{now_millis, read_frame, Frame, FrameError, Request, Response, HEADER_LEN};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument, Span};

use crate::config::{ConnectionSettings, IntegrityPolicy};
use crate::errors::{ConnectionError, TransportError};
use crate::peer::{Peer, PeerId};
use crate::pending::{PendingRequestTable, Resolution};

/// Receives the events of one connection.
#[async_trait]
pub trait ConnectionObserver: Send + Sync + 'static {
    /// Runs on the receive task before the first read.
    async fn on_open(&self, peer: &Peer);

    /// A frame that was neither a PING nor a reply to a pending request.
    async fn on_message(&self, peer: &Peer, response: Response);

    /// Runs once, after teardown.
    async fn on_close(&self, peer: &Peer);
}

/// Traffic counters for one connection.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    pub frames_sent: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub frames_received: AtomicU64,
    pub bytes_received: AtomicU64,
    /// Frames discarded for failed verification or an unknown type
    pub frames_dropped: AtomicU64,
}

impl ConnectionStats {
    fn record_sent(&self, bytes: usize) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    fn record_received(&self, bytes: usize) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    fn record_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }
}

/// One live stream connection.
pub struct Connection {
    id: PeerId,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
    connected_at: SystemTime,
    registry: Arc<MessageTypeRegistry>,
    settings: ConnectionSettings,
    /// Write lock: one frame is written completely before the next starts.
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    /// Taken by `start`.
    reader: parking_lot::Mutex<Option<OwnedReadHalf>>,
    receive_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
    pending: PendingRequestTable,
    shutdown_tx: watch::Sender<bool>,
    closed: AtomicBool,
    stats: ConnectionStats,
}

impl Connection {
    /// Wrap an established stream. Nothing is read until [`Connection::start`].
    pub fn new(
        stream: TcpStream,
        id: PeerId,
        registry: Arc<MessageTypeRegistry>,
        settings: ConnectionSettings,
    ) -> std::io::Result<Arc<Self>> {
        let peer_addr = stream.peer_addr()?;
        let local_addr = stream.local_addr()?;
        // Frames are written whole; don't hold small ones back.
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Arc::new(Self {
            id,
            peer_addr,
            local_addr,
            connected_at: SystemTime::now(),
            registry,
            settings,
            writer: tokio::sync::Mutex::new(Some(writer)),
            reader: parking_lot::Mutex::new(Some(reader)),
            receive_task: parking_lot::Mutex::new(None),
            pending: PendingRequestTable::new(),
            shutdown_tx,
            closed: AtomicBool::new(false),
            stats: ConnectionStats::default(),
        }))
    }

    /// Spawn the receive task, instrumented with `span`.
    ///
    /// Returns false if the connection was already started.
    pub fn start(self: &Arc<Self>, observer: Arc<dyn ConnectionObserver>, span: Span) -> bool {
        let Some(reader) = self.reader.lock().take() else {
            return false;
        };
        let shutdown_rx = self.shutdown_tx.subscribe();
        let task = Arc::clone(self)
            .receive_loop(reader, observer, shutdown_rx)
            .instrument(span);
        *self.receive_task.lock() = Some(tokio::spawn(task));
        true
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn connected_at(&self) -> SystemTime {
        self.connected_at
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn pending(&self) -> &PendingRequestTable {
        &self.pending
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    /// Encode and send a request.
    pub async fn send(&self, request: &Request) -> Result<(), TransportError> {
        let bytes = request.encode()?;
        self.send_encoded(&bytes).await?;
        debug!(
            peer = %self.peer_addr,
            message_type = %request.message_type(),
            size = request.content().len(),
            correlation_id = %request.correlation_id().short(),
            "Sent frame"
        );
        Ok(())
    }

    /// Write one already encoded frame.
    pub async fn send_encoded(&self, bytes: &[u8]) -> Result<(), ConnectionError> {
        let closed = || ConnectionError::Closed {
            peer: self.peer_addr,
        };
        if self.is_closed() {
            return Err(closed());
        }

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let closing = async move {
            while !*shutdown_rx.borrow_and_update() {
                if shutdown_rx.changed().await.is_err() {
                    break;
                }
            }
        };

        let mut writer = self.writer.lock().await;
        let stream = writer.as_mut().ok_or_else(closed)?;
        // A peer that stops reading must not pin the write lock past close.
        let written = tokio::select! {
            written = stream.write_all(bytes) => written,
            _ = closing => return Err(closed()),
        };
        written.map_err(|source| ConnectionError::Send {
            peer: self.peer_addr,
            source,
        })?;
        self.stats.record_sent(bytes.len());
        Ok(())
    }

    /// Ask the receive task to stop and release the socket.
    ///
    /// Idempotent: returns true only for the call that initiated closing.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.shutdown_tx.send_replace(true);
        debug!(peer = %self.peer_addr, "Closing connection");
        true
    }

    /// Wait for the receive task to finish, bounded by the join timeout.
    ///
    /// Returns false if the task was still running when the bound elapsed.
    /// Calling this from the connection's own callbacks always waits the
    /// full bound.
    pub async fn join(&self) -> bool {
        let Some(task) = self.receive_task.lock().take() else {
            return true;
        };
        match tokio::time::timeout(self.settings.join_timeout, task).await {
            Ok(_) => true,
            Err(_) => {
                warn!(
                    peer = %self.peer_addr,
                    timeout_ms = self.settings.join_timeout.as_millis(),
                    "Receive task did not stop in time"
                );
                false
            }
        }
    }

    async fn receive_loop(
        self: Arc<Self>,
        reader: OwnedReadHalf,
        observer: Arc<dyn ConnectionObserver>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let peer = Peer::new(Arc::clone(&self));
        let mut reader = BufReader::with_capacity(self.settings.buffer_size, reader);

        observer.on_open(&peer).await;

        loop {
            if *shutdown_rx.borrow_and_update() {
                break;
            }

            let result = tokio::select! {
                _ = shutdown_rx.changed() => break,
                result = read_frame(&mut reader, self.settings.max_content_length) => result,
            };

            match result {
                Ok(Some(frame)) => self.route(frame, &peer, observer.as_ref()).await,
                Ok(None) => {
                    debug!(peer = %self.peer_addr, "Peer closed the connection");
                    break;
                }
                Err(e @ FrameError::IntegrityMismatch { .. }) => {
                    self.stats.record_dropped();
                    error!(peer = %self.peer_addr, error = %e, "Dropping corrupted frame");
                    if self.settings.integrity_policy == IntegrityPolicy::CloseConnection {
                        break;
                    }
                }
                Err(FrameError::Io(e)) => {
                    info!(peer = %self.peer_addr, error = %e, "Connection lost");
                    break;
                }
                Err(e) => {
                    error!(peer = %self.peer_addr, error = %e, "Unreadable frame, closing connection");
                    break;
                }
            }
        }

        self.teardown().await;
        observer.on_close(&peer).await;
    }

    async fn route(&self, frame: Frame, peer: &Peer, observer: &dyn ConnectionObserver) {
        let received_at = now_millis();
        self.stats.record_received(HEADER_LEN + frame.content().len());

        let response = match Response::from_frame(frame, &self.registry, received_at) {
            Ok(response) => response,
            Err(e) => {
                self.stats.record_dropped();
                warn!(peer = %self.peer_addr, error = %e, "Dropping frame");
                return;
            }
        };

        let code = response.message_type().code();
        debug!(
            peer = %self.peer_addr,
            message_type = %response.message_type(),
            size = response.content().len(),
            correlation_id = %response.correlation_id().short(),
            "Received frame"
        );

        if code == system::PING.code() {
            self.answer_ping(&response).await;
            return;
        }

        match self.pending.resolve(response) {
            Resolution::Delivered | Resolution::Late => {}
            Resolution::NoWaiter(response) if code == system::PONG.code() => {
                self.stats.record_dropped();
                debug!(
                    peer = %self.peer_addr,
                    correlation_id = %response.correlation_id().short(),
                    "Dropping unsolicited PONG"
                );
            }
            Resolution::NoWaiter(response) => observer.on_message(peer, response).await,
        }
    }

    /// Reply with a PONG carrying the PING's correlation ID and timestamp, so
    /// the pinging side measures the round trip on its own clock.
    async fn answer_ping(&self, ping: &Response) {
        let pong = Request::new(system::PONG, Vec::new()).with_correlation_id(ping.correlation_id());
        let result = match pong.encode_at(ping.timestamp()) {
            Ok(bytes) => self.send_encoded(&bytes).await.map_err(TransportError::from),
            Err(e) => Err(e.into()),
        };
        match result {
            Ok(()) => debug!(
                peer = %self.peer_addr,
                correlation_id = %ping.correlation_id().short(),
                "Answered PING"
            ),
            Err(e) => warn!(peer = %self.peer_addr, error = %e, "Failed to answer PING"),
        }
    }

    async fn teardown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.shutdown_tx.send_replace(true);

        match tokio::time::timeout(self.settings.join_timeout, self.writer.lock()).await {
            Ok(mut writer) => {
                if let Some(mut stream) = writer.take() {
                    let _ = stream.shutdown().await;
                }
            }
            Err(_) => warn!(peer = %self.peer_addr, "Write lock still held at teardown"),
        }

        let aborted = self.pending.abort_all();
        info!(
            peer = %self.peer_addr,
            aborted_requests = aborted,
            frames_received = self.stats.frames_received.load(Ordering::Relaxed),
            frames_sent = self.stats.frames_sent.load(Ordering::Relaxed),
            "Connection closed"
        );
    }
}
