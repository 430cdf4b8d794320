//! # Tether Net
//!
//! The concurrent half of Tether: live connections, the server with its
//! client registry, the client, and request/response correlation.
//!
//! ## Task Model
//!
//! ```text
//!  Server ──accept task──► Connection ──receive task──┬─► PING ─► auto PONG
//!    │                        │                       ├─► PendingRequestTable ─► send_and_wait()
//!    └─ client registry       └─ write lock           └─► EventDispatcher ─► ON_RECV
//! ```
//!
//! - One accept task per started server, one receive task per connection.
//! - Every send and every `send_and_wait` runs on the caller's task.
//! - The client registry and the pending table sit behind synchronous
//!   mutexes that are never held across an `.await`; broadcasts send on a
//!   snapshot of the registry.
//! - Frames written to one connection are serialized by its write lock.
//!
//! ## Disconnects
//!
//! A connection that fails or is closed fires ON_DISCONNECT exactly once and
//! aborts its own pending requests, whose waiters observe `Ok(None)`.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod client;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod errors;
pub mod peer;
pub mod pending;
pub mod request;
pub mod server;

pub use client::Client;
pub use config::{ClientConfig, IntegrityPolicy, ServerConfig};
pub use connection::{Connection, ConnectionStats};
pub use dispatcher::{Callback, Event, EventDispatcher};
pub use errors::{ConnectionError, TransportError};
pub use peer::{ClientInfo, Peer, PeerId};
pub use pending::{PendingRequestTable, PendingStats, Resolution};
pub use server::{BroadcastFailure, BroadcastReport, Server, WeakServer};
