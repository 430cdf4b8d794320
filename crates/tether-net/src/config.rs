//! Server and client configuration.
//!
//! Plain structs with defaults, a loopback preset for tests and an
//! environment overlay. Values are not validated beyond parsing.

use std::env;
use std::time::Duration;

/// Default bound on the content a single frame may carry (100 MiB).
pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 100 * 1024 * 1024;

/// How long `join` waits for a receive task to finish.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// What a connection does with a frame that fails verification.
///
/// The frame is never delivered either way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IntegrityPolicy {
    /// Discard the frame and keep reading. The header was consumed in full,
    /// so the stream is still on a frame boundary.
    #[default]
    DropFrame,
    /// Tear the connection down.
    CloseConnection,
}

impl IntegrityPolicy {
    fn from_env_value(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "drop" | "drop_frame" => Some(Self::DropFrame),
            "close" | "close_connection" => Some(Self::CloseConnection),
            _ => None,
        }
    }
}

/// Per-connection settings shared by both ends.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Capacity of the buffered reader in front of the socket.
    pub buffer_size: usize,
    /// Largest content length accepted from a header.
    pub max_content_length: usize,
    pub integrity_policy: IntegrityPolicy,
    /// Bound on waiting for the receive task in `join`.
    pub join_timeout: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            buffer_size: 1024,
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
            integrity_policy: IntegrityPolicy::default(),
            join_timeout: DEFAULT_JOIN_TIMEOUT,
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Name used in the server's tracing span.
    pub name: String,
    /// Interface to listen on.
    pub host: String,
    /// Port to listen on (0 picks an ephemeral port).
    pub port: u16,
    /// Connections accepted beyond this many live clients are closed.
    pub max_clients: usize,
    pub buffer_size: usize,
    pub max_content_length: usize,
    pub integrity_policy: IntegrityPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "server".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_clients: 2,
            buffer_size: 1024,
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
            integrity_policy: IntegrityPolicy::default(),
        }
    }
}

impl ServerConfig {
    /// Loopback with an ephemeral port and room for a handful of clients.
    pub fn for_testing() -> Self {
        Self {
            name: "test-server".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            max_clients: 8,
            ..Self::default()
        }
    }

    /// Defaults overlaid with environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `TETHER_HOST`: Listen interface (default: 0.0.0.0)
    /// - `TETHER_PORT`: Listen port (default: 8080)
    /// - `TETHER_MAX_CLIENTS`: Client limit (default: 2)
    /// - `TETHER_BUFFER_SIZE`: Read buffer capacity (default: 1024)
    /// - `TETHER_INTEGRITY_POLICY`: `drop` or `close` (default: drop)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            host: env::var("TETHER_HOST").unwrap_or(defaults.host),
            port: env_parse("TETHER_PORT").unwrap_or(defaults.port),
            max_clients: env_parse("TETHER_MAX_CLIENTS").unwrap_or(defaults.max_clients),
            buffer_size: env_parse("TETHER_BUFFER_SIZE").unwrap_or(defaults.buffer_size),
            integrity_policy: env::var("TETHER_INTEGRITY_POLICY")
                .ok()
                .and_then(|v| IntegrityPolicy::from_env_value(&v))
                .unwrap_or(defaults.integrity_policy),
            ..defaults
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// `host:port` as passed to the listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub(crate) fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            buffer_size: self.buffer_size,
            max_content_length: self.max_content_length,
            integrity_policy: self.integrity_policy,
            ..ConnectionSettings::default()
        }
    }
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Name used in the client's tracing span.
    pub name: String,
    pub server_address: String,
    pub port: u16,
    pub buffer_size: usize,
    /// Bound on establishing the TCP connection.
    pub connect_timeout: Duration,
    pub max_content_length: usize,
    pub integrity_policy: IntegrityPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: "client".to_string(),
            server_address: "127.0.0.1".to_string(),
            port: 8080,
            buffer_size: 1024,
            connect_timeout: Duration::from_secs(5),
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
            integrity_policy: IntegrityPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Loopback client for `port` with a short connect timeout.
    pub fn for_testing(port: u16) -> Self {
        Self {
            name: "test-client".to_string(),
            port,
            connect_timeout: Duration::from_secs(2),
            ..Self::default()
        }
    }

    /// Defaults overlaid with environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `TETHER_SERVER_ADDRESS`: Server host (default: 127.0.0.1)
    /// - `TETHER_PORT`: Server port (default: 8080)
    /// - `TETHER_BUFFER_SIZE`: Read buffer capacity (default: 1024)
    /// - `TETHER_CONNECT_TIMEOUT_MS`: Connect timeout (default: 5000)
    /// - `TETHER_INTEGRITY_POLICY`: `drop` or `close` (default: drop)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            server_address: env::var("TETHER_SERVER_ADDRESS").unwrap_or(defaults.server_address),
            port: env_parse("TETHER_PORT").unwrap_or(defaults.port),
            buffer_size: env_parse("TETHER_BUFFER_SIZE").unwrap_or(defaults.buffer_size),
            connect_timeout: env_parse("TETHER_CONNECT_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.connect_timeout),
            integrity_policy: env::var("TETHER_INTEGRITY_POLICY")
                .ok()
                .and_then(|v| IntegrityPolicy::from_env_value(&v))
                .unwrap_or(defaults.integrity_policy),
            ..defaults
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// `server_address:port` as passed to connect.
    pub fn server_endpoint(&self) -> String {
        format!("{}:{}", self.server_address, self.port)
    }

    pub(crate) fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            buffer_size: self.buffer_size,
            max_content_length: self.max_content_length,
            integrity_policy: self.integrity_policy,
            ..ConnectionSettings::default()
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}
