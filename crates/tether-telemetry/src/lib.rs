//! # Tether Telemetry
//!
//! Structured logging for Tether binaries. The library crates only emit
//! `tracing` events; installing a subscriber is left to the binary, once,
//! through [`init_logging`].
//!
//! ```rust,ignore
//! use tether_telemetry::{init_logging, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env();
//! init_logging(&config)?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `TETHER_LOG_LEVEL` | `info` | Filter directive (falls back to `RUST_LOG`) |
//! | `TETHER_JSON_LOGS` | `false` | One JSON object per event |
//! | `TETHER_LOG_ANSI` | `true` | Colored plain output |

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::init_logging;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter '{directive}': {reason}")]
    InvalidFilter { directive: String, reason: String },

    #[error("A global subscriber is already installed")]
    AlreadyInitialized,
}
