//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for log output.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to every event
    pub service_name: String,

    /// Filter directive (trace, debug, info, warn, error, or per-target)
    pub log_level: String,

    /// Whether to emit JSON formatted logs
    pub json_logs: bool,

    /// Whether plain output uses ANSI colors
    pub ansi: bool,

    /// Whether to include thread names
    pub thread_names: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "tether".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            ansi: true,
            thread_names: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `TETHER_LOG_LEVEL` or `RUST_LOG`: Filter directive (default: info)
    /// - `TETHER_JSON_LOGS`: Enable JSON logs (default: false)
    /// - `TETHER_LOG_ANSI`: Colored plain output (default: true)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            log_level: env::var("TETHER_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or(defaults.log_level),

            json_logs: env::var("TETHER_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(defaults.json_logs),

            ansi: env::var("TETHER_LOG_ANSI")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(defaults.ansi),

            ..defaults
        }
    }

    /// Configuration for one service, with the level overridden.
    pub fn for_service(service_name: &str, log_level: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            log_level: log_level.to_string(),
            ..Self::from_env()
        }
    }
}
