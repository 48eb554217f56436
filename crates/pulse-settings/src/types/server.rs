//! Network, connection and logging settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// HTTP listener and per-connection transport settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port. `0` picks an ephemeral port.
    pub port: u16,
    /// Outbound frames buffered per connection before frames are dropped.
    pub send_buffer: usize,
    /// Largest accepted inbound frame in bytes.
    pub max_message_size: usize,
    /// Deadline for a single outbound write.
    pub write_timeout_ms: u64,
    /// A peer silent for longer than this is disconnected.
    pub pong_timeout_ms: u64,
    /// Interval between server pings.
    pub ping_interval_ms: u64,
    /// Grace period for background tasks at shutdown.
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            send_buffer: 256,
            max_message_size: 512,
            write_timeout_ms: 10_000,
            pong_timeout_ms: 60_000,
            ping_interval_ms: 54_000,
            shutdown_timeout_ms: 5_000,
        }
    }
}

impl ServerSettings {
    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Write deadline.
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Pong deadline.
    pub fn pong_timeout(&self) -> Duration {
        Duration::from_millis(self.pong_timeout_ms)
    }

    /// Ping period.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// Shutdown grace period.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of the compact format.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
