//! Server configuration.

use std::time::Duration;

use pulse_settings::PulseSettings;

use crate::protocol::ValidationLimits;

/// Runtime configuration for the HTTP/WebSocket server.
#[derive(Clone, Debug, PartialEq)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Per-connection outbound queue capacity.
    pub send_buffer: usize,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Deadline for a single frame write.
    pub write_timeout: Duration,
    /// Silence after which a peer is considered dead.
    pub pong_timeout: Duration,
    /// Interval between server-initiated Ping frames.
    pub ping_interval: Duration,
    /// Idle time after which a session counts as inactive.
    pub inactivity_timeout: Duration,
    /// Inbound range checks.
    pub limits: ValidationLimits,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            send_buffer: 256,
            max_message_size: 512,
            write_timeout: Duration::from_secs(10),
            pong_timeout: Duration::from_secs(60),
            ping_interval: Duration::from_secs(54),
            inactivity_timeout: Duration::from_secs(300),
            limits: ValidationLimits::default(),
        }
    }
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &PulseSettings) -> Self {
        let server = &settings.server;
        Self {
            host: server.host.clone(),
            port: server.port,
            send_buffer: server.send_buffer,
            max_message_size: server.max_message_size,
            write_timeout: server.write_timeout(),
            pong_timeout: server.pong_timeout(),
            ping_interval: server.ping_interval(),
            inactivity_timeout: settings.session.inactivity_timeout(),
            limits: ValidationLimits::from(&settings.validation),
        }
    }

    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
