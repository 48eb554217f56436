//! # pulse-server
//!
//! Axum HTTP + `WebSocket` gateway for the pulse service.
//!
//! - `WebSocket` gateway: per-connection read/write loops, heartbeat, frame decoding
//! - Hub actor: connection registry, session lifecycle, analysis result routing
//! - HTTP endpoints: `/health`, `/sessions/{id}` and Prometheus `/metrics`
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod catalog;
pub mod config;
pub mod error;
pub mod health;
pub mod hub;
pub mod metrics;
pub mod protocol;
pub mod server;
pub mod websocket;

pub use error::ServerError;
pub use hub::{Hub, HubConfig, HubHandle, HubSnapshot};
pub use server::PulseServer;
