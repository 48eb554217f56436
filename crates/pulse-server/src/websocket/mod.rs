//! `WebSocket` connection state, frame decoding and the per-connection session loops.

pub mod connection;
pub mod handler;
pub mod session;
