//! WebSocket client connection state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use metrics::counter;
use parking_lot::Mutex;
use pulse_core::{ConnectionId, SessionId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::metrics::WS_OUTBOUND_DROPS_TOTAL;
use crate::protocol::ServerFrame;

/// A connected WebSocket client bound to exactly one session.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    session_id: SessionId,
    /// Sender half of the outbound queue. `None` once closed.
    tx: Mutex<Option<mpsc::Sender<String>>>,
    cancel: CancellationToken,
    connected_at: Instant,
    is_alive: AtomicBool,
    last_pong: Mutex<Instant>,
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a new connection feeding `tx`.
    pub fn new(id: ConnectionId, session_id: SessionId, tx: mpsc::Sender<String>) -> Self {
        let now = Instant::now();
        Self {
            id,
            session_id,
            tx: Mutex::new(Some(tx)),
            cancel: CancellationToken::new(),
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Session bound to this connection.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Queue a text frame without blocking.
    ///
    /// Returns `false` if the queue is full or the connection is closed;
    /// the frame is dropped and counted.
    pub fn send(&self, message: String) -> bool {
        let sent = self
            .tx
            .lock()
            .as_ref()
            .is_some_and(|tx| tx.try_send(message).is_ok());
        if !sent {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            counter!(WS_OUTBOUND_DROPS_TOTAL).increment(1);
        }
        sent
    }

    /// Serialize a frame and queue it.
    pub fn send_frame(&self, frame: &ServerFrame) -> bool {
        match serde_json::to_string(frame) {
            Ok(json) => self.send(json),
            Err(e) => {
                warn!(connection_id = %self.id, error = %e, "failed to serialize frame");
                false
            }
        }
    }

    /// Total frames dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Close the connection: drop the outbound sender and cancel both loops.
    ///
    /// Returns `true` on the first call only.
    pub fn close(&self) -> bool {
        let sender = self.tx.lock().take();
        if sender.is_none() {
            return false;
        }
        self.cancel.cancel();
        true
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token cancelled when the connection is closed.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Mark the connection as alive (pong received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the alive flag for heartbeat.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the connection was established.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("session_id", &self.session_id)
            .field("closed", &self.is_closed())
            .field("dropped", &self.drop_count())
            .finish_non_exhaustive()
    }
}
