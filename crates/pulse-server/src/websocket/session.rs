//! WebSocket session lifecycle: handles a single connected client from
//! upgrade through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use pulse_core::{ConnectionId, SessionId};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use super::connection::ClientConnection;
use super::handler::{decode_binary, decode_event};
use crate::config::ServerConfig;
use crate::hub::HubHandle;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL, WS_INVALID_MESSAGES_TOTAL, WS_MESSAGES_RECEIVED_TOTAL,
};
use crate::protocol::ServerFrame;

type WsSink = SplitSink<WebSocket, Message>;

/// Run a WebSocket session for a connected client.
///
/// 1. Registers the connection with the hub, which creates the session and
///    queues a `client_info` frame
/// 2. Decodes inbound frames and dispatches valid events
/// 3. Forwards queued frames and sends periodic Ping frames
/// 4. Unregisters on disconnect, transport error or hub-initiated close
#[instrument(skip_all, fields(connection_id = %connection_id, session_id = %session_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    connection_id: ConnectionId,
    session_id: SessionId,
    hub: HubHandle,
    config: Arc<ServerConfig>,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, send_rx) = mpsc::channel::<String>(config.send_buffer.max(1));
    let connection = Arc::new(ClientConnection::new(
        connection_id.clone(),
        session_id,
        send_tx,
    ));

    if !hub.register(connection.clone()).await {
        warn!("hub is not running, refusing connection");
        let _ = timeout(config.write_timeout, ws_tx.send(Message::Close(None))).await;
        return;
    }

    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let mut outbound = tokio::spawn(outbound_loop(
        ws_tx,
        send_rx,
        connection.clone(),
        config.clone(),
    ));

    let cancel = connection.cancellation();
    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => {
                debug!("connection closed by server");
                break;
            }
            next = ws_rx.next() => next,
        };
        let msg = match next {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                debug!(error = %e, "read failed");
                break;
            }
            None => break,
        };

        let decoded = match msg {
            Message::Text(ref text) => decode_event(text.as_str(), &config.limits),
            Message::Binary(ref data) => decode_binary(data, &config.limits),
            Message::Close(_) => {
                info!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {
                connection.mark_alive();
                continue;
            }
        };
        counter!(WS_MESSAGES_RECEIVED_TOTAL).increment(1);

        match decoded {
            Ok(event) => hub.dispatch(&connection, event),
            Err(err) => {
                debug!(code = err.code(), error = %err, "rejected inbound frame");
                counter!(WS_INVALID_MESSAGES_TOTAL, "code" => err.code()).increment(1);
                if !connection.send_frame(&ServerFrame::from(&err)) {
                    debug!("failed to enqueue error frame (queue full or closed)");
                }
            }
        }
    }

    hub.unregister(connection_id).await;
    let _ = connection.close();
    if timeout(config.write_timeout, &mut outbound).await.is_err() {
        outbound.abort();
    }

    let age = connection.age();
    info!(dropped = connection.drop_count(), ?age, "client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(age.as_secs_f64());
}

/// Drain the outbound queue in order, pinging on `ping_interval`.
///
/// Ends when the queue closes (sending a Close frame), a write fails or
/// times out, or the peer stays silent past `pong_timeout`.
async fn outbound_loop(
    mut ws_tx: WsSink,
    mut send_rx: mpsc::Receiver<String>,
    connection: Arc<ClientConnection>,
    config: Arc<ServerConfig>,
) {
    let mut ping_interval = tokio::time::interval(config.ping_interval);
    // Skip the immediate first tick
    let _ = ping_interval.tick().await;

    loop {
        tokio::select! {
            msg = send_rx.recv() => {
                let Some(text) = msg else {
                    debug!("outbound queue closed");
                    let _ = write_frame(&mut ws_tx, Message::Close(None), config.write_timeout).await;
                    break;
                };
                if !write_frame(&mut ws_tx, Message::Text(text.into()), config.write_timeout).await {
                    break;
                }
            }
            _ = ping_interval.tick() => {
                if !connection.check_alive() && connection.last_pong_elapsed() > config.pong_timeout {
                    warn!(timeout = ?config.pong_timeout, "client unresponsive, disconnecting");
                    break;
                }
                if !write_frame(&mut ws_tx, Message::Ping(Vec::new().into()), config.write_timeout).await {
                    break;
                }
            }
        }
    }
    let _ = connection.close();
}

async fn write_frame(ws_tx: &mut WsSink, msg: Message, deadline: Duration) -> bool {
    match timeout(deadline, ws_tx.send(msg)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!(error = %e, "write failed");
            false
        }
        Err(_) => {
            warn!(?deadline, "write timed out");
            false
        }
    }
}
