//! Connection hub: a single actor that owns the connection registry.
//!
//! The registry is only touched inside [`Hub::run`]. Connection tasks talk to
//! it through a [`HubHandle`], which also carries the synchronous inbound
//! dispatch path (store update plus pipeline enqueue) so that frame handling
//! never waits on the actor.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::{counter, gauge};
use pulse_analysis::{AnalysisPipeline, EnqueueOutcome, ResultStream};
use pulse_core::{AnalysisRequest, AnalysisResult, ConnectionId, SessionId};
use pulse_store::SessionStore;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::catalog;
use crate::metrics::{
    HUB_ANALYSES_TOTAL, HUB_CONNECTIONS, HUB_RESPONSES_TOTAL, HUB_RESULTS_DISCARDED_TOTAL,
    SESSIONS_CLEANED_TOTAL,
};
use crate::protocol::{ClientEvent, CODE_SESSION_ERROR, Purchase, ServerFrame, UserAction};
use crate::websocket::connection::ClientConnection;

/// Hub tuning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HubConfig {
    /// History entries attached to each analysis request.
    pub recent_actions: usize,
    /// Command queue capacity.
    pub command_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            recent_actions: 10,
            command_capacity: 256,
        }
    }
}

/// Point-in-time view of the registry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HubSnapshot {
    /// Registered connections.
    pub connections: usize,
    /// Sessions bound to registered connections.
    pub session_ids: Vec<SessionId>,
}

enum Command {
    Register {
        connection: Arc<ClientConnection>,
        reply: oneshot::Sender<()>,
    },
    Unregister {
        connection_id: ConnectionId,
    },
    Cleanup {
        timeout: Duration,
        reply: oneshot::Sender<usize>,
    },
    Snapshot {
        reply: oneshot::Sender<HubSnapshot>,
    },
}

/// The hub actor. Consume it with [`Hub::run`].
pub struct Hub {
    store: SessionStore,
    commands: mpsc::Receiver<Command>,
    results: Option<ResultStream>,
    shutdown: CancellationToken,
    connections: HashMap<ConnectionId, Arc<ClientConnection>>,
}

/// Cloneable client of the hub actor.
#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<Command>,
    store: SessionStore,
    pipeline: Arc<AnalysisPipeline>,
    recent_actions: usize,
}

impl Hub {
    /// Create the actor and its handle.
    ///
    /// `results` is the pipeline's result stream; pass `None` to run without
    /// analysis routing.
    pub fn new(
        store: SessionStore,
        pipeline: Arc<AnalysisPipeline>,
        results: Option<ResultStream>,
        config: HubConfig,
        shutdown: CancellationToken,
    ) -> (Self, HubHandle) {
        let (tx, rx) = mpsc::channel(config.command_capacity);
        let handle = HubHandle {
            commands: tx,
            store: store.clone(),
            pipeline,
            recent_actions: config.recent_actions,
        };
        let hub = Self {
            store,
            commands: rx,
            results,
            shutdown,
            connections: HashMap::new(),
        };
        (hub, handle)
    }

    /// Run until shutdown or until every handle is dropped.
    #[instrument(skip_all, name = "hub")]
    pub async fn run(mut self) {
        info!("hub started");
        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => {
                    info!("hub shutting down");
                    break;
                }
                result = next_result(&mut self.results) => match result {
                    Some(result) => self.route_result(result),
                    None => {
                        debug!("analysis result stream ended");
                        self.results = None;
                    }
                },
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        error!("hub command channel closed, routing stopped");
                        break;
                    }
                },
            }
        }
        self.close_all();
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Register { connection, reply } => {
                self.register(connection);
                let _ = reply.send(());
            }
            Command::Unregister { connection_id } => self.unregister(&connection_id),
            Command::Cleanup { timeout, reply } => {
                let removed = self.cleanup(timeout);
                let _ = reply.send(removed);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(HubSnapshot {
                    connections: self.connections.len(),
                    session_ids: self
                        .connections
                        .values()
                        .map(|c| c.session_id().clone())
                        .collect(),
                });
            }
        }
    }

    fn register(&mut self, connection: Arc<ClientConnection>) {
        let session_id = connection.session_id().clone();
        let _ = self.store.create(&session_id);
        let _ = connection.send_frame(&ServerFrame::client_info("connected", session_id.clone()));
        let _ = self
            .connections
            .insert(connection.id.clone(), connection);
        #[allow(clippy::cast_precision_loss)]
        gauge!(HUB_CONNECTIONS).set(self.connections.len() as f64);
        info!(%session_id, active = self.connections.len(), "client registered");
    }

    fn unregister(&mut self, connection_id: &ConnectionId) {
        let Some(connection) = self.connections.remove(connection_id) else {
            debug!(%connection_id, "unregister for unknown connection ignored");
            return;
        };
        let _ = connection.close();
        let _ = self.store.delete(connection.session_id());
        #[allow(clippy::cast_precision_loss)]
        gauge!(HUB_CONNECTIONS).set(self.connections.len() as f64);
        info!(
            %connection_id,
            session_id = %connection.session_id(),
            active = self.connections.len(),
            "client unregistered"
        );
    }

    fn cleanup(&self, timeout: Duration) -> usize {
        let expired: HashSet<SessionId> = self.store.remove_inactive(timeout).into_iter().collect();
        let mut closed = 0_usize;
        for connection in self.connections.values() {
            if expired.contains(connection.session_id()) && connection.close() {
                closed += 1;
            }
        }
        let removed = expired.len();
        counter!(SESSIONS_CLEANED_TOTAL).increment(removed as u64);
        if removed > 0 || closed > 0 {
            info!(removed, closed, "cleaned up inactive sessions");
        }
        removed
    }

    /// Deliver one analysis result to the connection bound to its session.
    fn route_result(&self, result: AnalysisResult) {
        // Linear scan: one connection per session, registry sized by live clients.
        let Some(connection) = self
            .connections
            .values()
            .find(|c| *c.session_id() == result.session_id)
        else {
            debug!(session_id = %result.session_id, "analysis result for unknown session discarded");
            counter!(HUB_RESULTS_DISCARDED_TOTAL).increment(1);
            return;
        };
        if !result.state_change {
            debug!(session_id = %result.session_id, "analysis result without state change");
            return;
        }

        let current = self
            .store
            .get(&result.session_id)
            .map_or(result.previous_state, |record| record.current_state());
        let next = current.after_analysis(result.classification.new_state);
        let message = result.classification.message;

        if let Err(e) = self.store.set_state(&result.session_id, next) {
            debug!(error = %e, "session vanished before result was applied");
            counter!(HUB_RESULTS_DISCARDED_TOTAL).increment(1);
            return;
        }
        let _ = self.store.append_commentary(&result.session_id, message.clone());

        if connection.send_frame(&ServerFrame::response(next.as_str(), message)) {
            counter!(HUB_RESPONSES_TOTAL, "source" => "analysis").increment(1);
        }
        debug!(
            session_id = %result.session_id,
            from = %current,
            to = %next,
            urgency = %result.classification.urgency,
            "analysis delivered"
        );
    }

    fn close_all(&self) {
        for connection in self.connections.values() {
            let _ = connection.close();
        }
        debug!(count = self.connections.len(), "closed remaining connections");
    }
}

async fn next_result(results: &mut Option<ResultStream>) -> Option<AnalysisResult> {
    match results {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

impl HubHandle {
    /// Register a connection and wait until the hub has created its session.
    ///
    /// Returns `false` if the hub is no longer running.
    pub async fn register(&self, connection: Arc<ClientConnection>) -> bool {
        let (reply, rx) = oneshot::channel();
        if self
            .commands
            .send(Command::Register { connection, reply })
            .await
            .is_err()
        {
            return false;
        }
        rx.await.is_ok()
    }

    /// Remove a connection and its session. Unknown IDs are ignored.
    pub async fn unregister(&self, connection_id: ConnectionId) {
        if self
            .commands
            .send(Command::Unregister { connection_id })
            .await
            .is_err()
        {
            debug!("hub stopped before unregister");
        }
    }

    /// Close connections idle beyond `timeout` and sweep their sessions.
    ///
    /// Returns the number of sessions removed (0 if the hub is gone).
    pub async fn cleanup_inactive(&self, timeout: Duration) -> usize {
        let (reply, rx) = oneshot::channel();
        if self
            .commands
            .send(Command::Cleanup { timeout, reply })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// Registry snapshot, or `None` if the hub is gone.
    pub async fn snapshot(&self) -> Option<HubSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(Command::Snapshot { reply }).await.ok()?;
        rx.await.ok()
    }

    /// Session store shared with the hub.
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Apply a validated inbound event on behalf of `connection`.
    #[instrument(skip_all, fields(session_id = %connection.session_id(), kind = event.kind()))]
    pub fn dispatch(&self, connection: &ClientConnection, event: ClientEvent) {
        match event {
            ClientEvent::UserAction(action) => self.user_action(connection, action),
            ClientEvent::Purchase(purchase) => self.purchase(connection, purchase),
        }
    }

    fn user_action(&self, connection: &ClientConnection, action: UserAction) {
        let session_id = connection.session_id();
        let record = match self.store.record_action(session_id, action.stage, action.clicks) {
            Ok(record) => record,
            Err(e) => {
                let _ = connection.send_frame(&ServerFrame::error(CODE_SESSION_ERROR, e.to_string()));
                return;
            }
        };

        if !self.pipeline.is_running() {
            return;
        }
        let request = AnalysisRequest {
            session_id: session_id.clone(),
            user_state: record.derive_state(),
            recent_actions: record.recent_actions(self.recent_actions),
            submitted_at: Utc::now(),
        };
        match self.pipeline.enqueue(request) {
            EnqueueOutcome::Enqueued => {
                counter!(HUB_ANALYSES_TOTAL, "outcome" => "enqueued").increment(1);
            }
            EnqueueOutcome::Dropped => {
                counter!(HUB_ANALYSES_TOTAL, "outcome" => "dropped").increment(1);
            }
            EnqueueOutcome::Stopped => {}
        }
    }

    fn purchase(&self, connection: &ClientConnection, purchase: Purchase) {
        if let Err(e) = self
            .store
            .record_purchase(connection.session_id(), purchase.item_id)
        {
            let _ = connection.send_frame(&ServerFrame::error(CODE_SESSION_ERROR, e.to_string()));
            return;
        }
        let frame = ServerFrame::response(
            catalog::category_name(purchase.item_id),
            catalog::purchase_message(purchase.item_id),
        );
        if connection.send_frame(&frame) {
            counter!(HUB_RESPONSES_TOTAL, "source" => "purchase").increment(1);
        } else {
            warn!(session_id = %connection.session_id(), "purchase response dropped");
        }
    }
}

impl std::fmt::Debug for HubHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubHandle")
            .field("running", &!self.commands.is_closed())
            .field("recent_actions", &self.recent_actions)
            .finish_non_exhaustive()
    }
}
