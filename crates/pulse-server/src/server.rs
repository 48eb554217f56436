//! `PulseServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::{Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use pulse_analysis::AnalysisPipeline;
use pulse_core::{ConnectionId, SessionExport, SessionId};
use pulse_store::SessionStore;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::health::{self, HealthInputs, HealthResponse};
use crate::hub::HubHandle;
use crate::metrics;
use crate::websocket::session::run_ws_session;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Hub client for registering connections.
    pub hub: HubHandle,
    /// Session store, for health counters.
    pub store: SessionStore,
    /// Analysis pipeline, for health counters.
    pub pipeline: Arc<AnalysisPipeline>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Prometheus handle rendered at `/metrics`.
    pub metrics: PrometheusHandle,
    /// When the server started.
    pub start_time: Instant,
}

/// The pulse HTTP/WebSocket server.
pub struct PulseServer {
    config: Arc<ServerConfig>,
    hub: HubHandle,
    pipeline: Arc<AnalysisPipeline>,
    shutdown: CancellationToken,
    metrics: PrometheusHandle,
    start_time: Instant,
}

impl PulseServer {
    /// Create a new server around a running hub.
    pub fn new(
        config: ServerConfig,
        hub: HubHandle,
        pipeline: Arc<AnalysisPipeline>,
        metrics: PrometheusHandle,
    ) -> Self {
        Self {
            config: Arc::new(config),
            hub,
            pipeline,
            shutdown: CancellationToken::new(),
            metrics,
            start_time: Instant::now(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            hub: self.hub.clone(),
            store: self.hub.store().clone(),
            pipeline: self.pipeline.clone(),
            config: self.config.clone(),
            metrics: self.metrics.clone(),
            start_time: self.start_time,
        };

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/sessions/{session_id}", get(session_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Bind the listener and serve until the shutdown token fires.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let app = self.router();
        let token = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = served {
                error!(error = %e, "server terminated with error");
            }
        });

        info!(%local_addr, "listening");
        Ok((local_addr, handle))
    }

    /// Stop accepting connections and let in-flight requests finish.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the hub handle.
    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }
}

/// GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let connection_id = ConnectionId::new();
    let session_id = SessionId::new();
    let config = state.config.clone();
    ws.max_message_size(config.max_message_size)
        .on_upgrade(move |socket| {
            run_ws_session(socket, connection_id, session_id, state.hub, config)
        })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state
        .hub
        .snapshot()
        .await
        .map_or(0, |snapshot| snapshot.connections);
    let inputs = HealthInputs {
        connections,
        sessions: state.store.len(),
        active_sessions: state.store.active_count(state.config.inactivity_timeout),
        analysis_running: state.pipeline.is_running(),
        pipeline: state.pipeline.stats(),
    };
    Json(health::health_check(state.start_time, inputs))
}

/// GET /sessions/{session_id}
async fn session_handler(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<SessionExport>, StatusCode> {
    state
        .store
        .export(&session_id, state.config.inactivity_timeout)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    metrics::render(&state.metrics)
}
