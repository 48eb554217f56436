//! # pulse-agent
//!
//! pulse server binary. Wires settings, the classifier, the analysis
//! pipeline, the hub and the HTTP/WebSocket server together.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use pulse_analysis::{AnalysisPipeline, PipelineConfig};
use pulse_llm::{ChatCompletionClassifier, ChatConfig, Classifier};
use pulse_server::config::ServerConfig;
use pulse_server::{Hub, HubConfig, HubHandle, PulseServer};
use pulse_settings::{AnalysisSettings, LlmSettings, PulseSettings};
use pulse_store::SessionStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// pulse server.
#[derive(Parser, Debug)]
#[command(name = "pulse-agent", about = "Real-time behavior commentary server")]
struct Cli {
    /// Settings file (defaults to `~/.pulse/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Log level filter (overrides settings; `RUST_LOG` still wins).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn apply(&self, settings: &mut PulseSettings) {
        if let Some(ref host) = self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(ref level) = self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.log_json {
            settings.logging.json = true;
        }
    }
}

fn chat_config(llm: &LlmSettings) -> ChatConfig {
    ChatConfig {
        base_url: llm.base_url.clone(),
        model: llm.model.clone(),
        api_key: llm.api_key.clone(),
        max_tokens: llm.max_tokens,
        temperature: llm.temperature,
        timeout: llm.timeout(),
        probe_timeout: llm.probe_timeout(),
    }
}

fn pipeline_config(analysis: &AnalysisSettings) -> PipelineConfig {
    PipelineConfig {
        interval: analysis.interval(),
        request_capacity: analysis.request_queue,
        result_capacity: analysis.result_queue,
        max_in_flight: analysis.max_in_flight,
    }
}

/// Periodically close idle connections and sweep their sessions.
async fn cleanup_loop(hub: HubHandle, every: Duration, idle: Duration, token: CancellationToken) {
    let mut ticker = tokio::time::interval(every);
    // Skip the immediate first tick
    let _ = ticker.tick().await;
    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = ticker.tick() => {
                let removed = hub.cleanup_inactive(idle).await;
                debug!(removed, "inactive session sweep");
            }
        }
    }
}

/// Wait up to `grace` for background tasks, leaving stragglers detached.
///
/// Returns `false` if the grace period ran out.
async fn drain(tasks: Vec<JoinHandle<()>>, grace: Duration) -> bool {
    info!(task_count = tasks.len(), ?grace, "waiting for background tasks");
    let joined = tokio::time::timeout(grace, async {
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "background task failed");
            }
        }
    })
    .await;
    if joined.is_err() {
        warn!(?grace, "shutdown timed out, some tasks may still be running");
    }
    joined.is_ok()
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.context("Failed to listen for ctrl-c")?,
            _ = term.recv() => info!("received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(pulse_settings::settings_path);
    let mut settings = pulse_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    args.apply(&mut settings);
    settings.validate().context("Invalid settings")?;

    pulse_core::logging::init_subscriber(&settings.logging.level, settings.logging.json);
    let metrics_handle = pulse_server::metrics::install_recorder();

    // Classifier
    if settings.llm.api_key.is_none() {
        warn!("no LLM API key configured (PULSE_LLM_API_KEY / DEEPSEEK_API_KEY)");
    }
    let classifier = ChatCompletionClassifier::new(chat_config(&settings.llm))
        .context("Failed to build classifier client")?;
    match classifier.test_connection().await {
        Ok(()) => info!(model = %settings.llm.model, "classifier reachable"),
        Err(e) => warn!(error = %e, category = e.category(), "classifier probe failed, continuing"),
    }
    let classifier: Arc<dyn Classifier> = Arc::new(classifier);

    // Pipeline + hub
    let background = CancellationToken::new();
    let pipeline = Arc::new(AnalysisPipeline::new(
        classifier,
        pipeline_config(&settings.analysis),
    ));
    let store = SessionStore::new(settings.session.history_window);
    let (hub, hub_handle) = Hub::new(
        store,
        pipeline.clone(),
        pipeline.results(),
        HubConfig {
            recent_actions: settings.session.recent_actions,
            ..HubConfig::default()
        },
        background.clone(),
    );
    let hub_task = tokio::spawn(hub.run());
    let _ = pipeline.start();

    let cleanup_task = tokio::spawn(cleanup_loop(
        hub_handle.clone(),
        settings.session.cleanup_interval(),
        settings.session.inactivity_timeout(),
        background.clone(),
    ));

    // Server
    let server = PulseServer::new(
        ServerConfig::from_settings(&settings),
        hub_handle,
        pipeline.clone(),
        metrics_handle,
    );
    let (addr, serve_task) = server
        .listen()
        .await
        .context("Failed to bind server")?;
    info!("pulse listening on ws://{addr}/ws");

    shutdown_signal().await?;

    info!("Shutting down...");
    pipeline.stop();
    server.shutdown();
    background.cancel();
    let _ = drain(
        vec![hub_task, cleanup_task, serve_task],
        settings.server.shutdown_timeout(),
    )
    .await;

    info!("Shutdown complete");
    Ok(())
}
