//! [`AnalysisPipeline`]: bounded request queue, timed batch drain, bounded
//! worker pool, bounded result stream.
//!
//! Lifecycle:
//!
//! ```text
//! idle ──start()──▶ running ──stop()──▶ stopped
//!   └────────────────stop()───────────────┘
//! ```
//!
//! `stopped` is final. Workers already running at `stop()` are detached,
//! finish their classifier call, and discard the result.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use pulse_core::{AnalysisRequest, AnalysisResult};
use pulse_llm::Classifier;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::stats::{PipelineStats, PipelineStatsSnapshot};

/// Consumer end of the result queue.
pub type ResultStream = ReceiverStream<AnalysisResult>;

/// Pipeline cadence and capacity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Drain period.
    pub interval: Duration,
    /// Pending request capacity.
    pub request_capacity: usize,
    /// Undelivered result capacity.
    pub result_capacity: usize,
    /// Concurrent classifier calls.
    pub max_in_flight: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            request_capacity: 100,
            result_capacity: 100,
            max_in_flight: 8,
        }
    }
}

/// What happened to an enqueued request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use]
pub enum EnqueueOutcome {
    /// Accepted for the next drain.
    Enqueued,
    /// Shed because the queue was full.
    Dropped,
    /// Ignored because the pipeline is not running.
    Stopped,
}

/// Asynchronous classification pipeline.
pub struct AnalysisPipeline {
    config: PipelineConfig,
    classifier: Arc<dyn Classifier>,
    request_tx: mpsc::Sender<AnalysisRequest>,
    request_rx: Mutex<Option<mpsc::Receiver<AnalysisRequest>>>,
    result_tx: Mutex<Option<mpsc::Sender<AnalysisResult>>>,
    result_rx: Mutex<Option<mpsc::Receiver<AnalysisResult>>>,
    running: AtomicBool,
    stopped: AtomicBool,
    cancel: CancellationToken,
    stats: Arc<PipelineStats>,
}

impl std::fmt::Debug for AnalysisPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisPipeline")
            .field("config", &self.config)
            .field("classifier", &self.classifier.name())
            .field("running", &self.is_running())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl AnalysisPipeline {
    /// Create an idle pipeline.
    pub fn new(classifier: Arc<dyn Classifier>, config: PipelineConfig) -> Self {
        let (request_tx, request_rx) = mpsc::channel(config.request_capacity.max(1));
        let (result_tx, result_rx) = mpsc::channel(config.result_capacity.max(1));
        Self {
            config,
            classifier,
            request_tx,
            request_rx: Mutex::new(Some(request_rx)),
            result_tx: Mutex::new(Some(result_tx)),
            result_rx: Mutex::new(Some(result_rx)),
            running: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            stats: Arc::new(PipelineStats::default()),
        }
    }

    /// Pipeline configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Spawn the drain loop. Must be called inside a tokio runtime.
    ///
    /// Returns `false` if the pipeline was already started or has been stopped.
    pub fn start(&self) -> bool {
        if self.stopped.load(Ordering::SeqCst) {
            warn!("analysis pipeline was stopped and cannot be restarted");
            return false;
        }
        let Some(requests) = self.request_rx.lock().take() else {
            return false;
        };
        let Some(result_tx) = self.result_tx.lock().clone() else {
            return false;
        };

        self.running.store(true, Ordering::SeqCst);
        let drain = DrainLoop {
            classifier: Arc::clone(&self.classifier),
            result_tx,
            cancel: self.cancel.clone(),
            stats: Arc::clone(&self.stats),
            permits: Arc::new(Semaphore::new(self.config.max_in_flight.max(1))),
            interval: self.config.interval,
        };
        drop(tokio::spawn(drain.run(requests)));

        info!(
            interval_ms = u64::try_from(self.config.interval.as_millis()).unwrap_or(u64::MAX),
            max_in_flight = self.config.max_in_flight,
            classifier = self.classifier.name(),
            "analysis pipeline started"
        );
        true
    }

    /// Stop accepting work and cancel the drain loop. Idempotent.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.running.store(false, Ordering::SeqCst);
        self.cancel.cancel();
        drop(self.result_tx.lock().take());
        drop(self.request_rx.lock().take());
        info!(stats = ?self.stats(), "analysis pipeline stopped");
    }

    /// Whether the pipeline accepts requests.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Submit a request without blocking.
    pub fn enqueue(&self, request: AnalysisRequest) -> EnqueueOutcome {
        if !self.is_running() {
            return EnqueueOutcome::Stopped;
        }
        match self.request_tx.try_send(request) {
            Ok(()) => {
                self.stats.record_enqueued();
                EnqueueOutcome::Enqueued
            }
            Err(TrySendError::Full(request)) => {
                self.stats.record_dropped_request();
                metrics::counter!("analysis_requests_dropped_total").increment(1);
                warn!(session_id = %request.session_id, "analysis queue full, dropping request");
                EnqueueOutcome::Dropped
            }
            Err(TrySendError::Closed(_)) => EnqueueOutcome::Stopped,
        }
    }

    /// Take the result stream. Only the first call returns `Some`.
    ///
    /// The stream ends once the pipeline is stopped and every worker has
    /// finished.
    pub fn results(&self) -> Option<ResultStream> {
        self.result_rx.lock().take().map(ReceiverStream::new)
    }

    /// Counter snapshot.
    pub fn stats(&self) -> PipelineStatsSnapshot {
        let queued = if self.stopped.load(Ordering::SeqCst) {
            0
        } else {
            self.request_tx.max_capacity() - self.request_tx.capacity()
        };
        self.stats.snapshot(queued)
    }
}

impl Drop for AnalysisPipeline {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct DrainLoop {
    classifier: Arc<dyn Classifier>,
    result_tx: mpsc::Sender<AnalysisResult>,
    cancel: CancellationToken,
    stats: Arc<PipelineStats>,
    permits: Arc<Semaphore>,
    interval: Duration,
}

impl DrainLoop {
    #[allow(clippy::cast_precision_loss)] // batch sizes are bounded by queue capacity
    async fn run(self, mut requests: mpsc::Receiver<AnalysisRequest>) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut workers = JoinSet::new();

        'drain: loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "analysis worker panicked");
                    }
                }
                _ = ticker.tick() => {
                    let batch = drain_batch(&mut requests);
                    if !batch.is_empty() {
                        debug!(batch = batch.len(), "draining analysis batch");
                        metrics::histogram!("analysis_batch_size").record(batch.len() as f64);
                    }
                    for request in batch {
                        let permit = tokio::select! {
                            biased;
                            () = self.cancel.cancelled() => break 'drain,
                            permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                                Ok(permit) => permit,
                                Err(_) => break 'drain,
                            },
                        };
                        let _ = workers.spawn(classify_one(
                            Arc::clone(&self.classifier),
                            request,
                            self.result_tx.clone(),
                            self.cancel.clone(),
                            Arc::clone(&self.stats),
                            permit,
                        ));
                    }
                }
            }
        }

        let detached = workers.len();
        workers.detach_all();
        debug!(detached, "analysis drain loop exited");
    }
}

fn drain_batch(requests: &mut mpsc::Receiver<AnalysisRequest>) -> Vec<AnalysisRequest> {
    let mut batch = Vec::new();
    while let Ok(request) = requests.try_recv() {
        batch.push(request);
    }
    batch
}

#[allow(clippy::cast_precision_loss)] // in-flight count is bounded by the pool size
#[instrument(skip_all, fields(session_id = %request.session_id))]
async fn classify_one(
    classifier: Arc<dyn Classifier>,
    request: AnalysisRequest,
    result_tx: mpsc::Sender<AnalysisResult>,
    cancel: CancellationToken,
    stats: Arc<PipelineStats>,
    permit: OwnedSemaphorePermit,
) {
    metrics::gauge!("analysis_in_flight").set(stats.task_started() as f64);
    let outcome = classifier
        .classify(&request.user_state, &request.recent_actions)
        .await;
    metrics::gauge!("analysis_in_flight").set(stats.task_finished() as f64);
    drop(permit);

    let classification = match outcome {
        Ok(classification) => classification,
        Err(e) => {
            stats.record_failed();
            metrics::counter!("analysis_failures_total", "category" => e.category()).increment(1);
            warn!(error = %e, category = e.category(), "classification failed");
            return;
        }
    };
    stats.record_completed();

    if cancel.is_cancelled() {
        debug!("pipeline stopped, discarding result");
        return;
    }

    let result = AnalysisResult::from_classification(&request, classification, Utc::now());
    match result_tx.try_send(result) {
        Ok(()) => stats.record_published(),
        Err(TrySendError::Full(_)) => {
            stats.record_dropped_result();
            metrics::counter!("analysis_results_dropped_total").increment(1);
            warn!("result queue full, dropping result");
        }
        Err(TrySendError::Closed(_)) => debug!("result stream closed, dropping result"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use futures::StreamExt;
    use pulse_core::{
        BehaviorState, Classification, DerivedUserState, HistoryEntry, SessionId, Urgency,
    };
    use pulse_llm::ClassifierError;

    const FAIL_STAGE: u32 = 666;
    const INTERVAL: Duration = Duration::from_secs(10);
    const WAIT: Duration = Duration::from_secs(120);

    #[derive(Default)]
    struct MockClassifier {
        calls: AtomicUsize,
        active: AtomicUsize,
        max_active: AtomicUsize,
        gate: Option<Arc<Semaphore>>,
    }

    impl MockClassifier {
        fn gated() -> (Arc<Self>, Arc<Semaphore>) {
            let gate = Arc::new(Semaphore::new(0));
            let mock = Self {
                gate: Some(Arc::clone(&gate)),
                ..Self::default()
            };
            (Arc::new(mock), gate)
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Classifier for MockClassifier {
        async fn classify(
            &self,
            state: &DerivedUserState,
            _recent_actions: &[HistoryEntry],
        ) -> pulse_llm::Result<Classification> {
            let _ = self.calls.fetch_add(1, Ordering::SeqCst);
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            let _ = self.max_active.fetch_max(active, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                let _pass = gate.acquire().await;
            }
            let _ = self.active.fetch_sub(1, Ordering::SeqCst);

            if state.stage == FAIL_STAGE {
                return Err(ClassifierError::EmptyResponse);
            }
            Ok(Classification {
                message: format!("stage {}", state.stage),
                state_change: false,
                new_state: Some(BehaviorState::Productive),
                urgency: Urgency::Low,
            })
        }

        async fn test_connection(&self) -> pulse_llm::Result<()> {
            Ok(())
        }
    }

    fn request(session: &str, stage: u32) -> AnalysisRequest {
        let now = Utc::now();
        AnalysisRequest {
            session_id: SessionId::from(session),
            user_state: DerivedUserState {
                current_state: BehaviorState::New,
                last_change: now,
                stage,
                clicks: 0,
                previous_stage: 0,
                previous_clicks: 0,
                engagement_rate: 0.0,
            },
            recent_actions: vec![HistoryEntry::new(stage, 0)],
            submitted_at: now,
        }
    }

    fn pipeline(mock: &Arc<MockClassifier>, config: PipelineConfig) -> AnalysisPipeline {
        let classifier: Arc<dyn Classifier> = Arc::clone(mock) as Arc<dyn Classifier>;
        AnalysisPipeline::new(classifier, config)
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            interval: INTERVAL,
            ..PipelineConfig::default()
        }
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        for _ in 0..1_000 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test(start_paused = true)]
    async fn enqueue_before_start_is_ignored() {
        let mock = Arc::new(MockClassifier::default());
        let pipeline = pipeline(&mock, config());
        assert_eq!(pipeline.enqueue(request("a", 1)), EnqueueOutcome::Stopped);
        assert_eq!(pipeline.stats().queued, 0);
        assert_eq!(pipeline.stats().enqueued, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_drops_without_blocking() {
        let mock = Arc::new(MockClassifier::default());
        let pipeline = pipeline(
            &mock,
            PipelineConfig {
                request_capacity: 2,
                ..config()
            },
        );
        assert!(pipeline.start());

        assert_eq!(pipeline.enqueue(request("a", 1)), EnqueueOutcome::Enqueued);
        assert_eq!(pipeline.enqueue(request("b", 2)), EnqueueOutcome::Enqueued);
        assert_eq!(pipeline.enqueue(request("c", 3)), EnqueueOutcome::Dropped);
        assert_eq!(pipeline.enqueue(request("d", 4)), EnqueueOutcome::Dropped);

        let stats = pipeline.stats();
        assert_eq!(stats.enqueued, 2);
        assert_eq!(stats.dropped_requests, 2);
        assert_eq!(stats.queued, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn batch_is_classified_on_tick() {
        let mock = Arc::new(MockClassifier::default());
        let pipeline = pipeline(&mock, config());
        let mut results = pipeline.results().unwrap();
        assert!(pipeline.start());

        for (i, id) in ["a", "b", "c"].into_iter().enumerate() {
            assert_eq!(
                pipeline.enqueue(request(id, u32::try_from(i).unwrap())),
                EnqueueOutcome::Enqueued
            );
        }

        tokio::time::advance(INTERVAL - Duration::from_millis(1)).await;
        tokio::task::yield_now().await;
        assert_eq!(mock.calls(), 0);

        let mut sessions = HashSet::new();
        for _ in 0..3 {
            let result = tokio::time::timeout(WAIT, results.next())
                .await
                .unwrap()
                .unwrap();
            assert!(result.state_change);
            assert_eq!(result.previous_state, BehaviorState::New);
            let _ = sessions.insert(result.session_id.to_string());
        }
        assert_eq!(sessions, HashSet::from(["a", "b", "c"].map(String::from)));
        assert_eq!(mock.calls(), 3);
        assert_eq!(pipeline.stats().published, 3);
        assert_eq!(pipeline.stats().queued, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_then_enqueue_has_no_effect() {
        let mock = Arc::new(MockClassifier::default());
        let pipeline = pipeline(&mock, config());
        assert!(pipeline.start());
        pipeline.stop();
        assert!(!pipeline.is_running());

        let before = pipeline.stats();
        assert_eq!(pipeline.enqueue(request("a", 1)), EnqueueOutcome::Stopped);
        tokio::time::sleep(INTERVAL * 3).await;

        assert_eq!(pipeline.stats(), before);
        assert_eq!(mock.calls(), 0);
        assert!(!pipeline.start());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_ends_result_stream() {
        let mock = Arc::new(MockClassifier::default());
        let pipeline = pipeline(&mock, config());
        let mut results = pipeline.results().unwrap();
        assert!(pipeline.start());
        pipeline.stop();
        pipeline.stop();
        let end = tokio::time::timeout(WAIT, results.next()).await.unwrap();
        assert!(end.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_results_discarded_after_stop() {
        let (mock, gate) = MockClassifier::gated();
        let pipeline = pipeline(&mock, config());
        let mut results = pipeline.results().unwrap();
        assert!(pipeline.start());
        assert_eq!(pipeline.enqueue(request("a", 1)), EnqueueOutcome::Enqueued);

        wait_until(|| mock.calls() == 1).await;
        pipeline.stop();
        gate.add_permits(1);

        let end = tokio::time::timeout(WAIT, results.next()).await.unwrap();
        assert!(end.is_none());
        let stats = pipeline.stats();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.published, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn worker_pool_is_bounded() {
        let (mock, gate) = MockClassifier::gated();
        let pipeline = pipeline(
            &mock,
            PipelineConfig {
                max_in_flight: 2,
                ..config()
            },
        );
        let mut results = pipeline.results().unwrap();
        assert!(pipeline.start());
        for i in 0..5 {
            assert_eq!(pipeline.enqueue(request("s", i)), EnqueueOutcome::Enqueued);
        }

        wait_until(|| mock.calls() == 2).await;
        tokio::time::sleep(INTERVAL * 2).await;
        assert_eq!(mock.calls(), 2);
        assert_eq!(pipeline.stats().in_flight, 2);

        gate.add_permits(1);
        for _ in 0..5 {
            let _ = tokio::time::timeout(WAIT, results.next())
                .await
                .unwrap()
                .unwrap();
        }
        assert_eq!(mock.max_active.load(Ordering::SeqCst), 2);
        assert_eq!(pipeline.stats().in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_isolated() {
        let mock = Arc::new(MockClassifier::default());
        let pipeline = pipeline(&mock, config());
        let mut results = pipeline.results().unwrap();
        assert!(pipeline.start());
        assert_eq!(pipeline.enqueue(request("bad", FAIL_STAGE)), EnqueueOutcome::Enqueued);
        assert_eq!(pipeline.enqueue(request("good", 5)), EnqueueOutcome::Enqueued);

        let result = tokio::time::timeout(WAIT, results.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.session_id.as_str(), "good");
        wait_until(|| pipeline.stats().failed == 1).await;
        assert_eq!(pipeline.stats().completed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn full_result_queue_drops_results() {
        let mock = Arc::new(MockClassifier::default());
        let pipeline = pipeline(
            &mock,
            PipelineConfig {
                result_capacity: 1,
                ..config()
            },
        );
        assert!(pipeline.start());
        for i in 0..3 {
            assert_eq!(pipeline.enqueue(request("s", i)), EnqueueOutcome::Enqueued);
        }

        wait_until(|| pipeline.stats().completed == 3).await;
        let stats = pipeline.stats();
        assert_eq!(stats.published, 1);
        assert_eq!(stats.dropped_results, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn results_taken_once_and_start_is_idempotent() {
        let mock = Arc::new(MockClassifier::default());
        let pipeline = pipeline(&mock, config());
        assert!(pipeline.results().is_some());
        assert_matches!(pipeline.results(), None);
        assert!(pipeline.start());
        assert!(!pipeline.start());
        assert!(pipeline.is_running());
    }
}
