//! Pipeline counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Live counters shared between the pipeline and its workers.
#[derive(Debug, Default)]
pub struct PipelineStats {
    enqueued: AtomicU64,
    dropped_requests: AtomicU64,
    dropped_results: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    published: AtomicU64,
    in_flight: AtomicU64,
}

impl PipelineStats {
    pub(crate) fn record_enqueued(&self) {
        let _ = self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_request(&self) {
        let _ = self.dropped_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_result(&self) {
        let _ = self.dropped_results.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_completed(&self) {
        let _ = self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        let _ = self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_published(&self) {
        let _ = self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn task_started(&self) -> u64 {
        self.in_flight.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn task_finished(&self) -> u64 {
        self.in_flight.fetch_sub(1, Ordering::Relaxed).saturating_sub(1)
    }

    /// Point-in-time copy. `queued` is supplied by the pipeline.
    pub fn snapshot(&self, queued: usize) -> PipelineStatsSnapshot {
        PipelineStatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped_requests: self.dropped_requests.load(Ordering::Relaxed),
            dropped_results: self.dropped_results.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            queued,
        }
    }
}

/// Serializable copy of [`PipelineStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStatsSnapshot {
    /// Requests accepted into the queue.
    pub enqueued: u64,
    /// Requests shed because the queue was full.
    pub dropped_requests: u64,
    /// Results shed because the result queue was full.
    pub dropped_results: u64,
    /// Classifier calls that succeeded.
    pub completed: u64,
    /// Classifier calls that failed.
    pub failed: u64,
    /// Results handed to the result stream.
    pub published: u64,
    /// Classifier calls currently running.
    pub in_flight: u64,
    /// Requests waiting for the next drain.
    pub queued: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_flight_tracks_start_and_finish() {
        let stats = PipelineStats::default();
        assert_eq!(stats.task_started(), 1);
        assert_eq!(stats.task_started(), 2);
        assert_eq!(stats.task_finished(), 1);
        assert_eq!(stats.snapshot(3).in_flight, 1);
        assert_eq!(stats.snapshot(3).queued, 3);
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let stats = PipelineStats::default();
        stats.record_dropped_request();
        let json = serde_json::to_value(stats.snapshot(0)).unwrap();
        assert_eq!(json["droppedRequests"], 1);
    }
}
