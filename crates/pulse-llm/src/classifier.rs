//! The [`Classifier`] trait.

use async_trait::async_trait;
use pulse_core::{Classification, DerivedUserState, HistoryEntry};

use crate::errors::Result;

/// Produces a structural classification of a session's recent behavior.
///
/// Implementations must be cheap to share behind an `Arc`; the pipeline
/// calls [`classify`](Classifier::classify) concurrently from several tasks.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify `state` given the most recent observations (oldest first).
    async fn classify(
        &self,
        state: &DerivedUserState,
        recent_actions: &[HistoryEntry],
    ) -> Result<Classification>;

    /// Lightweight liveness probe against the backend.
    async fn test_connection(&self) -> Result<()>;

    /// Backend name for logs.
    fn name(&self) -> &str {
        "classifier"
    }
}
