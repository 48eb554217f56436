//! [`SessionStore`] implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use pulse_core::{
    BehaviorState, Clock, HistoryEntry, SessionExport, SessionId, SessionRecord, SystemClock,
};
use tracing::debug;

use crate::errors::{Result, StoreError};

/// History window used when none is configured.
pub const DEFAULT_HISTORY_WINDOW: usize = 10;

/// Thread-safe map of session records.
///
/// Cloning is cheap and yields a handle to the same underlying map.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<SessionId, SessionRecord>>>,
    window: usize,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.len())
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_WINDOW)
    }
}

impl SessionStore {
    /// Create a store with the given history window and the system clock.
    pub fn new(window: usize) -> Self {
        Self::with_clock(window, Arc::new(SystemClock))
    }

    /// Create a store driven by a custom clock.
    pub fn with_clock(window: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            window: window.max(1),
            clock,
        }
    }

    /// History window size.
    pub fn window(&self) -> usize {
        self.window
    }

    /// Create a fresh record, replacing any existing one with the same ID.
    pub fn create(&self, id: &SessionId) -> SessionRecord {
        let record = SessionRecord::new(id.clone(), self.clock.now(), self.window);
        let replaced = self.sessions.write().insert(id.clone(), record.clone());
        if replaced.is_some() {
            debug!(session_id = %id, "session record replaced");
        }
        record
    }

    /// Snapshot of one record.
    pub fn get(&self, id: &str) -> Option<SessionRecord> {
        self.sessions.read().get(id).cloned()
    }

    /// Remove a record. Returns whether one existed.
    pub fn delete(&self, id: &str) -> bool {
        self.sessions.write().remove(id).is_some()
    }

    /// Append a stage/click observation and refresh activity.
    ///
    /// Returns the updated snapshot so callers can derive state without a
    /// second lookup racing other writers.
    pub fn record_action(&self, id: &str, stage: u32, clicks: u32) -> Result<SessionRecord> {
        let now = self.clock.now();
        let mut sessions = self.sessions.write();
        let record = sessions
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(id))?;
        record.push_action(HistoryEntry::new(stage, clicks), self.window, now);
        Ok(record.clone())
    }

    /// Append a purchased item and refresh activity.
    pub fn record_purchase(&self, id: &str, item_id: u32) -> Result<()> {
        let now = self.clock.now();
        self.with_record(id, |record| record.push_purchase(item_id, now))
    }

    /// Overwrite the behavioral state.
    pub fn set_state(&self, id: &str, state: BehaviorState) -> Result<()> {
        let now = self.clock.now();
        self.with_record(id, |record| record.set_state(state, now))
    }

    /// Append a piece of delivered commentary.
    pub fn append_commentary(&self, id: &str, text: impl Into<String>) -> Result<()> {
        let now = self.clock.now();
        let text = text.into();
        self.with_record(id, |record| record.push_commentary(text, now))
    }

    /// Whether the session had activity within `timeout`. Unknown IDs are inactive.
    pub fn is_active(&self, id: &str, timeout: Duration) -> bool {
        let now = self.clock.now();
        self.sessions
            .read()
            .get(id)
            .is_some_and(|record| record.is_active(now, timeout))
    }

    /// Remove every session idle for at least `timeout`, returning their IDs.
    ///
    /// The write lock is held for the whole sweep, so a session cannot be
    /// refreshed between being judged inactive and being removed.
    pub fn remove_inactive(&self, timeout: Duration) -> Vec<SessionId> {
        let now = self.clock.now();
        let mut sessions = self.sessions.write();
        let expired: Vec<SessionId> = sessions
            .values()
            .filter(|record| !record.is_active(now, timeout))
            .map(|record| record.id().clone())
            .collect();
        for id in &expired {
            let _ = sessions.remove(id);
        }
        if !expired.is_empty() {
            debug!(removed = expired.len(), remaining = sessions.len(), "inactive sessions removed");
        }
        expired
    }

    /// Remove every session idle for at least `timeout`. Returns the count.
    pub fn cleanup_inactive(&self, timeout: Duration) -> usize {
        self.remove_inactive(timeout).len()
    }

    /// Number of stored sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Number of sessions active within `timeout`.
    pub fn active_count(&self, timeout: Duration) -> usize {
        let now = self.clock.now();
        self.sessions
            .read()
            .values()
            .filter(|record| record.is_active(now, timeout))
            .count()
    }

    /// Serializable export of one session.
    pub fn export(&self, id: &str, timeout: Duration) -> Option<SessionExport> {
        let now = self.clock.now();
        self.sessions
            .read()
            .get(id)
            .map(|record| record.export(now, timeout))
    }

    fn with_record(&self, id: &str, f: impl FnOnce(&mut SessionRecord)) -> Result<()> {
        let mut sessions = self.sessions.write();
        let record = sessions
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(id))?;
        f(record);
        Ok(())
    }
}
