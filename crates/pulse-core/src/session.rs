//! Per-session record and the state derived from it.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::SessionId;
use crate::state::BehaviorState;

/// One stage/click observation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Reported stage.
    pub stage: u32,
    /// Reported cumulative clicks.
    pub clicks: u32,
}

impl HistoryEntry {
    /// Create an entry.
    pub fn new(stage: u32, clicks: u32) -> Self {
        Self { stage, clicks }
    }
}

/// Rolling behavioral state of one session.
///
/// History is stored as pairs so the stage and click series can never
/// diverge in length. The window is enforced by [`SessionRecord::push_action`].
#[derive(Clone, Debug, PartialEq)]
pub struct SessionRecord {
    id: SessionId,
    current_state: BehaviorState,
    history: VecDeque<HistoryEntry>,
    purchases: Vec<u32>,
    commentary: Vec<String>,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    last_analysis_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Create an empty record in state `new`.
    pub fn new(id: SessionId, now: DateTime<Utc>, window: usize) -> Self {
        Self {
            id,
            current_state: BehaviorState::New,
            history: VecDeque::with_capacity(window),
            purchases: Vec::new(),
            commentary: Vec::new(),
            created_at: now,
            last_activity: now,
            last_analysis_at: now,
        }
    }

    /// Session identifier.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Current behavioral state.
    pub fn current_state(&self) -> BehaviorState {
        self.current_state
    }

    /// History window, oldest first.
    pub fn history(&self) -> &VecDeque<HistoryEntry> {
        &self.history
    }

    /// Stage series, oldest first.
    pub fn stage_history(&self) -> Vec<u32> {
        self.history.iter().map(|e| e.stage).collect()
    }

    /// Click series, oldest first.
    pub fn clicks_history(&self) -> Vec<u32> {
        self.history.iter().map(|e| e.clicks).collect()
    }

    /// Purchased item IDs in purchase order.
    pub fn purchases(&self) -> &[u32] {
        &self.purchases
    }

    /// Commentary delivered to this session so far.
    pub fn commentary(&self) -> &[String] {
        &self.commentary
    }

    /// When the record was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last client activity (action or purchase).
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    /// Last time an analysis was applied.
    pub fn last_analysis_at(&self) -> DateTime<Utc> {
        self.last_analysis_at
    }

    /// Append an observation, evicting the oldest entries beyond `window`.
    pub fn push_action(&mut self, entry: HistoryEntry, window: usize, now: DateTime<Utc>) {
        self.history.push_back(entry);
        while self.history.len() > window {
            let _ = self.history.pop_front();
        }
        self.last_activity = now;
    }

    /// Record a purchased item.
    pub fn push_purchase(&mut self, item_id: u32, now: DateTime<Utc>) {
        self.purchases.push(item_id);
        self.last_activity = now;
    }

    /// Overwrite the behavioral state.
    pub fn set_state(&mut self, state: BehaviorState, now: DateTime<Utc>) {
        self.current_state = state;
        self.last_analysis_at = now;
    }

    /// Record a piece of delivered commentary.
    pub fn push_commentary(&mut self, text: String, now: DateTime<Utc>) {
        self.commentary.push(text);
        self.last_analysis_at = now;
    }

    /// Whether the session saw activity within `timeout` of `now`.
    pub fn is_active(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        let idle = (now - self.last_activity).to_std().unwrap_or(Duration::ZERO);
        idle < timeout
    }

    /// The most recent `limit` observations, oldest first.
    pub fn recent_actions(&self, limit: usize) -> Vec<HistoryEntry> {
        let skip = self.history.len().saturating_sub(limit);
        self.history.iter().skip(skip).copied().collect()
    }

    /// Compute the derived user state from the two newest observations.
    pub fn derive_state(&self) -> DerivedUserState {
        let mut newest = self.history.iter().rev();
        let latest = newest.next().copied();
        let previous = newest.next().copied();

        let engagement_rate = match (latest, previous) {
            (Some(now), Some(prev)) if now.stage > prev.stage => {
                let clicks_delta = f64::from(now.clicks) - f64::from(prev.clicks);
                let stage_delta = f64::from(now.stage) - f64::from(prev.stage);
                clicks_delta / stage_delta
            }
            _ => 0.0,
        };

        let latest = latest.unwrap_or(HistoryEntry::new(0, 0));
        let previous = previous.unwrap_or(HistoryEntry::new(0, 0));
        DerivedUserState {
            current_state: self.current_state,
            last_change: self.last_analysis_at,
            stage: latest.stage,
            clicks: latest.clicks,
            previous_stage: previous.stage,
            previous_clicks: previous.clicks,
            engagement_rate,
        }
    }

    /// Serializable snapshot including the derived state.
    pub fn export(&self, now: DateTime<Utc>, timeout: Duration) -> SessionExport {
        SessionExport {
            session_id: self.id.clone(),
            current_state: self.current_state,
            stage_history: self.stage_history(),
            clicks_history: self.clicks_history(),
            item_purchases: self.purchases.clone(),
            commentary: self.commentary.clone(),
            created_at: self.created_at,
            last_activity: self.last_activity,
            last_analysis_at: self.last_analysis_at,
            derived: self.derive_state(),
            is_active: self.is_active(now, timeout),
        }
    }
}

/// Snapshot of the newest observations, never stored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DerivedUserState {
    /// Session state at derivation time.
    pub current_state: BehaviorState,
    /// When the state last changed through analysis.
    pub last_change: DateTime<Utc>,
    /// Latest stage (0 when there is no history).
    pub stage: u32,
    /// Latest clicks (0 when there is no history).
    pub clicks: u32,
    /// Stage of the observation before the latest.
    pub previous_stage: u32,
    /// Clicks of the observation before the latest.
    pub previous_clicks: u32,
    /// Click growth per stage between the two newest observations.
    pub engagement_rate: f64,
}

/// Full export of a session record.
#[derive(Clone, Debug, Serialize)]
pub struct SessionExport {
    /// Session identifier.
    pub session_id: SessionId,
    /// Current state.
    pub current_state: BehaviorState,
    /// Stage series.
    pub stage_history: Vec<u32>,
    /// Click series.
    pub clicks_history: Vec<u32>,
    /// Purchased items.
    pub item_purchases: Vec<u32>,
    /// Delivered commentary.
    pub commentary: Vec<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last activity.
    pub last_activity: DateTime<Utc>,
    /// Last analysis.
    pub last_analysis_at: DateTime<Utc>,
    /// Derived state at export time.
    pub derived: DerivedUserState,
    /// Whether the session is currently considered active.
    pub is_active: bool,
}
