//! Envelopes exchanged with the analysis pipeline.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::SessionId;
use crate::session::{DerivedUserState, HistoryEntry};
use crate::state::BehaviorState;

/// How pressing a classifier considers its commentary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    /// Background remark.
    #[default]
    Low,
    /// Worth showing soon.
    Medium,
    /// Show immediately.
    High,
}

impl Urgency {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Parse a wire name. Anything other than `low`, `medium` or `high` is rejected.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structurally valid classifier output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Commentary for the user.
    pub message: String,
    /// Whether the classifier asked for a state transition.
    pub state_change: bool,
    /// Proposed next state, always a member of [`BehaviorState::CLASSIFIED`].
    pub new_state: Option<BehaviorState>,
    /// Urgency hint.
    pub urgency: Urgency,
}

impl Classification {
    /// Whether this classification changes session state.
    ///
    /// A proposed state implies a change even when the flag was left unset.
    pub fn effective_state_change(&self) -> bool {
        self.state_change || self.new_state.is_some()
    }
}

/// Work item submitted to the pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisRequest {
    /// Session the request belongs to.
    pub session_id: SessionId,
    /// Derived state at submission time.
    pub user_state: DerivedUserState,
    /// Most recent observations, oldest first.
    pub recent_actions: Vec<HistoryEntry>,
    /// Submission time.
    pub submitted_at: DateTime<Utc>,
}

/// Completed analysis routed back to the hub.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisResult {
    /// Session the result belongs to.
    pub session_id: SessionId,
    /// Classifier output.
    pub classification: Classification,
    /// Session state when the request was built.
    pub previous_state: BehaviorState,
    /// Effective state-change flag.
    pub state_change: bool,
    /// Completion time.
    pub completed_at: DateTime<Utc>,
}

impl AnalysisResult {
    /// Build a result for `request` from a classification.
    pub fn from_classification(
        request: &AnalysisRequest,
        classification: Classification,
        completed_at: DateTime<Utc>,
    ) -> Self {
        let state_change = classification.effective_state_change();
        Self {
            session_id: request.session_id.clone(),
            previous_state: request.user_state.current_state,
            classification,
            state_change,
            completed_at,
        }
    }
}
