//! Session behavioral state machine.
//!
//! ```text
//! new ──▶ analyzed ──▶ { productive, taking_break, disengaged, confused, obsessed }
//! ```
//!
//! Members of the classified set may move freely among each other. There
//! is no terminal state; a session stays in its last state until deleted.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Behavioral classification of a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorState {
    /// Freshly connected, never analyzed.
    #[default]
    New,
    /// Analyzed at least once without a concrete classification.
    Analyzed,
    /// Actively clicking and progressing.
    Productive,
    /// High stage but little click activity.
    TakingBreak,
    /// Low activity across both metrics.
    Disengaged,
    /// Erratic or unclear patterns.
    Confused,
    /// Excessive clicking relative to progress.
    Obsessed,
}

impl BehaviorState {
    /// The states a classifier is allowed to propose.
    pub const CLASSIFIED: [Self; 5] = [
        Self::Productive,
        Self::TakingBreak,
        Self::Disengaged,
        Self::Confused,
        Self::Obsessed,
    ];

    /// Wire name (`snake_case`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Analyzed => "analyzed",
            Self::Productive => "productive",
            Self::TakingBreak => "taking_break",
            Self::Disengaged => "disengaged",
            Self::Confused => "confused",
            Self::Obsessed => "obsessed",
        }
    }

    /// Parse one of the classifier-proposable states.
    ///
    /// `new` and `analyzed` are internal and never accepted from a classifier.
    pub fn parse_classified(value: &str) -> Option<Self> {
        Self::CLASSIFIED
            .into_iter()
            .find(|state| state.as_str() == value)
    }

    /// Next state after an analysis that signalled a state change.
    ///
    /// A proposed state always wins. Without one the current state is kept,
    /// except that `analyzed` supersedes `new`.
    #[must_use]
    pub fn after_analysis(self, proposed: Option<Self>) -> Self {
        match (self, proposed) {
            (_, Some(next)) => next,
            (Self::New, None) => Self::Analyzed,
            (current, None) => current,
        }
    }
}

impl fmt::Display for BehaviorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_new() {
        assert_eq!(BehaviorState::default(), BehaviorState::New);
    }

    #[test]
    fn new_becomes_analyzed_without_proposal() {
        assert_eq!(
            BehaviorState::New.after_analysis(None),
            BehaviorState::Analyzed
        );
    }

    #[test]
    fn classified_state_is_retained_without_proposal() {
        assert_eq!(
            BehaviorState::Confused.after_analysis(None),
            BehaviorState::Confused
        );
        assert_eq!(
            BehaviorState::Analyzed.after_analysis(None),
            BehaviorState::Analyzed
        );
    }

    #[test]
    fn proposal_always_wins() {
        for from in [
            BehaviorState::New,
            BehaviorState::Analyzed,
            BehaviorState::Productive,
            BehaviorState::Obsessed,
        ] {
            for to in BehaviorState::CLASSIFIED {
                assert_eq!(from.after_analysis(Some(to)), to);
            }
        }
    }

    #[test]
    fn parse_classified_rejects_internal_states() {
        assert_eq!(BehaviorState::parse_classified("new"), None);
        assert_eq!(BehaviorState::parse_classified("analyzed"), None);
        assert_eq!(BehaviorState::parse_classified("bored"), None);
        assert_eq!(
            BehaviorState::parse_classified("taking_break"),
            Some(BehaviorState::TakingBreak)
        );
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&BehaviorState::TakingBreak).unwrap();
        assert_eq!(json, "\"taking_break\"");
        let back: BehaviorState = serde_json::from_str("\"obsessed\"").unwrap();
        assert_eq!(back, BehaviorState::Obsessed);
    }

    #[test]
    fn display_matches_wire_name() {
        for state in BehaviorState::CLASSIFIED {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{state}\""));
        }
    }
}
