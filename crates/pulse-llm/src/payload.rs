//! Classifier wire payload and its structural validation.

use pulse_core::{BehaviorState, Classification, Urgency};
use serde::{Deserialize, Serialize};

use crate::errors::{ClassifierError, Result};

/// Longest accepted commentary, in characters.
pub const MAX_MESSAGE_CHARS: usize = 200;

/// Classification exactly as a backend returns it, before validation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawClassification {
    /// Commentary text.
    pub message: String,
    /// Requested transition flag.
    pub state_change: bool,
    /// Proposed state name; empty is treated as absent.
    pub new_state: Option<String>,
    /// Urgency name.
    pub urgency: String,
}

impl RawClassification {
    /// Parse a JSON document into a raw payload.
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Enforce the classification schema.
    ///
    /// - `message` is non-empty and at most [`MAX_MESSAGE_CHARS`] characters
    /// - `urgency` is `low`, `medium` or `high`
    /// - a non-empty `new_state` names one of the five classified states
    pub fn validate(self) -> Result<Classification> {
        if self.message.trim().is_empty() {
            return Err(ClassifierError::invalid("message cannot be empty"));
        }
        let chars = self.message.chars().count();
        if chars > MAX_MESSAGE_CHARS {
            return Err(ClassifierError::invalid(format!(
                "message has {chars} characters, limit is {MAX_MESSAGE_CHARS}"
            )));
        }

        let urgency = Urgency::parse(&self.urgency).ok_or_else(|| {
            ClassifierError::invalid(format!(
                "urgency must be low, medium or high, got {:?}",
                self.urgency
            ))
        })?;

        let new_state = match self.new_state.as_deref() {
            None | Some("") => None,
            Some(name) => Some(BehaviorState::parse_classified(name).ok_or_else(|| {
                ClassifierError::invalid(format!("invalid new_state: {name}"))
            })?),
        };

        Ok(Classification {
            message: self.message,
            state_change: self.state_change,
            new_state,
            urgency,
        })
    }
}
