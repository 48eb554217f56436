//! Session lifetime and inbound validation limits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Session history and inactivity settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Observations kept per session.
    pub history_window: usize,
    /// Observations attached to each analysis request.
    pub recent_actions: usize,
    /// Sessions idle this long are swept.
    pub inactivity_timeout_ms: u64,
    /// How often the sweep runs.
    pub cleanup_interval_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            history_window: 10,
            recent_actions: 10,
            inactivity_timeout_ms: 300_000,
            cleanup_interval_ms: 60_000,
        }
    }
}

impl SessionSettings {
    /// Inactivity timeout.
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_millis(self.inactivity_timeout_ms)
    }

    /// Sweep interval.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }
}

/// Accepted ranges for inbound events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationSettings {
    /// Largest accepted stage.
    pub stage_max: u32,
    /// Largest accepted click count.
    pub clicks_max: u32,
    /// Smallest purchasable item ID.
    pub item_id_min: u32,
    /// Largest purchasable item ID.
    pub item_id_max: u32,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            stage_max: 3000,
            clicks_max: 10_000,
            item_id_min: 0,
            item_id_max: 14,
        }
    }
}
