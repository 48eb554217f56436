//! Wire protocol: inbound client events and outbound server frames.
//!
//! Both directions are JSON objects tagged by `type`. Inbound events are
//! decoded into a lenient wire shape first so that out-of-range values
//! (negative stages, zero timestamps) surface as validation errors rather
//! than parse errors.

use pulse_core::SessionId;
use pulse_settings::ValidationSettings;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog;

/// Error code for a frame that is not a known JSON event.
pub const CODE_INVALID_MESSAGE: &str = "invalid_message";
/// Error code for an out-of-range `user_action`.
pub const CODE_INVALID_USER_ACTION: &str = "invalid_user_action";
/// Error code for an invalid `purchase`.
pub const CODE_INVALID_PURCHASE: &str = "invalid_purchase";
/// Error code for an event on a session the store no longer knows.
pub const CODE_SESSION_ERROR: &str = "session_error";

/// A progress report from the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UserAction {
    /// Current stage.
    pub stage: u32,
    /// Cumulative clicks.
    pub clicks: u32,
    /// Client-side unix timestamp.
    pub timestamp: i64,
}

/// An item purchase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Purchase {
    /// Purchased item.
    pub item_id: u32,
    /// Category the client filed the item under.
    pub category: u32,
    /// Client-side unix timestamp.
    pub timestamp: i64,
}

/// Validated inbound event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientEvent {
    /// `user_action`
    UserAction(UserAction),
    /// `purchase`
    Purchase(Purchase),
}

impl ClientEvent {
    /// Wire name of the event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UserAction(_) => "user_action",
            Self::Purchase(_) => "purchase",
        }
    }
}

/// Lenient wire shape; missing fields default to zero.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RawUserAction {
    pub stage: i64,
    pub clicks: i64,
    pub timestamp: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RawPurchase {
    pub item_id: i64,
    pub category: i64,
    pub timestamp: i64,
}

/// Inbound decode or validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Not a JSON object, or not UTF-8.
    #[error("invalid JSON format: {0}")]
    InvalidJson(String),

    /// `type` missing or not one of the known events.
    #[error("unknown message type: {0}")]
    UnknownType(String),

    /// `user_action` fields out of range.
    #[error("user_action validation failed: {0}")]
    InvalidUserAction(String),

    /// `purchase` fields out of range or inconsistent.
    #[error("purchase validation failed: {0}")]
    InvalidPurchase(String),
}

impl ProtocolError {
    /// Machine-readable code sent in `error` frames.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidJson(_) | Self::UnknownType(_) => CODE_INVALID_MESSAGE,
            Self::InvalidUserAction(_) => CODE_INVALID_USER_ACTION,
            Self::InvalidPurchase(_) => CODE_INVALID_PURCHASE,
        }
    }
}

/// Accepted ranges for inbound events.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValidationLimits {
    /// Largest accepted stage.
    pub stage_max: u32,
    /// Largest accepted click count.
    pub clicks_max: u32,
    /// Smallest purchasable item.
    pub item_id_min: u32,
    /// Largest purchasable item.
    pub item_id_max: u32,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self::from(&ValidationSettings::default())
    }
}

impl From<&ValidationSettings> for ValidationLimits {
    fn from(settings: &ValidationSettings) -> Self {
        Self {
            stage_max: settings.stage_max,
            clicks_max: settings.clicks_max,
            item_id_min: settings.item_id_min,
            item_id_max: settings.item_id_max,
        }
    }
}

fn in_range(value: i64, min: u32, max: u32) -> Option<u32> {
    u32::try_from(value)
        .ok()
        .filter(|v| (min..=max).contains(v))
}

impl ValidationLimits {
    pub(crate) fn user_action(&self, raw: &RawUserAction) -> Result<UserAction, ProtocolError> {
        let invalid = ProtocolError::InvalidUserAction;
        let stage = in_range(raw.stage, 0, self.stage_max)
            .ok_or_else(|| invalid(format!("stage must be between 0 and {}", self.stage_max)))?;
        let clicks = in_range(raw.clicks, 0, self.clicks_max)
            .ok_or_else(|| invalid(format!("clicks must be between 0 and {}", self.clicks_max)))?;
        if raw.timestamp <= 0 {
            return Err(invalid("timestamp must be a valid unix timestamp".into()));
        }
        Ok(UserAction {
            stage,
            clicks,
            timestamp: raw.timestamp,
        })
    }

    pub(crate) fn purchase(&self, raw: &RawPurchase) -> Result<Purchase, ProtocolError> {
        let invalid = ProtocolError::InvalidPurchase;
        let item_id = in_range(raw.item_id, self.item_id_min, self.item_id_max).ok_or_else(|| {
            invalid(format!(
                "item_id must be between {} and {}",
                self.item_id_min, self.item_id_max
            ))
        })?;
        let expected = catalog::category_of(item_id);
        if raw.category != i64::from(expected) {
            return Err(invalid(format!(
                "category {} does not match item {item_id} (expected {expected})",
                raw.category
            )));
        }
        if raw.timestamp <= 0 {
            return Err(invalid("timestamp must be a valid unix timestamp".into()));
        }
        Ok(Purchase {
            item_id,
            category: expected,
            timestamp: raw.timestamp,
        })
    }
}

/// Outbound frame. Every variant carries a unix `timestamp`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Commentary with the state it was produced for.
    Response {
        /// State or category name.
        state: String,
        /// Commentary text.
        message: String,
        /// Unix seconds.
        timestamp: i64,
    },
    /// Rejected inbound frame or failed operation.
    Error {
        /// Machine-readable code.
        code: String,
        /// Human-readable detail.
        message: String,
        /// Unix seconds.
        timestamp: i64,
    },
    /// Connection lifecycle notice.
    ClientInfo {
        /// Lifecycle action, e.g. `connected`.
        action: String,
        /// Session bound to the connection.
        session_id: SessionId,
        /// Unix seconds.
        timestamp: i64,
    },
}

fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

impl ServerFrame {
    /// `response` frame stamped now.
    pub fn response(state: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Response {
            state: state.into(),
            message: message.into(),
            timestamp: unix_now(),
        }
    }

    /// `error` frame stamped now.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
            timestamp: unix_now(),
        }
    }

    /// `client_info` frame stamped now.
    pub fn client_info(action: impl Into<String>, session_id: SessionId) -> Self {
        Self::ClientInfo {
            action: action.into(),
            session_id,
            timestamp: unix_now(),
        }
    }
}

impl From<&ProtocolError> for ServerFrame {
    fn from(err: &ProtocolError) -> Self {
        Self::error(err.code(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn limits() -> ValidationLimits {
        ValidationLimits::default()
    }

    #[test]
    fn default_limits_follow_settings() {
        let l = limits();
        assert_eq!(l.stage_max, 3000);
        assert_eq!(l.clicks_max, 10_000);
        assert_eq!((l.item_id_min, l.item_id_max), (0, 14));
    }

    #[test]
    fn user_action_in_range() {
        let raw = RawUserAction {
            stage: 3000,
            clicks: 0,
            timestamp: 1,
        };
        let action = limits().user_action(&raw).unwrap();
        assert_eq!(action.stage, 3000);
        assert_eq!(action.clicks, 0);
    }

    #[test]
    fn user_action_rejects_negative_and_oversized_values() {
        for (stage, clicks) in [(-1, 0), (3001, 0), (0, -5), (0, 10_001)] {
            let raw = RawUserAction {
                stage,
                clicks,
                timestamp: 1,
            };
            assert_matches!(
                limits().user_action(&raw),
                Err(ProtocolError::InvalidUserAction(_)),
                "stage={stage} clicks={clicks}"
            );
        }
    }

    #[test]
    fn user_action_requires_positive_timestamp() {
        let raw = RawUserAction {
            stage: 1,
            clicks: 1,
            timestamp: 0,
        };
        let err = limits().user_action(&raw).unwrap_err();
        assert_eq!(err.code(), CODE_INVALID_USER_ACTION);
    }

    #[test]
    fn purchase_category_must_match_item() {
        for item_id in 0..=14_i64 {
            for category in 0..3_i64 {
                let raw = RawPurchase {
                    item_id,
                    category,
                    timestamp: 1,
                };
                let result = limits().purchase(&raw);
                if category == item_id % 3 {
                    assert!(result.is_ok(), "item {item_id} category {category}");
                } else {
                    assert_matches!(result, Err(ProtocolError::InvalidPurchase(_)));
                }
            }
        }
    }

    #[test]
    fn purchase_item_out_of_range() {
        let raw = RawPurchase {
            item_id: 15,
            category: 0,
            timestamp: 1,
        };
        assert_matches!(limits().purchase(&raw), Err(ProtocolError::InvalidPurchase(_)));
    }

    #[test]
    fn error_codes() {
        assert_eq!(ProtocolError::InvalidJson("x".into()).code(), "invalid_message");
        assert_eq!(ProtocolError::UnknownType("x".into()).code(), "invalid_message");
        assert_eq!(
            ProtocolError::InvalidPurchase("x".into()).code(),
            "invalid_purchase"
        );
    }

    #[test]
    fn frames_are_flat_and_tagged() {
        let json = serde_json::to_value(ServerFrame::response("confused", "hm")).unwrap();
        assert_eq!(json["type"], "response");
        assert_eq!(json["state"], "confused");
        assert_eq!(json["message"], "hm");
        assert!(json["timestamp"].as_i64().unwrap() > 0);

        let json =
            serde_json::to_value(ServerFrame::client_info("connected", SessionId::from("s1")))
                .unwrap();
        assert_eq!(json["type"], "client_info");
        assert_eq!(json["action"], "connected");
        assert_eq!(json["session_id"], "s1");
    }

    #[test]
    fn error_frame_from_protocol_error() {
        let err = ProtocolError::UnknownType("ping".into());
        let json = serde_json::to_value(ServerFrame::from(&err)).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "invalid_message");
        assert_eq!(json["message"], "unknown message type: ping");
    }
}
