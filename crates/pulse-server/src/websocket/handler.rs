//! Inbound frame decoding: raw text into a validated [`ClientEvent`].

use serde_json::Value;
use tracing::{debug, instrument};

use crate::protocol::{ClientEvent, ProtocolError, RawPurchase, RawUserAction, ValidationLimits};

/// Decode and validate one inbound text frame.
#[instrument(skip_all, fields(kind))]
pub fn decode_event(text: &str, limits: &ValidationLimits) -> Result<ClientEvent, ProtocolError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
    if !value.is_object() {
        return Err(ProtocolError::InvalidJson("expected a JSON object".into()));
    }

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    let _ = tracing::Span::current().record("kind", kind.as_str());

    let event = match kind.as_str() {
        "user_action" => {
            let raw: RawUserAction = serde_json::from_value(value)
                .map_err(|e| ProtocolError::InvalidUserAction(e.to_string()))?;
            ClientEvent::UserAction(limits.user_action(&raw)?)
        }
        "purchase" => {
            let raw: RawPurchase = serde_json::from_value(value)
                .map_err(|e| ProtocolError::InvalidPurchase(e.to_string()))?;
            ClientEvent::Purchase(limits.purchase(&raw)?)
        }
        _ => return Err(ProtocolError::UnknownType(kind)),
    };
    debug!("decoded client event");
    Ok(event)
}

/// Decode a binary frame, which must hold UTF-8 JSON.
pub fn decode_binary(data: &[u8], limits: &ValidationLimits) -> Result<ClientEvent, ProtocolError> {
    let text = std::str::from_utf8(data)
        .map_err(|_| ProtocolError::InvalidJson("binary frame is not valid UTF-8".into()))?;
    decode_event(text, limits)
}
