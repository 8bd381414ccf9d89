//! Client Events
//!
//! Events sent from viewers to the debate core. Viewers speak loosely-typed
//! JSON, so this module is the single place where that JSON is classified into
//! a closed set of events the conductor understands.
//!
//! # Classification
//!
//! ```text
//! {"heartbeat": "ping"}                 -> Heartbeat (no-op)
//! {"type": "Button", ...}               -> ControlButton (relayed verbatim)
//! {"type": "Slider", ...}               -> ControlSlider (relayed verbatim)
//! {"type": "Test", "group"?, "index"?}  -> PulseTest
//! {"message": "..."} / anything else    -> Comment (empty text = resume)
//! ```

use serde_json::Value;
use thiserror::Error;

/// Default group/index for pulse test frames when the client omits them
const DEFAULT_TEST_SLOT: u32 = 1;

/// Errors produced while classifying a client payload
#[derive(Debug, Error)]
pub enum EventError {
    /// Payload was not valid JSON
    #[error("invalid client payload: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Payload was JSON but not an object
    #[error("client payload must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// Events from a viewer to the conductor
#[derive(Clone, Debug, PartialEq)]
pub enum ClientEvent {
    /// Keep-alive ping; never reaches the scheduler
    Heartbeat,
    /// Free-text human comment (or an explicit resume when empty)
    Comment {
        /// Comment text, trimmed
        text: String,
    },
    /// Control-button event relayed verbatim to viewers
    ControlButton {
        /// Original payload
        raw: Value,
    },
    /// Control-slider event relayed verbatim to viewers
    ControlSlider {
        /// Original payload
        raw: Value,
    },
    /// Request to flash the fixed test pattern on the side channel
    PulseTest {
        /// Target display group
        group: u32,
        /// Target display slot
        index: u32,
        /// Original payload, echoed to other conversation viewers
        raw: Value,
    },
}

impl ClientEvent {
    /// Classify raw JSON text from a viewer
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON object.
    pub fn parse(text: &str) -> Result<Self, EventError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_json(value)
    }

    /// Classify an already-decoded JSON payload
    ///
    /// # Errors
    ///
    /// Returns [`EventError::NotAnObject`] for arrays, strings and scalars.
    pub fn from_json(value: Value) -> Result<Self, EventError> {
        let Some(object) = value.as_object() else {
            return Err(EventError::NotAnObject(json_kind(&value)));
        };

        if object.get("heartbeat").and_then(Value::as_str) == Some("ping") {
            return Ok(Self::Heartbeat);
        }

        match object.get("type").and_then(Value::as_str) {
            Some("Button") => return Ok(Self::ControlButton { raw: value }),
            Some("Slider") => return Ok(Self::ControlSlider { raw: value }),
            Some("Test") => {
                let group = slot_field(object.get("group"));
                let index = slot_field(object.get("index"));
                return Ok(Self::PulseTest { group, index, raw: value });
            }
            _ => {}
        }

        let text = object
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();
        Ok(Self::Comment { text })
    }

    /// Short name for logging
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Heartbeat => "heartbeat",
            Self::Comment { .. } => "comment",
            Self::ControlButton { .. } => "control-button",
            Self::ControlSlider { .. } => "control-slider",
            Self::PulseTest { .. } => "pulse-test",
        }
    }
}

fn slot_field(value: Option<&Value>) -> u32 {
    value
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(DEFAULT_TEST_SLOT)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_heartbeat() {
        let event = ClientEvent::parse(r#"{"heartbeat": "ping"}"#).unwrap();
        assert_eq!(event, ClientEvent::Heartbeat);
    }

    #[test]
    fn test_comment_is_trimmed() {
        let event = ClientEvent::parse(r#"{"message": "  what about carbon taxes?  "}"#).unwrap();
        assert_eq!(
            event,
            ClientEvent::Comment {
                text: "what about carbon taxes?".to_string()
            }
        );
    }

    #[test]
    fn test_missing_message_is_empty_comment() {
        let event = ClientEvent::parse(r#"{"foo": 1}"#).unwrap();
        assert_eq!(event, ClientEvent::Comment { text: String::new() });
    }

    #[test]
    fn test_control_events_keep_raw_payload() {
        let event = ClientEvent::parse(r#"{"type": "Slider", "value": 42}"#).unwrap();
        match event {
            ClientEvent::ControlSlider { raw } => assert_eq!(raw["value"], 42),
            other => panic!("expected slider, got {other:?}"),
        }
        let event = ClientEvent::parse(r#"{"type": "Button", "id": "b1"}"#).unwrap();
        assert!(matches!(event, ClientEvent::ControlButton { .. }));
        assert_eq!(event.kind(), "control-button");
    }

    #[test]
    fn test_pulse_test_defaults() {
        let event = ClientEvent::parse(r#"{"type": "Test"}"#).unwrap();
        match event {
            ClientEvent::PulseTest { group, index, .. } => {
                assert_eq!(group, 1);
                assert_eq!(index, 1);
            }
            other => panic!("expected pulse test, got {other:?}"),
        }
        let event = ClientEvent::parse(r#"{"type": "Test", "group": 4, "index": 2}"#).unwrap();
        assert!(matches!(event, ClientEvent::PulseTest { group: 4, index: 2, .. }));
    }

    #[test]
    fn test_rejects_non_objects() {
        assert!(matches!(
            ClientEvent::parse("[1, 2]"),
            Err(EventError::NotAnObject("array"))
        ));
        assert!(matches!(
            ClientEvent::parse("not json"),
            Err(EventError::InvalidJson(_))
        ));
    }
}
