//! Viewer Messages
//!
//! Messages sent from the debate core to connected viewers. Viewers are plain
//! JSON consumers (browser pages, the side-channel display controller), so
//! every message here serializes to the exact JSON shape those clients read.
//!
//! # Wire Shapes
//!
//! ```text
//! conversation viewers   {"response": "<partial or full text>", "agentType": "<speaker>"}
//! turn completion        {"response": "[END]", "agentType": "<last speaker>"}
//! side-channel viewers   {"type": "PulseCode", "group": 100, "index": 1..N, "value": "0120..."}
//! ```

use serde::{Deserialize, Serialize};

/// Marker text broadcast once a full turn has been relayed
pub const END_MARKER: &str = "[END]";

/// Message type tag for pulse-code frames on the side channel
pub const PULSE_CODE_TYPE: &str = "PulseCode";

/// Messages from the debate core to a viewer
///
/// Serialized untagged: each variant already carries the field names the
/// viewer expects, so the enum itself never appears on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    /// Typing-effect frame or turn marker for conversation viewers
    Relay(RelayMessage),
    /// Pulse-code frame for side-channel viewers
    PulseCode(PulseCodeMessage),
    /// Client event relayed verbatim (control buttons, sliders)
    Passthrough(serde_json::Value),
}

impl OutboundMessage {
    /// Build a typing-effect frame
    pub fn relay(response: impl Into<String>, agent_type: impl Into<String>) -> Self {
        Self::Relay(RelayMessage {
            response: response.into(),
            agent_type: Some(agent_type.into()),
        })
    }

    /// Build the end-of-turn marker for the given speaker
    pub fn end_of_turn(agent_type: impl Into<String>) -> Self {
        Self::relay(END_MARKER, agent_type)
    }

    /// Build a server notice without a speaker tag
    pub fn notice(response: impl Into<String>) -> Self {
        Self::Relay(RelayMessage {
            response: response.into(),
            agent_type: None,
        })
    }

    /// Serialize to the JSON text sent over the wire
    ///
    /// # Errors
    ///
    /// Returns an error if the passthrough payload cannot be serialized.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Conversation frame: cumulative text plus the speaker it belongs to
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayMessage {
    /// Cumulative partial text, full text, or [`END_MARKER`]
    pub response: String,
    /// Speaker tag; absent on plain server notices
    #[serde(rename = "agentType", skip_serializing_if = "Option::is_none", default)]
    pub agent_type: Option<String>,
}

/// Side-channel frame carrying one transcoded statement
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PulseCodeMessage {
    /// Always [`PULSE_CODE_TYPE`]
    #[serde(rename = "type")]
    pub kind: String,
    /// Display group the hardware routes on
    pub group: u32,
    /// Rotating display slot, `1..=window`
    pub index: u32,
    /// Sentence digit-strings joined by the sentence gap symbol
    pub value: String,
}

impl PulseCodeMessage {
    /// Create a pulse-code frame
    pub fn new(group: u32, index: u32, value: impl Into<String>) -> Self {
        Self {
            kind: PULSE_CODE_TYPE.to_string(),
            group,
            index,
            value: value.into(),
        }
    }
}

/// Session identifier
///
/// Keys the checkpoint store. Operators usually pin it in configuration so a
/// restarted daemon finds the previous checkpoint.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Borrow the raw identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_relay_message_wire_shape() {
        let json = OutboundMessage::relay("Hel", "BOB").to_json().unwrap();
        assert_eq!(json, r#"{"response":"Hel","agentType":"BOB"}"#);
    }

    #[test]
    fn test_end_marker_wire_shape() {
        let json = OutboundMessage::end_of_turn("FRITZ").to_json().unwrap();
        assert_eq!(json, r#"{"response":"[END]","agentType":"FRITZ"}"#);
    }

    #[test]
    fn test_notice_omits_agent_type() {
        let json = OutboundMessage::notice("Processing your request...")
            .to_json()
            .unwrap();
        assert_eq!(json, r#"{"response":"Processing your request..."}"#);
    }

    #[test]
    fn test_pulse_code_wire_shape() {
        let msg = OutboundMessage::PulseCode(PulseCodeMessage::new(100, 3, "0002"));
        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "PulseCode");
        assert_eq!(value["group"], 100);
        assert_eq!(value["index"], 3);
        assert_eq!(value["value"], "0002");
    }

    #[test]
    fn test_passthrough_is_verbatim() {
        let raw = serde_json::json!({"type": "Slider", "value": 0.4, "id": 7});
        let json = OutboundMessage::Passthrough(raw.clone()).to_json().unwrap();
        let back: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn test_session_id_display() {
        let id = SessionId::from("evening");
        assert_eq!(id.to_string(), "evening");
        assert_eq!(id.as_str(), "evening");
    }
}
