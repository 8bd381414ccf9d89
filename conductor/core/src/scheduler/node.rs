//! Scheduler Nodes and Edges
//!
//! The debate graph has a fixed topology:
//!
//! ```text
//!   ┌──────────── speaker_1 ──► speaker_2 ──► ║ USER ║ (interrupt point)
//!   │                                           │
//!   │                               ┌─Feedback──┴──Continue─┐
//!   │                               ▼                       │
//!   │                            CRITIC                     │
//!   │                               │                       │
//!   │                               ▼                       │
//!   └───────────────────────────── speaker_4 ◄──────────────┘
//!
//!   speaker_3/5/6, RELAY_A, RELAY_B: continuations chained after a cycle
//!   speaker's output within the same turn (see [`Continuation`])
//!
//!   any node ──(debate ended)──► FINISH
//! ```
//!
//! Only cycle nodes are ever the active node. Routing to anything else, or
//! leaving `USER` without a gate decision, is a configuration error.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::SchedulerError;
use super::gate::GateDecision;

/// One of the six speaker seats, in roster order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Seat {
    /// Opens every cycle
    First,
    /// Answers the first seat, then hands over to the human
    Second,
    /// Continuation-only seat
    Third,
    /// Closes every cycle, after the critic when one ran
    Fourth,
    /// Continuation-only seat
    Fifth,
    /// Continuation-only seat
    Sixth,
}

impl Seat {
    /// All seats in roster order
    pub const ALL: [Seat; 6] = [
        Seat::First,
        Seat::Second,
        Seat::Third,
        Seat::Fourth,
        Seat::Fifth,
        Seat::Sixth,
    ];

    /// Zero-based roster position
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::First => 0,
            Self::Second => 1,
            Self::Third => 2,
            Self::Fourth => 3,
            Self::Fifth => 4,
            Self::Sixth => 5,
        }
    }

    /// Parse a config name (`"first"` .. `"sixth"`)
    #[must_use]
    pub fn from_name(name: &str) -> Option<Seat> {
        let seat = match name.trim().to_ascii_lowercase().as_str() {
            "first" => Self::First,
            "second" => Self::Second,
            "third" => Self::Third,
            "fourth" => Self::Fourth,
            "fifth" => Self::Fifth,
            "sixth" => Self::Sixth,
            _ => return None,
        };
        Some(seat)
    }

    /// Whether the seat is a node of the main cycle
    #[must_use]
    pub fn in_cycle(self) -> bool {
        matches!(self, Self::First | Self::Second | Self::Fourth)
    }
}

/// Scheduler position
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeId {
    /// A speaker turn
    Speaker(Seat),
    /// Critic feedback turn
    Critic,
    /// Human interrupt point
    User,
    /// Punch-line rewrite of the preceding statement
    RelayA,
    /// Simplification of the preceding statement
    RelayB,
    /// Terminal node
    Finish,
}

impl NodeId {
    /// Initial node of every session
    pub const START: NodeId = NodeId::Speaker(Seat::First);

    /// Static successor of a cycle node
    ///
    /// `USER` needs the gate decision; pass it as `gate`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Config`] for continuation-only nodes, for
    /// `FINISH`, and for `USER` without a gate decision.
    pub fn successor(self, gate: Option<GateDecision>) -> Result<NodeId, SchedulerError> {
        match (self, gate) {
            (Self::Speaker(Seat::First), _) => Ok(Self::Speaker(Seat::Second)),
            (Self::Speaker(Seat::Second), _) => Ok(Self::User),
            (Self::User, Some(decision)) => Ok(decision.destination()),
            (Self::Critic, _) => Ok(Self::Speaker(Seat::Fourth)),
            (Self::Speaker(Seat::Fourth), _) => Ok(Self::Speaker(Seat::First)),
            (Self::User, None) => Err(SchedulerError::Config(
                "USER node completed without a gate decision".to_string(),
            )),
            (node, _) => Err(SchedulerError::Config(format!(
                "{node} has no outgoing edge"
            ))),
        }
    }

    /// Whether the node can be the active node of a session
    #[must_use]
    pub fn is_schedulable(self) -> bool {
        match self {
            Self::Speaker(seat) => seat.in_cycle(),
            Self::Critic | Self::User | Self::Finish => true,
            Self::RelayA | Self::RelayB => false,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Speaker(seat) => write!(f, "speaker_{}", seat.index() + 1),
            Self::Critic => f.write_str("CRITIC"),
            Self::User => f.write_str("USER"),
            Self::RelayA => f.write_str("RELAY_A"),
            Self::RelayB => f.write_str("RELAY_B"),
            Self::Finish => f.write_str("FINISH"),
        }
    }
}

/// Post-processing step chained after a cycle speaker's statement
///
/// Relays rewrite the statement that precedes them in the chain; a speaker
/// continuation appends a statement of its own in the same turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Continuation {
    /// Punch-line rewrite
    RelayA,
    /// Simplification
    RelayB,
    /// A continuation-only seat speaks next
    Speaker(Seat),
}

impl Continuation {
    /// Node that runs this continuation
    #[must_use]
    pub fn node(self) -> NodeId {
        match self {
            Self::RelayA => NodeId::RelayA,
            Self::RelayB => NodeId::RelayB,
            Self::Speaker(seat) => NodeId::Speaker(seat),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_edges() {
        let first = NodeId::START;
        let second = first.successor(None).unwrap();
        assert_eq!(second, NodeId::Speaker(Seat::Second));
        assert_eq!(second.successor(None).unwrap(), NodeId::User);
        assert_eq!(
            NodeId::User.successor(Some(GateDecision::Feedback)).unwrap(),
            NodeId::Critic
        );
        assert_eq!(
            NodeId::User.successor(Some(GateDecision::Continue)).unwrap(),
            NodeId::Speaker(Seat::Fourth)
        );
        assert_eq!(
            NodeId::Critic.successor(None).unwrap(),
            NodeId::Speaker(Seat::Fourth)
        );
        assert_eq!(
            NodeId::Speaker(Seat::Fourth).successor(None).unwrap(),
            NodeId::START
        );
    }

    #[test]
    fn test_invalid_edges_are_config_errors() {
        assert!(matches!(
            NodeId::User.successor(None),
            Err(SchedulerError::Config(_))
        ));
        assert!(matches!(
            NodeId::RelayA.successor(None),
            Err(SchedulerError::Config(_))
        ));
        assert!(matches!(
            NodeId::Speaker(Seat::Fifth).successor(None),
            Err(SchedulerError::Config(_))
        ));
        assert!(matches!(
            NodeId::Finish.successor(None),
            Err(SchedulerError::Config(_))
        ));
    }

    #[test]
    fn test_node_serde() {
        let json = serde_json::to_string(&NodeId::Speaker(Seat::Fourth)).unwrap();
        assert_eq!(json, r#"{"speaker":"fourth"}"#);
        let back: NodeId = serde_json::from_str(r#""user""#).unwrap();
        assert_eq!(back, NodeId::User);
        assert_eq!(NodeId::Speaker(Seat::Second).to_string(), "speaker_2");
    }

    #[test]
    fn test_continuation_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            chain: Vec<Continuation>,
        }
        let parsed: Wrapper =
            toml::from_str(r#"chain = ["relay_a", { speaker = "fifth" }]"#).unwrap();
        assert_eq!(
            parsed.chain,
            vec![Continuation::RelayA, Continuation::Speaker(Seat::Fifth)]
        );
        assert_eq!(parsed.chain[1].node(), NodeId::Speaker(Seat::Fifth));
    }
}
