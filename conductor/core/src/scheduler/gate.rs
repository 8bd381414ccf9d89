//! Feedback Gate
//!
//! Counter-driven decision taken at every `USER` evaluation: route through
//! the critic, or go straight on to the fourth seat. Pure function of the
//! counter, so runs are reproducible.

use serde::{Deserialize, Serialize};

use super::node::{NodeId, Seat};

/// Outcome of the gate; exactly two destinations exist
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    /// Route to the critic
    Feedback,
    /// Route to the default successor
    Continue,
}

impl GateDecision {
    /// Node the decision routes to
    #[must_use]
    pub fn destination(self) -> NodeId {
        match self {
            Self::Feedback => NodeId::Critic,
            Self::Continue => NodeId::Speaker(Seat::Fourth),
        }
    }
}

/// Count one qualifying turn and decide
///
/// Returns the new counter value with the decision. The counter resets to 0
/// when it exceeds `interval`.
#[must_use]
pub fn evaluate(turns_since_feedback: u32, interval: u32) -> (u32, GateDecision) {
    let count = turns_since_feedback.saturating_add(1);
    if count > interval {
        (0, GateDecision::Feedback)
    } else {
        (count, GateDecision::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_feedback_every_third_turn() {
        let mut counter = 0;
        let mut feedback_turns = Vec::new();
        for turn in 1..=10 {
            let (next, decision) = evaluate(counter, 2);
            counter = next;
            if decision == GateDecision::Feedback {
                feedback_turns.push(turn);
            }
        }
        assert_eq!(feedback_turns, vec![3, 6, 9]);
        assert_eq!(counter, 1);
    }

    #[test]
    fn test_zero_interval_always_feedback() {
        assert_eq!(evaluate(0, 0), (0, GateDecision::Feedback));
    }

    #[test]
    fn test_destinations() {
        assert_eq!(GateDecision::Feedback.destination(), NodeId::Critic);
        assert_eq!(
            GateDecision::Continue.destination(),
            NodeId::Speaker(Seat::Fourth)
        );
    }
}
