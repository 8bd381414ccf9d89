//! Debate Session State
//!
//! One mutable record per debate. Scheduler nodes never touch it directly:
//! a node reads the state, returns a [`NodeDelta`], and the driver merges the
//! delta with [`SessionState::apply`]. That keeps the invariants in one place:
//!
//! - `history` is append-only; entries are never dropped or reordered
//! - `debate_ended` is monotonic
//! - the counters only reset through their own triggers
//!
//! The whole record (including `active_node`) is serializable, so a
//! checkpoint of it is enough to resume at the exact suspended node.

use serde::{Deserialize, Serialize};

use crate::messages::SessionId;
use crate::pulse::PulseCode;
use crate::scheduler::{GateDecision, NodeId};

/// Speaker tag of system notices
pub const HOST_TAG: &str = "HOST";
/// Speaker tag of critic notes
pub const CRITIC_TAG: &str = "CRITIC";
/// Speaker tag of human comments
pub const USER_TAG: &str = "USER";

/// Kind of a history entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    /// A speaker's turn
    Speech,
    /// A critic note
    Feedback,
    /// A human comment
    Comment,
    /// A system notice (topic change, debate ending)
    Notice,
}

/// One entry of the debate history
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    /// Who said it
    pub speaker: String,
    /// What was said
    pub text: String,
    /// Entry kind
    pub kind: StatementKind,
}

impl Statement {
    /// Create a statement
    pub fn new(speaker: impl Into<String>, text: impl Into<String>, kind: StatementKind) -> Self {
        Self {
            speaker: speaker.into(),
            text: text.into(),
            kind,
        }
    }

    /// System notice under [`HOST_TAG`]
    pub fn notice(text: impl Into<String>) -> Self {
        Self::new(HOST_TAG, text, StatementKind::Notice)
    }
}

/// One output of a scheduler step, as seen by the session driver
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepEvent {
    /// Node that produced the output
    pub node: NodeId,
    /// Statement appended to history, if any
    pub statement: Option<Statement>,
    /// Transcoded pulse sequence for the side channel, if any
    pub pulse_code: Option<PulseCode>,
}

impl StepEvent {
    /// Event carrying a statement
    #[must_use]
    pub fn statement(node: NodeId, statement: Statement) -> Self {
        Self {
            node,
            statement: Some(statement),
            pulse_code: None,
        }
    }

    /// Event carrying a pulse code
    #[must_use]
    pub fn pulse(node: NodeId, code: PulseCode) -> Self {
        Self {
            node,
            statement: None,
            pulse_code: Some(code),
        }
    }
}

/// Changes produced by one node, merged by [`SessionState::apply`]
#[derive(Clone, Debug, Default)]
pub struct NodeDelta {
    /// Outputs in emission order; their statements are appended to history
    pub events: Vec<StepEvent>,
    /// The node consumed `pending_feedback`
    pub consumed_feedback: bool,
    /// The node consumed `pending_user_comment`
    pub consumed_user_comment: bool,
    /// Critic note to hand to the next speaker
    pub new_feedback: Option<String>,
    /// New topic position and text
    pub topic: Option<(usize, String)>,
    /// New value of the transient topic-changed flag
    pub topic_changed: Option<bool>,
    /// New rotation counter
    pub turns_since_topic_rotation: Option<u32>,
    /// New feedback counter
    pub turns_since_feedback: Option<u32>,
    /// The debate must end
    pub debate_ended: bool,
    /// Gate decision, set only by `USER`
    pub gate: Option<GateDecision>,
    /// Whether generation failed for this node; `None` when it made no call
    pub generation_failed: Option<bool>,
}

impl NodeDelta {
    /// Push an output event
    pub fn emit(&mut self, event: StepEvent) {
        self.events.push(event);
    }
}

/// Debate session state
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Checkpoint key
    pub session_id: SessionId,
    /// Append-only statement history
    history: Vec<Statement>,
    /// Current topic text
    pub active_topic: String,
    /// Position of the current topic in the topic list
    pub topic_index: usize,
    /// Set for exactly one step after a rotation
    pub topic_changed: bool,
    /// Driving turns since the last rotation
    pub turns_since_topic_rotation: u32,
    /// Gate evaluations since the last critic turn
    pub turns_since_feedback: u32,
    /// Outstanding human comment
    pub pending_user_comment: Option<String>,
    /// Outstanding critic note
    pub pending_feedback: Option<String>,
    /// Unix ms of the first step; `None` until the session starts
    pub session_start_ms: Option<i64>,
    /// Session length in seconds
    pub session_duration_limit_secs: u64,
    /// Terminal flag
    debate_ended: bool,
    /// Current scheduler position
    pub active_node: NodeId,
    /// Consecutive turns that fell back to a placeholder
    pub consecutive_failures: u32,
}

impl SessionState {
    /// Fresh session positioned at the first speaker
    pub fn new(
        session_id: SessionId,
        first_topic: impl Into<String>,
        session_duration_limit_secs: u64,
    ) -> Self {
        Self {
            session_id,
            history: Vec::new(),
            active_topic: first_topic.into(),
            topic_index: 0,
            topic_changed: false,
            turns_since_topic_rotation: 0,
            turns_since_feedback: 0,
            pending_user_comment: None,
            pending_feedback: None,
            session_start_ms: None,
            session_duration_limit_secs,
            debate_ended: false,
            active_node: NodeId::START,
            consecutive_failures: 0,
        }
    }

    /// Full history, oldest first
    #[must_use]
    pub fn history(&self) -> &[Statement] {
        &self.history
    }

    /// The last `window` statements
    #[must_use]
    pub fn recent_history(&self, window: usize) -> Vec<Statement> {
        let skip = self.history.len().saturating_sub(window);
        self.history[skip..].to_vec()
    }

    /// Whether the debate has ended
    #[must_use]
    pub fn debate_ended(&self) -> bool {
        self.debate_ended
    }

    /// Whether the scheduler reached `FINISH`
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.active_node == NodeId::Finish
    }

    /// Record the session start once
    pub fn start_timer(&mut self, now_ms: i64) {
        self.session_start_ms.get_or_insert(now_ms);
    }

    /// Store a human comment for the `USER` node
    ///
    /// Returns the comment it replaced, if any.
    pub fn set_user_comment(&mut self, comment: String) -> Option<String> {
        self.pending_user_comment.replace(comment)
    }

    /// Merge a node's delta; returns the delta's events
    pub fn apply(&mut self, delta: NodeDelta) -> Vec<StepEvent> {
        self.history
            .extend(delta.events.iter().filter_map(|e| e.statement.clone()));

        if delta.consumed_feedback {
            self.pending_feedback = None;
        }
        if delta.consumed_user_comment {
            self.pending_user_comment = None;
        }
        if let Some(note) = delta.new_feedback {
            self.pending_feedback = Some(note);
        }
        if let Some((index, topic)) = delta.topic {
            self.topic_index = index;
            self.active_topic = topic;
        }
        if let Some(changed) = delta.topic_changed {
            self.topic_changed = changed;
        }
        if let Some(count) = delta.turns_since_topic_rotation {
            self.turns_since_topic_rotation = count;
        }
        if let Some(count) = delta.turns_since_feedback {
            self.turns_since_feedback = count;
        }
        self.debate_ended |= delta.debate_ended;
        match delta.generation_failed {
            Some(true) => self.consecutive_failures += 1,
            Some(false) => self.consecutive_failures = 0,
            None => {}
        }

        delta.events
    }
}
