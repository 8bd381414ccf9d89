//! Statement Generator Traits
//!
//! The debate core never builds prompts or talks to a model directly. Every
//! node that needs text asks a [`StatementGenerator`] for it, handing over a
//! [`GenerationRequest`] that carries the role, the conversation slice and the
//! one-shot parameters (feedback note, topic-change flag, text to rewrite).
//!
//! Implementations may be slow, may word things differently on every call and
//! may fail; the scheduler bounds each call with a timeout and a retry budget.

use std::fmt;

use async_trait::async_trait;

use crate::scheduler::Seat;
use crate::session::Statement;

/// Which capability a generation call serves
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// One of the six debating seats
    Speaker(Seat),
    /// Periodic critic producing a feedback note
    Critic,
    /// Punch-line rewrite of the preceding statement
    RelayA,
    /// Simplification of the preceding statement
    RelayB,
    /// Plain-language rendering fed to the pulse-code transcoder
    Translator,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Speaker(seat) => write!(f, "speaker_{}", seat.index() + 1),
            Self::Critic => f.write_str("critic"),
            Self::RelayA => f.write_str("relay_a"),
            Self::RelayB => f.write_str("relay_b"),
            Self::Translator => f.write_str("translator"),
        }
    }
}

/// Context handed to a generator for one call
#[derive(Clone, Debug)]
pub struct GenerationRequest {
    /// Capability requested
    pub role: Role,
    /// Display name the output will be attributed to
    pub speaker: String,
    /// Active debate topic
    pub topic: String,
    /// Conversation slice visible to this role, oldest first
    pub history: Vec<Statement>,
    /// Critic note to address, consumed by this call
    pub feedback: Option<String>,
    /// Text to rewrite or translate (relay and translator roles)
    pub source_text: Option<String>,
    /// The topic rotated during this cycle
    pub topic_changed: bool,
    /// The session timer has run out
    pub debate_ending: bool,
}

impl GenerationRequest {
    /// Create a request with an empty context
    pub fn new(role: Role, speaker: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            role,
            speaker: speaker.into(),
            topic: topic.into(),
            history: Vec::new(),
            feedback: None,
            source_text: None,
            topic_changed: false,
            debate_ending: false,
        }
    }

    /// Attach the visible conversation slice
    #[must_use]
    pub fn with_history(mut self, history: Vec<Statement>) -> Self {
        self.history = history;
        self
    }

    /// Attach a critic note
    #[must_use]
    pub fn with_feedback(mut self, feedback: Option<String>) -> Self {
        self.feedback = feedback;
        self
    }

    /// Attach the text a relay or translator works on
    #[must_use]
    pub fn with_source_text(mut self, text: impl Into<String>) -> Self {
        self.source_text = Some(text.into());
        self
    }

    /// Set the topic-change and ending flags
    #[must_use]
    pub fn with_flags(mut self, topic_changed: bool, debate_ending: bool) -> Self {
        self.topic_changed = topic_changed;
        self.debate_ending = debate_ending;
        self
    }

    /// Render the history slice as a transcript, one `speaker: text` per line
    #[must_use]
    pub fn transcript(&self) -> String {
        self.history
            .iter()
            .map(|s| format!("{}: {}", s.speaker, s.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Statement generator
///
/// Implement this trait to plug a text-generation provider into the debate.
#[async_trait]
pub trait StatementGenerator: Send + Sync {
    /// Generator name for logging (e.g., "Ollama")
    fn name(&self) -> &str;

    /// Produce one statement for the request
    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::StatementKind;

    #[test]
    fn test_role_display() {
        assert_eq!(Role::Speaker(Seat::Fourth).to_string(), "speaker_4");
        assert_eq!(Role::RelayA.to_string(), "relay_a");
        assert_eq!(Role::Translator.to_string(), "translator");
    }

    #[test]
    fn test_transcript() {
        let request = GenerationRequest::new(Role::Critic, "FRITZ", "taxes").with_history(vec![
            Statement::new("FRITZ", "Taxes are theft.", StatementKind::Speech),
            Statement::new("BOB", "Roads are not.", StatementKind::Speech),
        ]);
        assert_eq!(request.transcript(), "FRITZ: Taxes are theft.\nBOB: Roads are not.");
    }
}
