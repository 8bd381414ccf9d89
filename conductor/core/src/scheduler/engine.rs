//! Turn Scheduler
//!
//! Advances a [`SessionState`] one node at a time. A call to
//! [`TurnScheduler::step`] runs nodes until the session suspends at the
//! `USER` interrupt point or reaches `FINISH`:
//!
//! ```text
//!   step(state, comment?)
//!     │ merge comment into pending_user_comment
//!     ▼
//!   ┌─► run active node ──► NodeDelta ──► state.apply ──► route ──► checkpoint ──► emit
//!   │                                                       │
//!   └──────────────── next node is not USER / FINISH ◄──────┘
//! ```
//!
//! The node the session is suspended at runs first even when it is `USER`;
//! reaching `USER` again suspends. Every step is checkpointed after its
//! delta is merged, so a reloaded checkpoint continues exactly where the
//! session stopped.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::backend::{GenerationRequest, Role, StatementGenerator};
use crate::checkpoint::{Checkpoint, CheckpointStore, MemoryCheckpointStore};
use crate::messages::SessionId;
use crate::pulse;
use crate::session::{
    NodeDelta, SessionState, Statement, StatementKind, StepEvent, CRITIC_TAG, USER_TAG,
};
use crate::topics::{TopicExhaustion, TopicList};

use super::clock::{Clock, SystemClock};
use super::controller::{self, ControllerSettings};
use super::error::{GenerationError, SchedulerError};
use super::gate;
use super::node::{Continuation, NodeId, Seat};

/// Default speaker names, in seat order
pub const DEFAULT_SPEAKERS: [&str; 6] = ["FRITZ", "BOB", "DONNA", "BEN", "JOHN", "CITIZEN"];

/// Scheduler parameters
#[derive(Clone, Debug)]
pub struct SchedulerSettings {
    /// Display names of the six seats
    pub speakers: Vec<String>,
    /// Driving turns between topic rotations
    pub topic_interval: u32,
    /// Gate evaluations between critic turns
    pub feedback_interval: u32,
    /// Session length in seconds
    pub duration_secs: u64,
    /// Statements visible to speakers
    pub history_window: usize,
    /// Policy past the last topic
    pub topic_exhaustion: TopicExhaustion,
    /// Post-processing chain per cycle seat
    pub continuations: BTreeMap<Seat, Vec<Continuation>>,
    /// Bound on one generation attempt
    pub generation_timeout: Duration,
    /// Extra attempts after a failed generation
    pub max_retries: u32,
    /// Consecutive failed turns tolerated before halting
    pub max_consecutive_failures: u32,
    /// Emit pulse codes after speaker statements
    pub pulse_enabled: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            speakers: DEFAULT_SPEAKERS.iter().map(|s| (*s).to_string()).collect(),
            topic_interval: 30,
            feedback_interval: 2,
            duration_secs: 25 * 60,
            history_window: 40,
            topic_exhaustion: TopicExhaustion::Wrap,
            continuations: BTreeMap::from([(Seat::Second, vec![Continuation::RelayA])]),
            generation_timeout: Duration::from_secs(60),
            max_retries: 1,
            max_consecutive_failures: 3,
            pulse_enabled: true,
        }
    }
}

impl SchedulerSettings {
    fn speaker_name(&self, seat: Seat) -> String {
        self.speakers
            .get(seat.index())
            .cloned()
            .unwrap_or_else(|| NodeId::Speaker(seat).to_string())
    }

    /// Speaker tag attributed to a node's output
    #[must_use]
    pub fn tag_for(&self, node: NodeId) -> String {
        match node {
            NodeId::Speaker(seat) => self.speaker_name(seat),
            NodeId::Critic => CRITIC_TAG.to_string(),
            NodeId::User => USER_TAG.to_string(),
            other => other.to_string(),
        }
    }
}

/// How a step ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepStatus {
    /// Waiting at the `USER` interrupt point
    Suspended,
    /// Reached `FINISH`
    Finished,
}

/// Result of one [`TurnScheduler::step`] call
#[derive(Clone, Debug)]
pub struct StepOutcome {
    /// Every output, in emission order
    pub events: Vec<StepEvent>,
    /// Where the session stopped
    pub status: StepStatus,
}

/// Receives step outputs as soon as each node completes
pub trait EventSink: Send + Sync {
    /// Deliver one output
    fn emit(&self, event: &StepEvent);
}

impl EventSink for mpsc::UnboundedSender<StepEvent> {
    fn emit(&self, event: &StepEvent) {
        if self.send(event.clone()).is_err() {
            debug!("Step event receiver dropped");
        }
    }
}

/// Deterministic, resumable debate scheduler
pub struct TurnScheduler {
    generator: Arc<dyn StatementGenerator>,
    settings: SchedulerSettings,
    topics: TopicList,
    clock: Arc<dyn Clock>,
    checkpoints: Arc<dyn CheckpointStore>,
    sink: Option<Arc<dyn EventSink>>,
}

impl TurnScheduler {
    /// Create a scheduler with the system clock and an in-memory checkpoint store
    pub fn new(
        generator: Arc<dyn StatementGenerator>,
        settings: SchedulerSettings,
        topics: TopicList,
    ) -> Self {
        Self {
            generator,
            settings,
            topics,
            clock: Arc::new(SystemClock),
            checkpoints: Arc::new(MemoryCheckpointStore::new()),
            sink: None,
        }
    }

    /// Use a different clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use a different checkpoint store
    #[must_use]
    pub fn with_checkpoints(mut self, checkpoints: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = checkpoints;
        self
    }

    /// Stream outputs to a sink while stepping
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Scheduler parameters
    #[must_use]
    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Fresh session on the first topic
    #[must_use]
    pub fn new_session(&self, session_id: SessionId) -> SessionState {
        let first = self.topics.get(0).unwrap_or_default();
        SessionState::new(session_id, first, self.settings.duration_secs)
    }

    /// Reload a session from its checkpoint
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NoCheckpoint`] if nothing was saved for the
    /// session, [`SchedulerError::Config`] if the snapshot does not fit the
    /// configured topics, or a checkpoint error.
    pub async fn resume(&self, session_id: &SessionId) -> Result<SessionState, SchedulerError> {
        let checkpoint = self
            .checkpoints
            .load(session_id)
            .await?
            .ok_or_else(|| SchedulerError::NoCheckpoint(session_id.to_string()))?;
        self.validate(&checkpoint.state)?;
        info!(
            session_id = %session_id,
            node = %checkpoint.state.active_node,
            statements = checkpoint.state.history().len(),
            "Resuming from checkpoint"
        );
        Ok(checkpoint.state)
    }

    /// Reload a session, or start a fresh one if it was never saved
    ///
    /// # Errors
    ///
    /// Same as [`TurnScheduler::resume`], except a missing checkpoint.
    pub async fn resume_or_new(
        &self,
        session_id: SessionId,
    ) -> Result<SessionState, SchedulerError> {
        match self.resume(&session_id).await {
            Err(SchedulerError::NoCheckpoint(_)) => Ok(self.new_session(session_id)),
            other => other,
        }
    }

    fn validate(&self, state: &SessionState) -> Result<(), SchedulerError> {
        if self.topics.get(state.topic_index).is_none() {
            return Err(SchedulerError::Config(format!(
                "topic index {} out of bounds ({} topics)",
                state.topic_index,
                self.topics.len()
            )));
        }
        if !state.active_node.is_schedulable() {
            return Err(SchedulerError::Config(format!(
                "{} cannot be the active node",
                state.active_node
            )));
        }
        Ok(())
    }

    /// Advance until the session suspends at `USER` or finishes
    ///
    /// A non-empty `comment` becomes the pending human comment (replacing an
    /// unconsumed one). A session suspended at `USER` resumes from there
    /// whether or not a comment was supplied.
    ///
    /// # Errors
    ///
    /// Fatal errors halt the session: configuration errors, an exhausted
    /// generation budget, checkpoint failures, or stepping a finished
    /// session.
    pub async fn step(
        &self,
        state: &mut SessionState,
        comment: Option<String>,
    ) -> Result<StepOutcome, SchedulerError> {
        if state.is_finished() {
            return Err(SchedulerError::Finished(state.session_id.to_string()));
        }
        self.validate(state)?;

        if let Some(comment) = comment.map(|c| c.trim().to_string()) {
            if !comment.is_empty() {
                if let Some(dropped) = state.set_user_comment(comment) {
                    warn!(session_id = %state.session_id, dropped = %dropped, "Replacing unconsumed comment");
                }
            }
        }
        state.start_timer(self.clock.now_ms());

        let mut events = Vec::new();
        let mut resuming = true;
        loop {
            let node = state.active_node;
            if node == NodeId::Finish {
                info!(session_id = %state.session_id, "Debate finished");
                return Ok(StepOutcome {
                    events,
                    status: StepStatus::Finished,
                });
            }
            if node == NodeId::User && !resuming {
                debug!(session_id = %state.session_id, "Suspended at interrupt point");
                return Ok(StepOutcome {
                    events,
                    status: StepStatus::Suspended,
                });
            }
            resuming = false;

            debug!(session_id = %state.session_id, node = %node, "Running node");
            let (delta, failure) = self.run_node(node, state).await?;
            let gate = delta.gate;
            let emitted = state.apply(delta);

            state.active_node = if state.debate_ended() {
                NodeId::Finish
            } else {
                node.successor(gate)?
            };

            let checkpoint = Checkpoint::new(state, self.clock.now_ms());
            self.checkpoints.save(&checkpoint).await?;

            if let Some(sink) = &self.sink {
                for event in &emitted {
                    sink.emit(event);
                }
            }
            events.extend(emitted);

            if state.consecutive_failures > self.settings.max_consecutive_failures {
                if let Some(last) = failure {
                    tracing::error!(
                        session_id = %state.session_id,
                        failures = state.consecutive_failures,
                        "Generation failure budget exhausted"
                    );
                    return Err(SchedulerError::GenerationBudgetExhausted {
                        failures: state.consecutive_failures,
                        last,
                    });
                }
            }
        }
    }

    async fn run_node(
        &self,
        node: NodeId,
        state: &SessionState,
    ) -> Result<(NodeDelta, Option<GenerationError>), SchedulerError> {
        match node {
            NodeId::Speaker(seat) if seat.in_cycle() => Ok(self.run_speaker(seat, state).await),
            NodeId::Critic => Ok(self.run_critic(state).await),
            NodeId::User => self.run_user(state).map(|delta| (delta, None)),
            other => Err(SchedulerError::Config(format!(
                "{other} is not a schedulable node"
            ))),
        }
    }

    /// `USER`: gate, optional human comment, topic/timer controller
    fn run_user(&self, state: &SessionState) -> Result<NodeDelta, SchedulerError> {
        let mut delta = NodeDelta::default();

        let (counter, decision) =
            gate::evaluate(state.turns_since_feedback, self.settings.feedback_interval);
        delta.turns_since_feedback = Some(counter);
        delta.gate = Some(decision);
        debug!(session_id = %state.session_id, gate = ?decision, counter, "Feedback gate");

        if let Some(comment) = &state.pending_user_comment {
            delta.emit(StepEvent::statement(
                NodeId::User,
                Statement::new(USER_TAG, comment.clone(), StatementKind::Comment),
            ));
            delta.consumed_user_comment = true;
        }

        let settings = ControllerSettings {
            topic_interval: self.settings.topic_interval,
            exhaustion: self.settings.topic_exhaustion,
        };
        controller::run(
            state,
            settings,
            &self.topics,
            self.clock.now_ms(),
            &mut delta,
        )?;
        Ok(delta)
    }

    /// `CRITIC`: reads the full history, leaves a note for the next speaker
    ///
    /// `topic_changed` is left for that speaker to consume.
    async fn run_critic(&self, state: &SessionState) -> (NodeDelta, Option<GenerationError>) {
        let mut delta = NodeDelta::default();
        let request = GenerationRequest::new(Role::Critic, CRITIC_TAG, &state.active_topic)
            .with_history(state.history().to_vec())
            .with_flags(state.topic_changed, state.debate_ended());

        match self.generate(&state.session_id, &request).await {
            Ok(note) => {
                delta.emit(StepEvent::statement(
                    NodeId::Critic,
                    Statement::new(CRITIC_TAG, note.clone(), StatementKind::Feedback),
                ));
                delta.new_feedback = Some(note);
                delta.generation_failed = Some(false);
                (delta, None)
            }
            Err(e) => {
                delta.emit(StepEvent::statement(
                    NodeId::Critic,
                    Statement::new(CRITIC_TAG, placeholder(CRITIC_TAG), StatementKind::Feedback),
                ));
                delta.generation_failed = Some(true);
                (delta, Some(e))
            }
        }
    }

    /// Cycle speaker plus its continuation chain
    async fn run_speaker(
        &self,
        seat: Seat,
        state: &SessionState,
    ) -> (NodeDelta, Option<GenerationError>) {
        let mut delta = NodeDelta {
            topic_changed: Some(false),
            consumed_feedback: state.pending_feedback.is_some(),
            ..NodeDelta::default()
        };

        let name = self.settings.speaker_name(seat);
        let request = GenerationRequest::new(Role::Speaker(seat), &name, &state.active_topic)
            .with_history(state.recent_history(self.settings.history_window))
            .with_feedback(state.pending_feedback.clone())
            .with_flags(state.topic_changed, state.debate_ended());

        let (mut current, mut current_ok, failure) =
            match self.generate(&state.session_id, &request).await {
                Ok(text) => (
                    (NodeId::Speaker(seat), Statement::new(&name, text, StatementKind::Speech)),
                    true,
                    None,
                ),
                Err(e) => (
                    (
                        NodeId::Speaker(seat),
                        Statement::new(&name, placeholder(&name), StatementKind::Speech),
                    ),
                    false,
                    Some(e),
                ),
            };
        delta.generation_failed = Some(failure.is_some());

        let chain = self
            .settings
            .continuations
            .get(&seat)
            .cloned()
            .unwrap_or_default();

        for continuation in chain {
            match continuation {
                Continuation::RelayA | Continuation::RelayB => {
                    if !current_ok {
                        continue;
                    }
                    let role = match continuation {
                        Continuation::RelayA => Role::RelayA,
                        _ => Role::RelayB,
                    };
                    let (_, statement) = &current;
                    let request = GenerationRequest::new(role, &statement.speaker, &state.active_topic)
                        .with_source_text(&statement.text);
                    match self.generate(&state.session_id, &request).await {
                        Ok(text) => {
                            let speaker = statement.speaker.clone();
                            current = (
                                continuation.node(),
                                Statement::new(speaker, text, StatementKind::Speech),
                            );
                        }
                        Err(e) => {
                            warn!(
                                session_id = %state.session_id,
                                node = %continuation.node(),
                                error = %e,
                                "Relay failed, keeping original statement"
                            );
                        }
                    }
                }
                Continuation::Speaker(next_seat) => {
                    self.finish_statement(state, current, current_ok, &mut delta).await;

                    let next_name = self.settings.speaker_name(next_seat);
                    let request = GenerationRequest::new(
                        Role::Speaker(next_seat),
                        &next_name,
                        &state.active_topic,
                    )
                    .with_history(visible_history(state, &delta, self.settings.history_window))
                    .with_flags(state.topic_changed, state.debate_ended());

                    let node = NodeId::Speaker(next_seat);
                    (current, current_ok) = match self.generate(&state.session_id, &request).await {
                        Ok(text) => (
                            (node, Statement::new(&next_name, text, StatementKind::Speech)),
                            true,
                        ),
                        Err(e) => {
                            warn!(
                                session_id = %state.session_id,
                                node = %node,
                                error = %e,
                                "Continuation speaker failed"
                            );
                            (
                                (
                                    node,
                                    Statement::new(
                                        &next_name,
                                        placeholder(&next_name),
                                        StatementKind::Speech,
                                    ),
                                ),
                                false,
                            )
                        }
                    };
                }
            }
        }

        self.finish_statement(state, current, current_ok, &mut delta).await;
        (delta, failure)
    }

    /// Emit a final statement, followed by its pulse code
    async fn finish_statement(
        &self,
        state: &SessionState,
        (node, statement): (NodeId, Statement),
        generated: bool,
        delta: &mut NodeDelta,
    ) {
        let pulse_source = (generated && self.settings.pulse_enabled).then(|| statement.clone());
        delta.emit(StepEvent::statement(node, statement));

        let Some(statement) = pulse_source else {
            return;
        };
        let request = GenerationRequest::new(Role::Translator, &statement.speaker, &state.active_topic)
            .with_source_text(&statement.text);
        match self.generate(&state.session_id, &request).await {
            Ok(translated) => {
                let code = pulse::transcode(&translated);
                if code.is_empty() {
                    debug!(session_id = %state.session_id, node = %node, "Nothing to transcode");
                } else {
                    delta.emit(StepEvent::pulse(node, code));
                }
            }
            Err(e) => warn!(
                session_id = %state.session_id,
                node = %node,
                error = %e,
                "Translator failed, skipping pulse code"
            ),
        }
    }

    /// One bounded generation with retries
    async fn generate(
        &self,
        session_id: &SessionId,
        request: &GenerationRequest,
    ) -> Result<String, GenerationError> {
        let timeout = self.settings.generation_timeout;
        let attempts = self.settings.max_retries.saturating_add(1);
        let mut last = GenerationError::Timeout(timeout);

        for attempt in 1..=attempts {
            match tokio::time::timeout(timeout, self.generator.generate(request)).await {
                Ok(Ok(text)) => return Ok(text),
                Ok(Err(e)) => last = GenerationError::Upstream(e),
                Err(_) => last = GenerationError::Timeout(timeout),
            }
            warn!(
                session_id = %session_id,
                role = %request.role,
                generator = self.generator.name(),
                attempt,
                attempts,
                error = %last,
                "Generation attempt failed"
            );
        }
        Err(last)
    }
}

/// Placeholder recorded when a speaker could not produce text
#[must_use]
pub fn placeholder(speaker: &str) -> String {
    format!("[{speaker} could not respond]")
}

/// History as a continuation speaker sees it: the stored window plus the
/// statements already produced in this turn
fn visible_history(state: &SessionState, delta: &NodeDelta, window: usize) -> Vec<Statement> {
    let mut history = state.recent_history(window);
    history.extend(delta.events.iter().filter_map(|e| e.statement.clone()));
    let skip = history.len().saturating_sub(window);
    history.split_off(skip)
}
