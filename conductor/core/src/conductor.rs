//! Debate Conductor - Session Driver
//!
//! The conductor owns the single debate session and connects it to viewers:
//!
//! ```text
//!   conversation viewer ──ClientEvent──► handle_event
//!                                          │ Comment
//!                                          ▼
//!                                   inbox (one slot) ──► drive loop ──► TurnScheduler::step
//!                                                                          │ StepEvent (as each node completes)
//!                                                      ┌───────────────────┴──────────────┐
//!                                                      ▼                                  ▼
//!                                          RelayQueue (typing + [END])        PulseEmitter ──► side-channel viewers
//!                                                      ▼
//!                                          conversation viewers
//! ```
//!
//! # Comments while the scheduler is busy
//!
//! Comments that arrive while a step is running are buffered in a single
//! slot; a newer comment replaces an older buffered one (logged at `warn`).
//! When the running step suspends at the interrupt point, the buffered
//! comment resumes the session immediately.
//!
//! Control events (buttons, sliders, pulse tests) never touch the scheduler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::events::ClientEvent;
use crate::messages::{OutboundMessage, SessionId};
use crate::pulse::{self, PulseEmitter};
use crate::relay::{
    RelayQueue, RelaySettings, TypingJob, ViewerHandle, ViewerId, ViewerRegistry, ViewerSets,
};
use crate::scheduler::{EventSink, SchedulerError, StepOutcome, StepStatus, TurnScheduler};
use crate::session::{SessionState, StepEvent};

/// Speaker tag of server messages on the wire
pub const SERVER_TAG: &str = "Server";
/// `[END]` tag used when a step produced no statement
pub const FALLBACK_TAG: &str = "Bot";
/// Greeting sent to new side-channel viewers
pub const SIDE_CHANNEL_WELCOME: &str = "WebSocket connected!";
/// Acknowledgement for side-channel viewer messages
pub const SIDE_CHANNEL_ACK: &str = "Processing your request...";

/// Conductor configuration
#[derive(Clone, Copy, Debug)]
pub struct ConductorSettings {
    /// Typing cadence
    pub relay: RelaySettings,
    /// Side-channel display group
    pub pulse_group: u32,
    /// Number of rotating display slots
    pub pulse_window: u32,
}

impl Default for ConductorSettings {
    fn default() -> Self {
        Self {
            relay: RelaySettings::default(),
            pulse_group: 100,
            pulse_window: 5,
        }
    }
}

/// Which viewer set a connection belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewerKind {
    /// Typing frames and comments
    Conversation,
    /// Pulse-code display hardware
    SideChannel,
}

/// Routes step outputs as they are produced
///
/// Statements go to the relay queue; pulse codes are framed and sent to the
/// side channel right away, so side-channel order is emission order.
struct OutputRouter {
    relay: RelayQueue,
    pulse: PulseEmitter,
    side_channel: ViewerRegistry,
}

impl EventSink for OutputRouter {
    fn emit(&self, event: &StepEvent) {
        if let Some(statement) = &event.statement {
            self.relay.submit(TypingJob::new(
                statement.text.clone(),
                statement.speaker.clone(),
            ));
        }
        if let Some(code) = &event.pulse_code {
            if let Some(frame) = self.pulse.frame(code) {
                debug!(node = %event.node, index = frame.index, "Pulse frame");
                let result = self.side_channel.broadcast_now(&OutboundMessage::PulseCode(frame));
                if !result.all_succeeded() {
                    warn!(failed = result.failed, "Pulse frame not delivered to every viewer");
                }
            }
        }
    }
}

/// One buffered resume request
#[derive(Debug, Default)]
struct Resume {
    comment: Option<String>,
}

/// The debate session driver
#[derive(Clone)]
pub struct DebateConductor {
    scheduler: Arc<TurnScheduler>,
    state: Arc<tokio::sync::Mutex<SessionState>>,
    session_id: SessionId,
    viewers: ViewerSets,
    relay: RelayQueue,
    inbox: Arc<Mutex<Option<Resume>>>,
    running: Arc<AtomicBool>,
    halted: Arc<AtomicBool>,
}

impl DebateConductor {
    /// Wire a scheduler and session to fresh viewer sets
    ///
    /// Returns the conductor and the relay worker handle.
    pub fn new(
        scheduler: TurnScheduler,
        state: SessionState,
        settings: ConductorSettings,
    ) -> (Self, JoinHandle<()>) {
        let viewers = ViewerSets::default();
        let (relay, worker) =
            RelayQueue::spawn(Arc::new(viewers.conversation.clone()), settings.relay);
        let router = OutputRouter {
            relay: relay.clone(),
            pulse: PulseEmitter::new(settings.pulse_group, settings.pulse_window),
            side_channel: viewers.side_channel.clone(),
        };
        let scheduler = scheduler.with_sink(Arc::new(router));

        let conductor = Self {
            scheduler: Arc::new(scheduler),
            session_id: state.session_id.clone(),
            state: Arc::new(tokio::sync::Mutex::new(state)),
            viewers,
            relay,
            inbox: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            halted: Arc::new(AtomicBool::new(false)),
        };
        (conductor, worker)
    }

    /// Session this conductor drives
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Both viewer sets
    #[must_use]
    pub fn viewers(&self) -> &ViewerSets {
        &self.viewers
    }

    /// Whether a step is running or queued
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Whether a fatal error stopped the session
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Copy of the current session state (waits for a running step)
    pub async fn snapshot(&self) -> SessionState {
        self.state.lock().await.clone()
    }

    /// Register a viewer; side-channel viewers are greeted
    pub fn connect(&self, kind: ViewerKind, tx: tokio::sync::mpsc::Sender<OutboundMessage>) -> ViewerId {
        let handle = ViewerHandle::new(ViewerId::new(), tx);
        match kind {
            ViewerKind::Conversation => self.viewers.conversation.register(handle),
            ViewerKind::SideChannel => {
                let id = self.viewers.side_channel.register(handle);
                self.viewers
                    .side_channel
                    .send_to(&id, OutboundMessage::relay(SIDE_CHANNEL_WELCOME, SERVER_TAG));
                id
            }
        }
    }

    /// Remove a viewer
    pub fn disconnect(&self, kind: ViewerKind, id: &ViewerId) {
        match kind {
            ViewerKind::Conversation => self.viewers.conversation.unregister(id),
            ViewerKind::SideChannel => self.viewers.side_channel.unregister(id),
        };
    }

    /// Handle an event from a conversation viewer
    pub fn handle_event(&self, sender: ViewerId, event: ClientEvent) {
        debug!(viewer_id = %sender, kind = event.kind(), "Client event");
        match event {
            ClientEvent::Heartbeat => {}
            ClientEvent::ControlButton { raw } | ClientEvent::ControlSlider { raw } => {
                let message = OutboundMessage::Passthrough(raw);
                self.viewers.side_channel.broadcast_now(&message);
                self.viewers.conversation.broadcast_except(sender, &message);
            }
            ClientEvent::PulseTest { group, index, raw } => {
                let frame = pulse::test_frame(group, index);
                self.viewers
                    .side_channel
                    .broadcast_now(&OutboundMessage::PulseCode(frame));
                self.viewers
                    .conversation
                    .broadcast_except(sender, &OutboundMessage::Passthrough(raw));
            }
            ClientEvent::Comment { text } => self.submit_comment(text),
        }
    }

    /// Handle a message from a side-channel viewer
    pub fn handle_side_channel(&self, sender: ViewerId, event: &ClientEvent) {
        if matches!(event, ClientEvent::Heartbeat) {
            return;
        }
        self.viewers
            .side_channel
            .send_to(&sender, OutboundMessage::notice(SIDE_CHANNEL_ACK));
    }

    /// Start or resume the session with an optional comment
    ///
    /// Returns immediately; the step runs in the background. An empty text
    /// resumes without a comment.
    pub fn submit_comment(&self, text: String) {
        let comment = (!text.is_empty()).then_some(text);
        {
            let mut inbox = self.inbox.lock();
            let merged = match inbox.take() {
                Some(Resume {
                    comment: Some(old),
                }) => match comment {
                    Some(new) => {
                        warn!(session_id = %self.session_id, dropped = %old, "Replacing buffered comment");
                        Some(new)
                    }
                    None => Some(old),
                },
                _ => comment,
            };
            *inbox = Some(Resume { comment: merged });
        }
        self.kick();
    }

    fn kick(&self) {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let this = self.clone();
            tokio::spawn(async move { this.drive().await });
        }
    }

    async fn drive(&self) {
        loop {
            let next = self.inbox.lock().take();
            let Some(resume) = next else {
                self.running.store(false, Ordering::SeqCst);
                // A comment may have landed between take() and store()
                if self.inbox.lock().is_none()
                    || self
                        .running
                        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                        .is_err()
                {
                    return;
                }
                continue;
            };
            if let Err(e) = self.step(resume.comment).await {
                match e {
                    SchedulerError::Finished(_) => {
                        debug!(session_id = %self.session_id, "Ignoring input after finish");
                    }
                    other => error!(session_id = %self.session_id, error = %other, "Session halted"),
                }
            }
        }
    }

    /// Run one scheduler step and queue the `[END]` marker behind its output
    ///
    /// # Errors
    ///
    /// Returns the scheduler error; any error other than
    /// [`SchedulerError::Finished`] halts the session.
    pub async fn step(&self, comment: Option<String>) -> Result<StepOutcome, SchedulerError> {
        if self.is_halted() {
            return Err(SchedulerError::Config(format!(
                "session {} halted after a fatal error",
                self.session_id
            )));
        }
        let mut state = self.state.lock().await;
        match self.scheduler.step(&mut state, comment).await {
            Ok(outcome) => {
                let last = outcome
                    .events
                    .iter()
                    .rev()
                    .find_map(|e| e.statement.as_ref())
                    .map_or_else(|| FALLBACK_TAG.to_string(), |s| s.speaker.clone());
                self.relay.end_turn(last);
                info!(
                    session_id = %self.session_id,
                    events = outcome.events.len(),
                    statements = state.history().len(),
                    finished = outcome.status == StepStatus::Finished,
                    "Step complete"
                );
                Ok(outcome)
            }
            Err(e) => {
                if !matches!(e, SchedulerError::Finished(_)) {
                    self.halted.store(true, Ordering::SeqCst);
                }
                Err(e)
            }
        }
    }

    /// Periodically drop viewers whose channel has closed
    pub fn spawn_cleanup(&self, every: Duration) -> JoinHandle<()> {
        let viewers = self.viewers.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = viewers.cleanup_disconnected();
                if removed > 0 {
                    debug!(removed, "Stale viewers removed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::test_utils::ScriptedGenerator;
    use crate::relay::VIEWER_BUFFER;
    use crate::scheduler::{ManualClock, SchedulerSettings};
    use crate::topics::TopicList;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use tokio::sync::mpsc;

    fn conductor() -> (DebateConductor, JoinHandle<()>) {
        let settings = SchedulerSettings {
            continuations: BTreeMap::new(),
            pulse_enabled: false,
            ..SchedulerSettings::default()
        };
        let scheduler = TurnScheduler::new(
            Arc::new(ScriptedGenerator::new()),
            settings,
            TopicList::default(),
        )
        .with_clock(Arc::new(ManualClock::new(0)));
        let state = scheduler.new_session(SessionId::from("1"));
        DebateConductor::new(scheduler, state, ConductorSettings::default())
    }

    #[tokio::test]
    async fn test_side_channel_welcome_and_ack() {
        let (conductor, _worker) = conductor();
        let (tx, mut rx) = mpsc::channel(16);
        let id = conductor.connect(ViewerKind::SideChannel, tx);
        assert_eq!(
            rx.try_recv().unwrap(),
            OutboundMessage::relay("WebSocket connected!", "Server")
        );

        conductor.handle_side_channel(id, &ClientEvent::Heartbeat);
        assert!(rx.try_recv().is_err());
        conductor.handle_side_channel(id, &ClientEvent::Comment { text: "x".into() });
        assert_eq!(
            rx.try_recv().unwrap(),
            OutboundMessage::notice("Processing your request...")
        );
    }

    #[tokio::test]
    async fn test_control_events_bypass_scheduler() {
        let (conductor, _worker) = conductor();
        let (tx_a, mut rx_a) = mpsc::channel(16);
        let (tx_b, mut rx_b) = mpsc::channel(16);
        let (tx_sc, mut rx_sc) = mpsc::channel(16);
        let a = conductor.connect(ViewerKind::Conversation, tx_a);
        conductor.connect(ViewerKind::Conversation, tx_b);
        conductor.connect(ViewerKind::SideChannel, tx_sc);
        rx_sc.try_recv().unwrap();

        let raw = serde_json::json!({"type": "Slider", "value": 3});
        conductor.handle_event(a, ClientEvent::ControlSlider { raw: raw.clone() });

        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().unwrap(), OutboundMessage::Passthrough(raw.clone()));
        assert_eq!(rx_sc.try_recv().unwrap(), OutboundMessage::Passthrough(raw));
        assert!(!conductor.is_busy());
        assert!(conductor.snapshot().await.history().is_empty());
    }

    #[tokio::test]
    async fn test_pulse_test_event() {
        let (conductor, _worker) = conductor();
        let (tx_a, _rx_a) = mpsc::channel(16);
        let (tx_sc, mut rx_sc) = mpsc::channel(16);
        let a = conductor.connect(ViewerKind::Conversation, tx_a);
        conductor.connect(ViewerKind::SideChannel, tx_sc);
        rx_sc.try_recv().unwrap();

        conductor.handle_event(
            a,
            ClientEvent::PulseTest {
                group: 1,
                index: 1,
                raw: serde_json::json!({"type": "Test"}),
            },
        );
        match rx_sc.try_recv().unwrap() {
            OutboundMessage::PulseCode(frame) => {
                assert_eq!(frame.value, "0120123101");
                assert_eq!((frame.group, frame.index), (1, 1));
            }
            other => panic!("expected pulse frame, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_step_queues_end_marker_after_statements() {
        let (conductor, _worker) = conductor();
        let (tx, mut rx) = mpsc::channel(VIEWER_BUFFER);
        conductor.connect(ViewerKind::Conversation, tx);

        let outcome = conductor.step(None).await.unwrap();
        assert_eq!(outcome.status, StepStatus::Suspended);

        let mut last = None;
        while let Some(message) = rx.recv().await {
            if let OutboundMessage::Relay(m) = &message {
                if m.response == "[END]" {
                    last = m.agent_type.clone();
                    break;
                }
            }
        }
        assert_eq!(last.as_deref(), Some("BOB"));
    }
}
