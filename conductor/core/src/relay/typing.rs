//! Typing-Effect Relay Queue
//!
//! A single background consumer drains relay jobs in submission order and
//! renders each one completely before starting the next:
//!
//! ```text
//!  scheduler ──submit──►  mpsc (FIFO)  ──►  worker ──► conversation viewers
//!  conductor ──end_turn─►                    │
//!                                            ├─ "A"   sleep(delay)
//!                                            ├─ "AB"  sleep(delay)
//!                                            └─ "ABC" sleep(delay)
//! ```
//!
//! One consumer means chunks of two jobs can never interleave. A failed job
//! is logged and dropped; the worker moves on to the next one.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::messages::OutboundMessage;

use super::registry::{Broadcast, RelayError};

/// One statement awaiting relay
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypingJob {
    /// Text to type out
    pub full_text: String,
    /// Speaker tag sent as `agentType`
    pub source_tag: String,
}

impl TypingJob {
    /// Create a job
    pub fn new(full_text: impl Into<String>, source_tag: impl Into<String>) -> Self {
        Self {
            full_text: full_text.into(),
            source_tag: source_tag.into(),
        }
    }
}

/// Work item of the relay worker
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayJob {
    /// Type out a statement
    Typing(TypingJob),
    /// Broadcast the `[END]` marker for a completed turn
    EndOfTurn {
        /// Last speaker of the turn
        agent_type: String,
    },
}

/// Typing cadence
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RelaySettings {
    /// Characters added per frame (at least 1)
    pub chunk_size: usize,
    /// Pause after every frame
    pub delay: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            chunk_size: 1,
            delay: Duration::from_millis(40),
        }
    }
}

/// Producer side of the relay queue
#[derive(Clone, Debug)]
pub struct RelayQueue {
    tx: mpsc::UnboundedSender<RelayJob>,
}

impl RelayQueue {
    /// Start the worker; it stops once every queue handle is dropped
    pub fn spawn(broadcaster: Arc<dyn Broadcast>, settings: RelaySettings) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(rx, broadcaster, settings));
        (Self { tx }, worker)
    }

    /// Queue a job; false if the worker has stopped
    pub fn push(&self, job: RelayJob) -> bool {
        if self.tx.send(job).is_err() {
            warn!("Relay worker stopped, dropping job");
            return false;
        }
        true
    }

    /// Queue a statement for typing
    pub fn submit(&self, job: TypingJob) -> bool {
        self.push(RelayJob::Typing(job))
    }

    /// Queue the end-of-turn marker
    pub fn end_turn(&self, agent_type: impl Into<String>) -> bool {
        self.push(RelayJob::EndOfTurn {
            agent_type: agent_type.into(),
        })
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<RelayJob>,
    broadcaster: Arc<dyn Broadcast>,
    settings: RelaySettings,
) {
    let chunk_size = settings.chunk_size.max(1);
    while let Some(job) = rx.recv().await {
        let result = match &job {
            RelayJob::Typing(typing) => {
                render(broadcaster.as_ref(), typing, chunk_size, settings.delay).await
            }
            RelayJob::EndOfTurn { agent_type } => broadcaster
                .broadcast(OutboundMessage::end_of_turn(agent_type.clone()))
                .await
                .map(|_| ()),
        };
        if let Err(e) = result {
            warn!(error = %e, job = ?job, "Relay job failed, skipping");
        }
    }
    debug!("Relay worker stopped");
}

/// Broadcast cumulative prefixes of `job`, pausing after each one
async fn render(
    broadcaster: &dyn Broadcast,
    job: &TypingJob,
    chunk_size: usize,
    delay: Duration,
) -> Result<(), RelayError> {
    let chars: Vec<char> = job.full_text.chars().collect();
    let mut prefix = String::with_capacity(job.full_text.len());
    for chunk in chars.chunks(chunk_size) {
        prefix.extend(chunk);
        broadcaster
            .broadcast(OutboundMessage::relay(prefix.clone(), job.source_tag.clone()))
            .await?;
        tokio::time::sleep(delay).await;
    }
    Ok(())
}
