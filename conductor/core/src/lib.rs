//! Agora Core - Headless Debate Orchestration
//!
//! This crate runs a simulated multi-party debate: six speakers take turns on
//! a rotating topic, a critic periodically injects feedback, a human observer
//! can interject at a fixed interrupt point, and the session ends after a
//! configured duration. Output reaches viewers through a typing-effect relay
//! and, in parallel, as pulse code for a side-channel display. No transport
//! code lives here; the daemon crate serves it over WebSockets.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                 Viewers (conversation / side channel)             │
//! │              ClientEvent (up)      OutboundMessage (down)         │
//! └──────────────────────────────┬───────────────────────────────────┘
//!                                │
//! ┌──────────────────────────────┼───────────────────────────────────┐
//! │                         AGORA CORE                               │
//! │  ┌───────────────────────────┴────────────────────────────────┐  │
//! │  │                    DebateConductor                          │  │
//! │  │  ┌──────────────┐  ┌────────────┐  ┌─────────────────────┐  │  │
//! │  │  │TurnScheduler │  │ RelayQueue │  │ PulseEmitter        │  │  │
//! │  │  │ gate, topics │  │ (typing)   │  │ (side channel)      │  │  │
//! │  │  │ timer, ckpt  │  └────────────┘  └─────────────────────┘  │  │
//! │  │  └──────┬───────┘                                           │  │
//! │  └─────────┼───────────────────────────────────────────────────┘  │
//! │            ▼                                                      │
//! │     StatementGenerator (Ollama, or a scripted double in tests)    │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`TurnScheduler`]: the resumable debate graph
//! - [`SessionState`]: everything a checkpoint restores
//! - [`DebateConductor`]: drives one session and fans output out to viewers
//! - [`RelayQueue`]: FIFO typing-effect relay with a single worker
//! - [`PulseCode`]: statements transcoded for the side channel
//! - [`AgoraConfig`]: file, environment and CLI configuration
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use agora_core::{
//!     backend::OllamaBackend, DebateConductor, SessionId, TurnScheduler,
//!     config::load_config,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     let backend = OllamaBackend::new("localhost", 11434, "llama3.2")?;
//!     let topics = config.topic_list().unwrap_or_default();
//!     let scheduler = TurnScheduler::new(Arc::new(backend), config.scheduler_settings(), topics);
//!     let state = scheduler.resume_or_new(SessionId::from("1")).await?;
//!     let (conductor, _relay) = DebateConductor::new(scheduler, state, config.conductor_settings());
//!
//!     // The first comment starts the debate
//!     conductor.submit_comment(String::new());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod checkpoint;
pub mod conductor;
pub mod config;
pub mod events;
pub mod messages;
pub mod pulse;
pub mod relay;
pub mod scheduler;
pub mod session;
pub mod topics;

// Re-exports for convenience
pub use backend::{GenerationRequest, OllamaBackend, Role, StatementGenerator};
pub use checkpoint::{
    Checkpoint, CheckpointError, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore,
};
pub use conductor::{ConductorSettings, DebateConductor, ViewerKind};
pub use config::{AgoraConfig, ConfigError, ConfigOverrides, ConfigSource};
pub use events::{ClientEvent, EventError};
pub use messages::{OutboundMessage, PulseCodeMessage, RelayMessage, SessionId, END_MARKER};
pub use pulse::{PulseCode, PulseEmitter};
pub use relay::{RelayQueue, RelaySettings, TypingJob, ViewerId, ViewerRegistry, ViewerSets};
pub use scheduler::{
    GateDecision, NodeId, SchedulerError, SchedulerSettings, Seat, StepOutcome, StepStatus,
    TurnScheduler,
};
pub use session::{SessionState, Statement, StatementKind, StepEvent};
pub use topics::{TopicExhaustion, TopicList};
