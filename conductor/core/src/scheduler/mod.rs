//! Turn Scheduler
//!
//! Deterministic, resumable state machine deciding who speaks next:
//!
//! - [`node`]: the fixed debate topology and continuation chains
//! - [`gate`]: the counter-driven feedback gate
//! - [`controller`]: topic rotation and the session timer
//! - [`engine`]: [`TurnScheduler`], which runs nodes, merges their deltas and
//!   checkpoints after every step
//! - [`clock`]: wall-clock abstraction for the session timer

pub mod clock;
pub mod controller;
pub mod engine;
mod error;
pub mod gate;
pub mod node;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{
    placeholder, EventSink, SchedulerSettings, StepOutcome, StepStatus, TurnScheduler,
    DEFAULT_SPEAKERS,
};
pub use error::{GenerationError, SchedulerError};
pub use gate::GateDecision;
pub use node::{Continuation, NodeId, Seat};
