//! Scheduler errors

use std::time::Duration;

use thiserror::Error;

use crate::checkpoint::CheckpointError;

/// A single generation call that did not produce text
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The call did not return within the configured bound
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    /// The generator returned an error
    #[error("generation failed: {0:#}")]
    Upstream(#[source] anyhow::Error),
}

/// Errors that halt a debate session
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Routing or topic configuration is inconsistent
    #[error("configuration error: {0}")]
    Config(String),

    /// Too many consecutive turns produced only placeholders
    #[error("{failures} consecutive generation failures, last: {last}")]
    GenerationBudgetExhausted {
        /// Consecutive failed turns
        failures: u32,
        /// The final failure
        #[source]
        last: GenerationError,
    },

    /// The checkpoint could not be written or read
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// No checkpoint exists for the session being resumed
    #[error("no checkpoint for session {0}")]
    NoCheckpoint(String),

    /// The session already reached `FINISH`
    #[error("session {0} has finished")]
    Finished(String),
}
