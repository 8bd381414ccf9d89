//! Relay Layer
//!
//! Serializes concurrently produced outputs into one ordered broadcast stream
//! per viewer set:
//!
//! - [`registry`]: the two viewer membership sets and snapshot fan-out
//! - [`typing`]: the FIFO typing-effect queue and its single worker

pub mod registry;
pub mod typing;

pub use registry::{
    Broadcast, BroadcastResult, RelayError, ViewerHandle, ViewerId, ViewerRegistry, ViewerSets,
    VIEWER_BUFFER,
};
pub use typing::{RelayJob, RelayQueue, RelaySettings, TypingJob};
