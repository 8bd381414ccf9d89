//! Viewer Registry - Connected Peer Management
//!
//! Tracks the peers of one viewer set (conversation or side channel) and fans
//! messages out to them.
//!
//! # Architecture
//!
//! ```text
//!                       ViewerRegistry
//!                     ┌────────────────────────────────────┐
//!                     │ HashMap<ViewerId, ViewerHandle>    │
//!                     │   - wrapped in Arc<RwLock<>>       │
//!                     └───────────────┬────────────────────┘
//!                                     │ snapshot of senders
//!              ┌──────────────────────┼──────────────────────┐
//!       ┌──────▼──────┐       ┌───────▼──────┐       ┌───────▼──────┐
//!       │  browser    │       │  browser     │       │  display     │
//!       │  viewer-1   │       │  viewer-2    │       │  viewer-3    │
//!       └─────────────┘       └──────────────┘       └──────────────┘
//! ```
//!
//! # Membership Safety
//!
//! Broadcasts copy the sender list under the read lock and send outside it,
//! so connects and disconnects never block on, or corrupt, a fan-out in
//! progress. A peer that disconnects mid-broadcast simply fails its own send;
//! the others still receive the message exactly once.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::messages::OutboundMessage;

/// Per-viewer outbound buffer
pub const VIEWER_BUFFER: usize = 1024;

/// Unique identifier for a viewer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewerId(u64);

impl ViewerId {
    /// Allocate a new unique viewer ID
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw numeric value
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ViewerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ViewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "viewer-{}", self.0)
    }
}

/// Handle to a connected viewer
#[derive(Debug)]
pub struct ViewerHandle {
    /// Unique viewer identifier
    pub id: ViewerId,
    /// Channel drained by the viewer's writer task
    pub tx: mpsc::Sender<OutboundMessage>,
    /// When the viewer connected
    pub connected_at: std::time::Instant,
}

impl ViewerHandle {
    /// Create a handle for a new viewer
    #[must_use]
    pub fn new(id: ViewerId, tx: mpsc::Sender<OutboundMessage>) -> Self {
        Self {
            id,
            tx,
            connected_at: std::time::Instant::now(),
        }
    }

    /// Check if the viewer's channel is still open
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Result of a broadcast operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastResult {
    /// Number of viewers that received the message
    pub successful: usize,
    /// Number of viewers that failed to receive the message
    pub failed: usize,
    /// IDs of viewers that failed
    pub failed_ids: Vec<ViewerId>,
}

impl BroadcastResult {
    /// Check if all recipients received the message
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Failure of a whole broadcast (as opposed to single peers)
#[derive(Debug, Error)]
pub enum RelayError {
    /// The fan-out could not be performed at all
    #[error("broadcast failed: {0}")]
    Broadcast(String),
}

/// Fan-out target of the relay layer
#[async_trait]
pub trait Broadcast: Send + Sync {
    /// Deliver a message to every current member
    async fn broadcast(&self, message: OutboundMessage) -> Result<BroadcastResult, RelayError>;
}

/// Registry of connected viewers
#[derive(Clone)]
pub struct ViewerRegistry {
    /// Set name for logging
    name: &'static str,
    /// Inner map of viewer ID to handle
    inner: Arc<RwLock<HashMap<ViewerId, ViewerHandle>>>,
}

impl ViewerRegistry {
    /// Create a new empty registry
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Set name used in logs
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Register a viewer
    pub fn register(&self, handle: ViewerHandle) -> ViewerId {
        let id = handle.id;
        self.inner.write().insert(id, handle);
        tracing::info!(viewer_id = %id, set = self.name, "Viewer registered");
        id
    }

    /// Unregister a viewer; returns its handle if it was registered
    pub fn unregister(&self, id: &ViewerId) -> Option<ViewerHandle> {
        let handle = self.inner.write().remove(id);
        if handle.is_some() {
            tracing::info!(viewer_id = %id, set = self.name, "Viewer unregistered");
        }
        handle
    }

    /// Number of connected viewers
    #[must_use]
    pub fn count(&self) -> usize {
        self.inner.read().len()
    }

    /// Check if a viewer is registered
    #[must_use]
    pub fn contains(&self, id: &ViewerId) -> bool {
        self.inner.read().contains_key(id)
    }

    fn snapshot(&self, except: Option<ViewerId>) -> Vec<(ViewerId, mpsc::Sender<OutboundMessage>)> {
        self.inner
            .read()
            .iter()
            .filter(|(id, _)| Some(**id) != except)
            .map(|(id, h)| (*id, h.tx.clone()))
            .collect()
    }

    fn fan_out(
        &self,
        targets: Vec<(ViewerId, mpsc::Sender<OutboundMessage>)>,
        message: &OutboundMessage,
    ) -> BroadcastResult {
        let mut result = BroadcastResult::default();
        for (id, tx) in targets {
            match tx.try_send(message.clone()) {
                Ok(()) => result.successful += 1,
                Err(e) => {
                    tracing::warn!(viewer_id = %id, set = self.name, error = %e, "Viewer send failed");
                    result.failed += 1;
                    result.failed_ids.push(id);
                }
            }
        }
        result
    }

    /// Send to every viewer
    ///
    /// Iterates a snapshot; never blocks on a slow viewer.
    pub fn broadcast_now(&self, message: &OutboundMessage) -> BroadcastResult {
        self.fan_out(self.snapshot(None), message)
    }

    /// Send to every viewer, waiting for each to accept the message
    ///
    /// Only viewers whose channel has closed are skipped; a connected viewer
    /// with a full buffer holds the caller until it drains.
    pub async fn broadcast_async(&self, message: &OutboundMessage) -> BroadcastResult {
        let mut result = BroadcastResult::default();
        for (id, tx) in self.snapshot(None) {
            if tx.send(message.clone()).await.is_ok() {
                result.successful += 1;
            } else {
                tracing::debug!(viewer_id = %id, set = self.name, "Viewer closed, skipping");
                result.failed += 1;
                result.failed_ids.push(id);
            }
        }
        result
    }

    /// Send to every viewer except `sender`
    pub fn broadcast_except(&self, sender: ViewerId, message: &OutboundMessage) -> BroadcastResult {
        self.fan_out(self.snapshot(Some(sender)), message)
    }

    /// Send to one viewer; false if unknown or its buffer is unavailable
    pub fn send_to(&self, id: &ViewerId, message: OutboundMessage) -> bool {
        let tx = self.inner.read().get(id).map(|h| h.tx.clone());
        match tx {
            Some(tx) => tx.try_send(message).is_ok(),
            None => {
                tracing::warn!(viewer_id = %id, set = self.name, "Send to unknown viewer");
                false
            }
        }
    }

    /// Remove viewers whose channel has closed; returns how many were removed
    pub fn cleanup_disconnected(&self) -> usize {
        let mut inner = self.inner.write();
        let before = inner.len();
        inner.retain(|id, handle| {
            let connected = handle.is_connected();
            if !connected {
                tracing::info!(viewer_id = %id, set = self.name, "Removing disconnected viewer");
            }
            connected
        });
        let removed = before - inner.len();
        if removed > 0 {
            tracing::info!(removed, remaining = inner.len(), set = self.name, "Cleaned up viewers");
        }
        removed
    }
}

#[async_trait]
impl Broadcast for ViewerRegistry {
    async fn broadcast(&self, message: OutboundMessage) -> Result<BroadcastResult, RelayError> {
        Ok(self.broadcast_async(&message).await)
    }
}

/// The two independent viewer sets
#[derive(Clone)]
pub struct ViewerSets {
    /// Conversation viewers: typing frames and `[END]` markers
    pub conversation: ViewerRegistry,
    /// Side-channel viewers: pulse-code frames and control events
    pub side_channel: ViewerRegistry,
}

impl Default for ViewerSets {
    fn default() -> Self {
        Self {
            conversation: ViewerRegistry::new("conversation"),
            side_channel: ViewerRegistry::new("side_channel"),
        }
    }
}

impl ViewerSets {
    /// Remove closed viewers from both sets
    pub fn cleanup_disconnected(&self) -> usize {
        self.conversation.cleanup_disconnected() + self.side_channel.cleanup_disconnected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn viewer(registry: &ViewerRegistry) -> (ViewerId, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(VIEWER_BUFFER);
        let id = registry.register(ViewerHandle::new(ViewerId::new(), tx));
        (id, rx)
    }

    #[test]
    fn test_viewer_id_display_and_unique() {
        let a = ViewerId::new();
        let b = ViewerId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string(), format!("viewer-{}", a.as_u64()));
    }

    #[test]
    fn test_register_unregister() {
        let registry = ViewerRegistry::new("conversation");
        let (id, _rx) = viewer(&registry);
        assert!(registry.contains(&id));
        assert_eq!(registry.count(), 1);
        assert!(registry.unregister(&id).is_some());
        assert!(registry.unregister(&id).is_none());
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_broadcast_and_except() {
        let registry = ViewerRegistry::new("conversation");
        let (a, mut rx_a) = viewer(&registry);
        let (_b, mut rx_b) = viewer(&registry);

        let result = registry.broadcast_now(&OutboundMessage::relay("A", "BOB"));
        assert_eq!(result.successful, 2);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());

        let result = registry.broadcast_except(a, &OutboundMessage::notice("echo"));
        assert_eq!(result.successful, 1);
        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().unwrap(), OutboundMessage::notice("echo"));
    }

    #[test]
    fn test_dropped_viewer_does_not_affect_others() {
        let registry = ViewerRegistry::new("conversation");
        let (gone, rx_gone) = viewer(&registry);
        let (_stay, mut rx_stay) = viewer(&registry);
        drop(rx_gone);

        let result = registry.broadcast_now(&OutboundMessage::relay("A", "BOB"));
        assert_eq!(result.successful, 1);
        assert_eq!(result.failed_ids, vec![gone]);
        assert_eq!(rx_stay.try_recv().unwrap(), OutboundMessage::relay("A", "BOB"));
        assert!(rx_stay.try_recv().is_err());

        assert_eq!(registry.cleanup_disconnected(), 1);
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_send_to() {
        let registry = ViewerRegistry::new("side_channel");
        let (id, mut rx) = viewer(&registry);
        assert!(registry.send_to(&id, OutboundMessage::notice("hi")));
        assert!(rx.try_recv().is_ok());
        assert!(!registry.send_to(&ViewerId::new(), OutboundMessage::notice("hi")));
    }

    #[tokio::test]
    async fn test_async_broadcast_waits_for_slow_viewer() {
        let registry = ViewerRegistry::new("conversation");
        let (tx, mut rx) = mpsc::channel(2);
        registry.register(ViewerHandle::new(ViewerId::new(), tx));
        let (gone, rx_gone) = viewer(&registry);
        drop(rx_gone);

        let sender = {
            let registry = registry.clone();
            tokio::spawn(async move {
                let mut skipped = Vec::new();
                for text in ["A", "AB", "ABC", "ABCD"] {
                    let result = registry
                        .broadcast_async(&OutboundMessage::relay(text, "BOB"))
                        .await;
                    skipped.extend(result.failed_ids);
                }
                skipped
            })
        };

        let mut seen = Vec::new();
        while seen.len() < 4 {
            if let Some(OutboundMessage::Relay(m)) = rx.recv().await {
                seen.push(m.response);
            }
        }
        let skipped = sender.await.unwrap();

        assert_eq!(seen, vec!["A", "AB", "ABC", "ABCD"]);
        assert_eq!(skipped, vec![gone; 4]);
    }

    #[tokio::test]
    async fn test_concurrent_membership_changes_during_broadcast() {
        let registry = ViewerRegistry::new("conversation");
        let mut receivers = Vec::new();
        for _ in 0..20 {
            receivers.push(viewer(&registry));
        }

        let churn = {
            let registry = registry.clone();
            tokio::spawn(async move {
                for _ in 0..50 {
                    let (tx, _rx) = mpsc::channel(1);
                    let id = registry.register(ViewerHandle::new(ViewerId::new(), tx));
                    tokio::task::yield_now().await;
                    registry.unregister(&id);
                }
            })
        };

        for i in 0..50 {
            registry.broadcast_now(&OutboundMessage::relay(i.to_string(), "BOB"));
            tokio::task::yield_now().await;
        }
        churn.await.unwrap();

        for (_, rx) in &mut receivers {
            let mut seen = Vec::new();
            while let Ok(OutboundMessage::Relay(m)) = rx.try_recv() {
                seen.push(m.response);
            }
            let expected: Vec<String> = (0..50).map(|i: i32| i.to_string()).collect();
            assert_eq!(seen, expected);
        }
    }
}
