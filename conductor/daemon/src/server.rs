//! Daemon Server Implementation
//!
//! This module provides the WebSocket server loop for the debate daemon:
//! - Accepts TCP connections and upgrades them to WebSockets
//! - Routes each connection to a viewer set by request path
//! - Spawns a handler task per connection
//! - Supports graceful shutdown
//!
//! # Endpoints
//!
//! ```text
//!                       DebateServer
//!                            │
//!            ┌───────────────┴───────────────┐
//!            │                               │
//!        /ws/chat                          /ws/sc
//!   conversation viewers             side-channel viewers
//!   (comments, controls,             (pulse-code displays)
//!    typing frames)
//!            │                               │
//!            └───────────────┬───────────────┘
//!                            │
//!                     DebateConductor
//! ```
//!
//! Any other path is refused during the handshake with `404`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn, Instrument};

use agora_core::relay::VIEWER_BUFFER;
use agora_core::{ClientEvent, DebateConductor, OutboundMessage, ViewerKind};

/// Conversation endpoint
pub const CHAT_PATH: &str = "/ws/chat";
/// Side-channel endpoint
pub const SIDE_CHANNEL_PATH: &str = "/ws/sc";

/// Connection state tracking (internal to server)
struct ConnectionState {
    /// When the connection was established
    connected_at: Instant,
    /// Handle to abort the connection task
    abort_handle: tokio::task::AbortHandle,
}

/// Map a request path to the viewer set it joins
#[must_use]
pub fn viewer_kind_for(path: &str) -> Option<ViewerKind> {
    match path.trim_end_matches('/') {
        CHAT_PATH => Some(ViewerKind::Conversation),
        SIDE_CHANNEL_PATH => Some(ViewerKind::SideChannel),
        _ => None,
    }
}

/// The WebSocket server
pub struct DebateServer {
    /// Listen address
    bind_address: String,
    /// Session driver shared by every connection
    conductor: DebateConductor,
    /// Active connection state, keyed by peer address
    connection_states: Arc<DashMap<SocketAddr, ConnectionState>>,
}

impl DebateServer {
    /// Create a new server
    pub fn new(bind_address: impl Into<String>, conductor: DebateConductor) -> Self {
        Self {
            bind_address: bind_address.into(),
            conductor,
            connection_states: Arc::new(DashMap::new()),
        }
    }

    /// Bind the configured address and serve until `shutdown` is set
    pub async fn run(&self, shutdown: Arc<AtomicBool>) -> Result<()> {
        let listener = TcpListener::bind(&self.bind_address)
            .await
            .with_context(|| format!("Failed to bind to {}", self.bind_address))?;
        self.serve(listener, shutdown).await
    }

    /// Serve an already bound listener until `shutdown` is set
    pub async fn serve(&self, listener: TcpListener, shutdown: Arc<AtomicBool>) -> Result<()> {
        let local = listener.local_addr().context("Listener has no local address")?;
        info!(address = %local, "Listening for viewers");

        loop {
            if shutdown.load(Ordering::SeqCst) {
                info!("Shutdown requested, stopping accept loop");
                break;
            }

            // Accept with timeout to allow checking shutdown flag
            let accept_result =
                tokio::time::timeout(Duration::from_millis(100), listener.accept()).await;

            let (stream, peer) = match accept_result {
                Ok(Ok(accepted)) => accepted,
                Ok(Err(e)) => {
                    error!(error = %e, "Accept failed");
                    continue;
                }
                Err(_) => continue,
            };

            debug!(
                peer = %peer,
                active_connections = self.connection_states.len() + 1,
                "TCP connection accepted"
            );

            let conductor = self.conductor.clone();
            let connection_states = Arc::clone(&self.connection_states);
            let task_handle = tokio::spawn(
                async move {
                    Self::handle_connection(stream, conductor).await;
                    connection_states.remove(&peer);
                    info!(
                        active_connections = connection_states.len(),
                        "Connection handler finished"
                    );
                }
                .instrument(tracing::info_span!("connection", %peer)),
            );

            self.connection_states.insert(
                peer,
                ConnectionState {
                    connected_at: Instant::now(),
                    abort_handle: task_handle.abort_handle(),
                },
            );
        }

        self.shutdown().await;
        Ok(())
    }

    /// Handle a single viewer connection
    ///
    /// Outbound messages are drained from the viewer's channel and written as
    /// text frames; inbound text frames are parsed into client events.
    async fn handle_connection(stream: TcpStream, conductor: DebateConductor) {
        let mut requested_path = None;
        let callback = |request: &Request, response: Response| {
            let path = request.uri().path().to_string();
            if viewer_kind_for(&path).is_none() {
                let mut refusal = ErrorResponse::new(Some(format!("unknown endpoint {path}")));
                *refusal.status_mut() = StatusCode::NOT_FOUND;
                return Err(refusal);
            }
            requested_path = Some(path);
            Ok(response)
        };

        let ws = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!(error = %e, "WebSocket handshake failed");
                return;
            }
        };
        let Some(kind) = requested_path.as_deref().and_then(viewer_kind_for) else {
            return;
        };

        let (mut sink, mut source) = ws.split();
        let (tx, mut rx) = mpsc::channel::<OutboundMessage>(VIEWER_BUFFER);
        let viewer_id = conductor.connect(kind, tx);
        info!(viewer_id = %viewer_id, kind = ?kind, "Viewer connected");

        loop {
            tokio::select! {
                frame = source.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            match ClientEvent::parse(&text) {
                                Ok(event) => match kind {
                                    ViewerKind::Conversation => conductor.handle_event(viewer_id, event),
                                    ViewerKind::SideChannel => conductor.handle_side_channel(viewer_id, &event),
                                },
                                Err(e) => warn!(viewer_id = %viewer_id, error = %e, "Dropping malformed client message"),
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!(viewer_id = %viewer_id, "Viewer disconnected");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(viewer_id = %viewer_id, error = %e, "Read error");
                            break;
                        }
                    }
                }

                outbound = rx.recv() => {
                    let Some(message) = outbound else {
                        info!(viewer_id = %viewer_id, "Viewer channel closed");
                        break;
                    };
                    match message.to_json() {
                        Ok(json) => {
                            if let Err(e) = sink.send(Message::Text(json)).await {
                                warn!(viewer_id = %viewer_id, error = %e, "Write error");
                                break;
                            }
                        }
                        Err(e) => warn!(viewer_id = %viewer_id, error = %e, "Failed to encode message"),
                    }
                }
            }
        }

        conductor.disconnect(kind, &viewer_id);
    }

    /// Graceful shutdown
    async fn shutdown(&self) {
        info!("Initiating graceful shutdown");

        let peers: Vec<SocketAddr> = self.connection_states.iter().map(|r| *r.key()).collect();
        for peer in peers {
            if let Some((_, state)) = self.connection_states.remove(&peer) {
                info!(
                    peer = %peer,
                    uptime_secs = state.connected_at.elapsed().as_secs(),
                    "Aborting connection"
                );
                state.abort_handle.abort();
            }
        }

        // Give aborted handlers a moment to unwind
        tokio::time::sleep(Duration::from_millis(100)).await;
        info!("Shutdown complete");
    }
}
