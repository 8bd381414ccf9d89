//! Agora Daemon - Debate Server
//!
//! Entry point for the debate daemon. It loads configuration, restores or
//! creates the debate session, and serves viewers over WebSockets.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (0.0.0.0:4001, in-memory checkpoints)
//! agora-daemon
//!
//! # With config file and durable checkpoints
//! agora-daemon --config /etc/agora/agora.toml --checkpoint-dir /var/lib/agora
//!
//! # Ignore any saved checkpoint
//! agora-daemon --fresh
//!
//! # Verbose logging
//! RUST_LOG=debug agora-daemon
//! ```
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: Graceful shutdown

mod server;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use agora_core::checkpoint::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
use agora_core::config::{default_config_path, load_config_from_path, AgoraConfig, ConfigOverrides};
use agora_core::{DebateConductor, OllamaBackend, SessionId, TurnScheduler};

use server::DebateServer;

/// How often closed viewer channels are swept
const CLEANUP_INTERVAL: Duration = Duration::from_secs(30);

/// Agora Daemon - serves a multi-speaker debate to WebSocket viewers
#[derive(Parser, Debug)]
#[command(name = "agora-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "AGORA_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Listen address for viewer connections
    #[arg(short = 'b', long, value_name = "ADDR")]
    bind: Option<String>,

    /// Directory for session checkpoints
    #[arg(long, value_name = "DIR")]
    checkpoint_dir: Option<PathBuf>,

    /// Session id to run (or resume)
    #[arg(long, value_name = "ID")]
    session_id: Option<String>,

    /// Generation model
    #[arg(short = 'm', long)]
    model: Option<String>,

    /// Start a new session even if a checkpoint exists
    #[arg(long)]
    fresh: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "AGORA_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            bind_address: self.bind.clone(),
            checkpoint_dir: self.checkpoint_dir.clone(),
            session_id: self.session_id.clone(),
            model: self.model.clone(),
        }
    }
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("agora_daemon={level},agora_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

/// Resolve configuration: file, then environment, then CLI flags
fn resolve_config(args: &Args) -> Result<AgoraConfig> {
    let path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(path).context("Failed to load configuration")?;
    args.overrides().apply(&mut config);
    config.validate().context("Invalid configuration")?;
    info!(source = %config.source(), "Configuration resolved");
    Ok(config)
}

/// Wire backend, checkpoints, scheduler and session into a conductor
async fn build_conductor(
    config: &AgoraConfig,
    fresh: bool,
) -> Result<(DebateConductor, JoinHandle<()>)> {
    let generation = &config.generation;
    let backend = OllamaBackend::new(&generation.host, generation.port, &generation.model)?
        .with_temperature(generation.temperature)
        .with_personas(generation.personas.clone());
    if backend.health_check().await {
        info!(
            host = %generation.host,
            port = generation.port,
            model = %generation.model,
            "Generation backend reachable"
        );
    } else {
        warn!(
            host = %generation.host,
            port = generation.port,
            "Generation backend not reachable; turns fall back to placeholders until it is"
        );
    }

    let checkpoints: Arc<dyn CheckpointStore> = match config.server.checkpoint_dir {
        Some(ref dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create checkpoint directory {}", dir.display()))?;
            info!(dir = %dir.display(), "Using file checkpoints");
            Arc::new(FileCheckpointStore::new(dir))
        }
        None => {
            info!("Using in-memory checkpoints");
            Arc::new(MemoryCheckpointStore::new())
        }
    };

    let topics = config
        .topic_list()
        .context("Topic list must not be empty")?;
    let scheduler = TurnScheduler::new(Arc::new(backend), config.scheduler_settings(), topics)
        .with_checkpoints(checkpoints);

    let session_id = SessionId::from(config.server.session_id.as_str());
    let state = if fresh {
        scheduler.new_session(session_id)
    } else {
        scheduler
            .resume_or_new(session_id)
            .await
            .context("Failed to restore session")?
    };
    info!(
        session_id = %state.session_id,
        node = %state.active_node,
        statements = state.history().len(),
        topic = %state.active_topic,
        "Session ready"
    );

    Ok(DebateConductor::new(scheduler, state, config.conductor_settings()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!("Agora daemon starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("PID: {}", std::process::id());

    let config = resolve_config(&args)?;
    let (conductor, relay_worker) = build_conductor(&config, args.fresh).await?;
    let cleanup = conductor.spawn_cleanup(CLEANUP_INTERVAL);

    // Setup signal handlers
    let shutdown = Arc::new(AtomicBool::new(false));
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
    let shutdown_clone = Arc::clone(&shutdown);
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, initiating shutdown"),
            _ = sigint.recv() => info!("Received SIGINT, initiating shutdown"),
        }
        shutdown_clone.store(true, Ordering::SeqCst);
    });

    let server = DebateServer::new(config.server.bind_address.clone(), conductor);
    let result = server.run(shutdown).await;

    info!("Shutting down...");
    cleanup.abort();
    relay_worker.abort();

    match result {
        Ok(()) => {
            info!("Agora daemon stopped cleanly");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Daemon stopped with error");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::config::ServerConfig;

    #[test]
    fn test_cli_flags_become_overrides() {
        let args = Args::parse_from([
            "agora-daemon",
            "--bind",
            "127.0.0.1:5000",
            "--session-id",
            "evening",
            "--fresh",
        ]);
        assert!(args.fresh);
        let overrides = args.overrides();
        assert_eq!(overrides.bind_address.as_deref(), Some("127.0.0.1:5000"));
        assert_eq!(overrides.session_id.as_deref(), Some("evening"));
        assert!(overrides.checkpoint_dir.is_none());
    }

    #[tokio::test]
    async fn test_build_conductor_with_file_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AgoraConfig::default();
        config.server = ServerConfig {
            checkpoint_dir: Some(dir.path().join("ckpt")),
            session_id: "daemon-test".to_string(),
            ..ServerConfig::default()
        };

        let (conductor, worker) = build_conductor(&config, false).await.unwrap();
        assert_eq!(conductor.session_id().as_str(), "daemon-test");
        assert!(dir.path().join("ckpt").is_dir());
        assert!(conductor.snapshot().await.history().is_empty());
        worker.abort();
    }
}
