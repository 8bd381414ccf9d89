//! Checkpoint Store
//!
//! One record per session id, overwritten after every scheduler step. The
//! record holds the complete [`SessionState`] (including the active node), so
//! loading it is enough to continue exactly where the session stopped.
//!
//! # Stores
//!
//! - [`MemoryCheckpointStore`]: process-local, lost on restart
//! - [`FileCheckpointStore`]: one JSON file per session; writes go to a
//!   temporary file that is synced and renamed over the old record, so a
//!   crash leaves either the previous or the new checkpoint, never a torn one

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::messages::SessionId;
use crate::session::SessionState;

/// Checkpoint persistence errors
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Filesystem failure
    #[error("checkpoint I/O error at {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Record could not be encoded or decoded
    #[error("checkpoint serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Durable snapshot of one session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Session the snapshot belongs to
    pub session_id: SessionId,
    /// When the snapshot was taken (Unix ms)
    pub saved_at_ms: i64,
    /// Full session state
    pub state: SessionState,
}

impl Checkpoint {
    /// Snapshot a session
    #[must_use]
    pub fn new(state: &SessionState, saved_at_ms: i64) -> Self {
        Self {
            session_id: state.session_id.clone(),
            saved_at_ms,
            state: state.clone(),
        }
    }
}

/// Checkpoint persistence
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Overwrite the record for the checkpoint's session
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError>;

    /// Load the record for a session, if one exists
    async fn load(&self, session_id: &SessionId) -> Result<Option<Checkpoint>, CheckpointError>;
}

/// In-memory store
#[derive(Clone, Debug, Default)]
pub struct MemoryCheckpointStore {
    records: Arc<DashMap<SessionId, Checkpoint>>,
}

impl MemoryCheckpointStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions stored
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        self.records
            .insert(checkpoint.session_id.clone(), checkpoint.clone());
        Ok(())
    }

    async fn load(&self, session_id: &SessionId) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self.records.get(session_id).map(|r| r.value().clone()))
    }
}

/// JSON-file store, one file per session
#[derive(Clone, Debug)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// Store under `dir` (created on first save)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the records
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Record path for a session
    ///
    /// Characters outside `[A-Za-z0-9_-]` are replaced so an id can never
    /// escape the directory.
    #[must_use]
    pub fn path_for(&self, session_id: &SessionId) -> PathBuf {
        let name: String = session_id
            .as_str()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CheckpointError + '_ {
    move |source| CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(io_error(&self.dir))?;

        let path = self.path_for(&checkpoint.session_id);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(checkpoint)?;

        let mut file = tokio::fs::File::create(&tmp).await.map_err(io_error(&tmp))?;
        file.write_all(&bytes).await.map_err(io_error(&tmp))?;
        file.sync_all().await.map_err(io_error(&tmp))?;
        drop(file);

        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(io_error(&path))?;
        tracing::debug!(session_id = %checkpoint.session_id, path = %path.display(), "Checkpoint saved");
        Ok(())
    }

    async fn load(&self, session_id: &SessionId) -> Result<Option<Checkpoint>, CheckpointError> {
        let path = self.path_for(session_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path)(e)),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::NodeId;
    use pretty_assertions::assert_eq;

    fn checkpoint(id: &str) -> Checkpoint {
        let mut state = SessionState::new(SessionId::from(id), "topic", 1500);
        state.active_node = NodeId::User;
        state.set_user_comment("hi".into());
        Checkpoint::new(&state, 42)
    }

    #[test]
    fn test_memory_store_overwrites() {
        tokio_test::block_on(async {
            let store = MemoryCheckpointStore::new();
            let mut cp = checkpoint("1");
            store.save(&cp).await.unwrap();
            cp.saved_at_ms = 99;
            store.save(&cp).await.unwrap();

            assert_eq!(store.len(), 1);
            let loaded = store.load(&SessionId::from("1")).await.unwrap().unwrap();
            assert_eq!(loaded.saved_at_ms, 99);
            assert!(store.load(&SessionId::from("2")).await.unwrap().is_none());
        });
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("checkpoints"));
        let cp = checkpoint("1");

        assert!(store.load(&cp.session_id).await.unwrap().is_none());
        store.save(&cp).await.unwrap();
        let loaded = store.load(&cp.session_id).await.unwrap().unwrap();
        assert_eq!(loaded, cp);
        assert!(!store.path_for(&cp.session_id).with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_file_store_rejects_corrupt_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        let id = SessionId::from("1");
        std::fs::write(store.path_for(&id), b"{not json").unwrap();
        assert!(matches!(
            store.load(&id).await,
            Err(CheckpointError::Serde(_))
        ));
    }

    #[test]
    fn test_path_is_sanitized() {
        let store = FileCheckpointStore::new("/tmp/agora");
        let path = store.path_for(&SessionId::from("../etc/passwd"));
        assert_eq!(path, PathBuf::from("/tmp/agora/___etc_passwd.json"));
    }
}
