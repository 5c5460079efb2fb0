//! Checkpoint stores: durable suspension by thread identity.
//!
//! A suspension is a durable pause - the process may terminate and restart
//! between suspend and resume, so the only required state is the persisted
//! [`ConversationState`] retrievable by thread id. The in-memory store
//! satisfies the core contract; the file store makes suspensions survive
//! restarts. Durable backends are substitutable without changing step logic.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::warn;

use crate::state::{ConversationState, SCHEMA_VERSION};

/// Persistence seam for conversation state.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, state: &ConversationState) -> Result<()>;
    async fn load(&self, thread_id: &str) -> Result<Option<ConversationState>>;
    async fn remove(&self, thread_id: &str) -> Result<()>;
}

/// Non-durable store backed by a map. Many reads, few writes.
#[derive(Debug, Default)]
pub struct MemoryCheckpoints {
    threads: RwLock<HashMap<String, ConversationState>>,
}

impl MemoryCheckpoints {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpoints {
    async fn save(&self, state: &ConversationState) -> Result<()> {
        self.threads
            .write()
            .await
            .insert(state.thread_id.clone(), state.clone());
        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<Option<ConversationState>> {
        Ok(self.threads.read().await.get(thread_id).cloned())
    }

    async fn remove(&self, thread_id: &str) -> Result<()> {
        self.threads.write().await.remove(thread_id);
        Ok(())
    }
}

/// Durable store: one JSON file per thread under a root directory, written
/// with the temp-file + atomic-rename pattern.
#[derive(Debug, Clone)]
pub struct FileCheckpoints {
    root: PathBuf,
}

impl FileCheckpoints {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn state_path(&self, thread_id: &str) -> Result<PathBuf> {
        // Thread ids become file names; keep them path-safe.
        if thread_id.is_empty()
            || !thread_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            anyhow::bail!("thread id not usable as a file name: {thread_id:?}");
        }
        Ok(self.root.join(format!("{thread_id}.json")))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpoints {
    async fn save(&self, state: &ConversationState) -> Result<()> {
        fs::create_dir_all(&self.root).context("Failed to create checkpoint directory")?;

        let state_file = self.state_path(&state.thread_id)?;
        let temp_file = self.root.join(format!(".{}.json.tmp", state.thread_id));

        let json = serde_json::to_string_pretty(state).context("Failed to serialize state")?;

        // Write to temp file first, then atomic rename.
        fs::write(&temp_file, &json).context("Failed to write temp state file")?;
        fs::rename(&temp_file, &state_file).context("Failed to rename state file")?;

        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<Option<ConversationState>> {
        let state_file = self.state_path(thread_id)?;
        if !state_file.exists() {
            return Ok(None);
        }

        let json = fs::read_to_string(&state_file).context("Failed to read state file")?;
        let state: ConversationState =
            serde_json::from_str(&json).context("Failed to parse state file")?;

        if state.schema_version != SCHEMA_VERSION {
            warn!(
                found = state.schema_version,
                expected = SCHEMA_VERSION,
                thread_id,
                "checkpoint schema version mismatch; treating thread as unknown"
            );
            return Ok(None);
        }

        Ok(Some(state))
    }

    async fn remove(&self, thread_id: &str) -> Result<()> {
        let state_file = self.state_path(thread_id)?;
        if state_file.exists() {
            fs::remove_file(&state_file).context("Failed to remove state file")?;
        }
        Ok(())
    }
}
