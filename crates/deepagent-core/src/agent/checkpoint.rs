//! Thread-scoped state snapshots
//!
//! The reasoning loop saves its state after every iteration under its thread
//! id; the dispatcher reads a sub-agent's final state back from here.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::state::ConversationState;

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, thread_id: &str, state: &ConversationState) -> anyhow::Result<()>;

    async fn load(&self, thread_id: &str) -> anyhow::Result<Option<ConversationState>>;
}

/// In-process store, lost when the process exits.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    threads: DashMap<String, ConversationState>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Thread ids with a saved state, sorted.
    pub fn thread_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.threads.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, thread_id: &str, state: &ConversationState) -> anyhow::Result<()> {
        self.threads.insert(thread_id.to_string(), state.clone());
        Ok(())
    }

    async fn load(&self, thread_id: &str) -> anyhow::Result<Option<ConversationState>> {
        Ok(self.threads.get(thread_id).map(|s| s.value().clone()))
    }
}
