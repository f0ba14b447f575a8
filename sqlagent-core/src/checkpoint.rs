use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::state::StateSchema;
use crate::AgentError;

/// Snapshot of one thread taken after a node finished.
///
/// `next` is the pending transition: the node the driver will run when the
/// thread is resumed. `None` marks a terminal checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(bound = "S: StateSchema")]
pub struct Checkpoint<S: StateSchema> {
    pub thread_id: String,
    pub state: S,
    pub step: u64,
    pub node: String,
    #[serde(default)]
    pub next: Option<String>,
    pub created_at: String,
}

impl<S: StateSchema> Checkpoint<S> {
    pub fn new(
        thread_id: String,
        state: S,
        step: u64,
        node: String,
        next: Option<String>,
    ) -> Self {
        Self {
            thread_id,
            state,
            step,
            node,
            next,
            created_at: Utc::now().to_rfc3339(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.next.is_none()
    }
}

/// Keyed durable storage of the latest checkpoint per thread.
#[async_trait::async_trait]
pub trait Checkpointer<S: StateSchema>: Send + Sync {
    async fn save(&self, checkpoint: &Checkpoint<S>) -> Result<(), AgentError>;
    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint<S>>, AgentError>;
    /// Drops every stored thread.
    async fn clear(&self) -> Result<(), AgentError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointMetadata {
    pub seq: u64,
    pub node: String,
    pub next: Option<String>,
    pub created_at: String,
}

#[async_trait::async_trait]
pub trait HistoryCheckpointer<S: StateSchema>: Send + Sync {
    async fn list_checkpoints(
        &self,
        thread_id: &str,
    ) -> Result<Vec<CheckpointMetadata>, AgentError>;
}

#[derive(Clone)]
pub struct InMemoryCheckpointer<S: StateSchema> {
    inner: Arc<RwLock<HashMap<String, Vec<Checkpoint<S>>>>>,
}

impl<S: StateSchema> Default for InMemoryCheckpointer<S> {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[async_trait::async_trait]
impl<S: StateSchema> Checkpointer<S> for InMemoryCheckpointer<S> {
    async fn save(&self, checkpoint: &Checkpoint<S>) -> Result<(), AgentError> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| AgentError::CheckpointFailed("lock".into()))?;
        guard
            .entry(checkpoint.thread_id.clone())
            .or_default()
            .push(checkpoint.clone());
        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint<S>>, AgentError> {
        let guard = self
            .inner
            .read()
            .map_err(|_| AgentError::CheckpointFailed("lock".into()))?;
        Ok(guard
            .get(thread_id)
            .and_then(|history| history.last().cloned()))
    }

    async fn clear(&self) -> Result<(), AgentError> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| AgentError::CheckpointFailed("lock".into()))?;
        guard.clear();
        Ok(())
    }
}

#[async_trait::async_trait]
impl<S: StateSchema> HistoryCheckpointer<S> for InMemoryCheckpointer<S> {
    async fn list_checkpoints(
        &self,
        thread_id: &str,
    ) -> Result<Vec<CheckpointMetadata>, AgentError> {
        let guard = self
            .inner
            .read()
            .map_err(|_| AgentError::CheckpointFailed("lock".into()))?;
        let history = guard.get(thread_id).cloned().unwrap_or_default();
        Ok(history
            .into_iter()
            .enumerate()
            .map(|(index, cp)| CheckpointMetadata {
                seq: index as u64 + 1,
                node: cp.node,
                next: cp.next,
                created_at: cp.created_at,
            })
            .collect())
    }
}
