use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use sqlagent_core::{
    AgentError, Checkpoint, CheckpointMetadata, Checkpointer, HistoryCheckpointer, StateSchema,
};

const EXTENSION: &str = "jsonl";

/// One line of a thread's JSONL history file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "S: StateSchema")]
pub struct CheckpointRecord<S: StateSchema> {
    pub seq: u64,
    pub checkpoint: Checkpoint<S>,
}

/// Append-only checkpoint store with one `<thread>.jsonl` file per thread.
#[derive(Clone, Debug)]
pub struct FileCheckpointer {
    base_dir: PathBuf,
}

impl FileCheckpointer {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// File stem for a thread. Ids that are not already safe file names get
    /// a hash of the raw id appended, so `a/b` and `a_b` never share a file.
    fn sanitize_thread_id(thread_id: &str) -> String {
        let cleaned: String = thread_id
            .chars()
            .filter(|c| !c.is_control())
            .map(|c| match c {
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                c => c,
            })
            .collect();
        let trimmed = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace() || c == '_');
        if trimmed == thread_id {
            return trimmed.to_string();
        }
        let mut hasher = DefaultHasher::new();
        thread_id.hash(&mut hasher);
        let digest = hasher.finish();
        if trimmed.is_empty() {
            format!("thread-{digest:016x}")
        } else {
            format!("{trimmed}-{digest:016x}")
        }
    }

    fn thread_path(&self, thread_id: &str) -> PathBuf {
        self.base_dir
            .join(format!("{}.{EXTENSION}", Self::sanitize_thread_id(thread_id)))
    }

    async fn read_records<S: StateSchema>(
        &self,
        thread_id: &str,
    ) -> Result<Vec<CheckpointRecord<S>>, AgentError> {
        let path = self.thread_path(thread_id);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(io_error(&path, err)),
        };
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(AgentError::from))
            .collect()
    }
}

fn io_error(path: &Path, err: std::io::Error) -> AgentError {
    AgentError::CheckpointFailed(format!("{}: {err}", path.display()))
}

#[async_trait::async_trait]
impl<S: StateSchema> Checkpointer<S> for FileCheckpointer {
    async fn save(&self, checkpoint: &Checkpoint<S>) -> Result<(), AgentError> {
        tokio::fs::create_dir_all(&self.base_dir)
            .await
            .map_err(|err| io_error(&self.base_dir, err))?;

        let seq = self
            .read_records::<S>(&checkpoint.thread_id)
            .await?
            .last()
            .map(|record| record.seq + 1)
            .unwrap_or(1);
        let record = CheckpointRecord {
            seq,
            checkpoint: checkpoint.clone(),
        };
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let path = self.thread_path(&checkpoint.thread_id);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|err| io_error(&path, err))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|err| io_error(&path, err))?;
        file.flush().await.map_err(|err| io_error(&path, err))?;
        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint<S>>, AgentError> {
        Ok(self
            .read_records::<S>(thread_id)
            .await?
            .pop()
            .map(|record| record.checkpoint))
    }

    async fn clear(&self) -> Result<(), AgentError> {
        let mut entries = match tokio::fs::read_dir(&self.base_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(io_error(&self.base_dir, err)),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| io_error(&self.base_dir, err))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some(EXTENSION) {
                tokio::fs::remove_file(&path)
                    .await
                    .map_err(|err| io_error(&path, err))?;
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl<S: StateSchema> HistoryCheckpointer<S> for FileCheckpointer {
    async fn list_checkpoints(
        &self,
        thread_id: &str,
    ) -> Result<Vec<CheckpointMetadata>, AgentError> {
        Ok(self
            .read_records::<S>(thread_id)
            .await?
            .into_iter()
            .map(|record| CheckpointMetadata {
                seq: record.seq,
                node: record.checkpoint.node,
                next: record.checkpoint.next,
                created_at: record.checkpoint.created_at,
            })
            .collect())
    }
}
