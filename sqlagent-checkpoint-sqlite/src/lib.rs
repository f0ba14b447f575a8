//! Durable SQLite store for agent checkpoints.
//!
//! Every save appends a row to `checkpoints`; `load` returns the newest row of
//! a thread, so a run suspended for approval can be resumed by another process
//! pointed at the same database file.

use std::convert::TryFrom;
use std::str::FromStr;

use sqlagent_core::{
    AgentError, Checkpoint, CheckpointMetadata, Checkpointer, HistoryCheckpointer, StateSchema,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub mod error;
pub mod migrations;
pub mod ops;
pub mod schema;

pub use error::CheckpointSqlError;

use migrations::run_migrations;
use ops::{clear_checkpoints, list_checkpoints, load_latest_checkpoint, save_checkpoint, NewCheckpoint};

#[derive(Debug, Clone)]
pub struct SqliteCheckpointer {
    pool: sqlx::SqlitePool,
}

#[derive(Debug, Clone)]
pub struct SqliteCheckpointerBuilder {
    database_url: String,
    max_connections: u32,
    create_if_missing: bool,
}

impl SqliteCheckpointer {
    pub fn builder(database_url: impl Into<String>) -> SqliteCheckpointerBuilder {
        SqliteCheckpointerBuilder {
            database_url: database_url.into(),
            max_connections: 1,
            create_if_missing: true,
        }
    }

    pub fn pool(&self) -> &sqlx::SqlitePool {
        &self.pool
    }
}

impl SqliteCheckpointerBuilder {
    pub fn max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn create_if_missing(mut self, create_if_missing: bool) -> Self {
        self.create_if_missing = create_if_missing;
        self
    }

    pub async fn build(self) -> Result<SqliteCheckpointer, CheckpointSqlError> {
        let options = SqliteConnectOptions::from_str(&self.database_url)
            .map_err(CheckpointSqlError::Connection)?
            .create_if_missing(self.create_if_missing);
        let pool = SqlitePoolOptions::new()
            .max_connections(self.max_connections)
            .connect_with(options)
            .await
            .map_err(CheckpointSqlError::Connection)?;

        run_migrations(&pool).await?;
        tracing::debug!(url = %self.database_url, "sqlite checkpoint store ready");

        Ok(SqliteCheckpointer { pool })
    }
}

fn checkpoint_error(message: impl Into<String>) -> AgentError {
    AgentError::CheckpointFailed(message.into())
}

fn map_sql_error(error: CheckpointSqlError) -> AgentError {
    checkpoint_error(error.to_string())
}

fn to_u64(value: i64, what: &str) -> Result<u64, AgentError> {
    u64::try_from(value).map_err(|_| {
        map_sql_error(CheckpointSqlError::StepOutOfRange(format!(
            "{what} = {value}"
        )))
    })
}

#[async_trait::async_trait]
impl<S: StateSchema> Checkpointer<S> for SqliteCheckpointer {
    async fn save(&self, checkpoint: &Checkpoint<S>) -> Result<(), AgentError> {
        let step = i64::try_from(checkpoint.step)
            .map_err(|_| checkpoint_error("checkpoint step does not fit into i64"))?;
        let state_json = serde_json::to_value(&checkpoint.state)?;

        save_checkpoint(
            &self.pool,
            NewCheckpoint {
                thread_id: &checkpoint.thread_id,
                node: &checkpoint.node,
                next_node: checkpoint.next.as_deref(),
                step,
                created_at: &checkpoint.created_at,
                state_json: &state_json,
            },
        )
        .await
        .map_err(map_sql_error)
    }

    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint<S>>, AgentError> {
        let stored = load_latest_checkpoint(&self.pool, thread_id)
            .await
            .map_err(map_sql_error)?;

        let Some(stored) = stored else {
            return Ok(None);
        };

        let step = to_u64(stored.step.unwrap_or_default(), "step")?;
        let state: S = serde_json::from_value(stored.state_json).map_err(|error| {
            checkpoint_error(format!("failed to deserialize checkpoint state: {error}"))
        })?;

        Ok(Some(Checkpoint {
            thread_id: stored.thread_id,
            state,
            step,
            node: stored.node.unwrap_or_default(),
            next: stored.next_node,
            created_at: stored.created_at,
        }))
    }

    async fn clear(&self) -> Result<(), AgentError> {
        let removed = clear_checkpoints(&self.pool).await.map_err(map_sql_error)?;
        tracing::debug!(removed, "cleared sqlite checkpoints");
        Ok(())
    }
}

#[async_trait::async_trait]
impl<S: StateSchema> HistoryCheckpointer<S> for SqliteCheckpointer {
    async fn list_checkpoints(
        &self,
        thread_id: &str,
    ) -> Result<Vec<CheckpointMetadata>, AgentError> {
        list_checkpoints(&self.pool, thread_id)
            .await
            .map_err(map_sql_error)?
            .into_iter()
            .map(|row| {
                Ok(CheckpointMetadata {
                    seq: to_u64(row.seq, "seq")?,
                    node: row.node.unwrap_or_default(),
                    next: row.next_node,
                    created_at: row.created_at,
                })
            })
            .collect()
    }
}
