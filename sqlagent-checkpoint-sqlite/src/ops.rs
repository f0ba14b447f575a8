use sqlx::{Row, SqlitePool};

use crate::error::CheckpointSqlError;

/// A checkpoint row with the state still as JSON.
#[derive(Debug, Clone)]
pub struct StoredCheckpoint {
    pub thread_id: String,
    pub seq: i64,
    pub created_at: String,
    pub node: Option<String>,
    pub next_node: Option<String>,
    pub step: Option<i64>,
    pub state_json: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct StoredMetadata {
    pub seq: i64,
    pub created_at: String,
    pub node: Option<String>,
    pub next_node: Option<String>,
}

pub struct NewCheckpoint<'a> {
    pub thread_id: &'a str,
    pub node: &'a str,
    pub next_node: Option<&'a str>,
    pub step: i64,
    pub created_at: &'a str,
    pub state_json: &'a serde_json::Value,
}

const INSERT_CHECKPOINT_SQL: &str = "INSERT INTO checkpoints \
    (thread_id, seq, created_at, node, next_node, step, state_json) \
    SELECT ?, COALESCE(MAX(seq), 0) + 1, ?, ?, ?, ?, ? FROM checkpoints WHERE thread_id = ?";

const SELECT_LATEST_SQL: &str = "SELECT thread_id, seq, created_at, node, next_node, step, state_json \
    FROM checkpoints WHERE thread_id = ? ORDER BY seq DESC LIMIT 1";

const SELECT_HISTORY_SQL: &str = "SELECT seq, created_at, node, next_node \
    FROM checkpoints WHERE thread_id = ? ORDER BY seq ASC";

/// Appends a checkpoint with the next sequence number of its thread.
pub async fn save_checkpoint(
    pool: &SqlitePool,
    checkpoint: NewCheckpoint<'_>,
) -> Result<(), CheckpointSqlError> {
    let state_json = serde_json::to_string(checkpoint.state_json)?;
    sqlx::query(INSERT_CHECKPOINT_SQL)
        .bind(checkpoint.thread_id)
        .bind(checkpoint.created_at)
        .bind(checkpoint.node)
        .bind(checkpoint.next_node)
        .bind(checkpoint.step)
        .bind(state_json)
        .bind(checkpoint.thread_id)
        .execute(pool)
        .await
        .map_err(CheckpointSqlError::Query)?;
    Ok(())
}

pub async fn load_latest_checkpoint(
    pool: &SqlitePool,
    thread_id: &str,
) -> Result<Option<StoredCheckpoint>, CheckpointSqlError> {
    let row = sqlx::query(SELECT_LATEST_SQL)
        .bind(thread_id)
        .fetch_optional(pool)
        .await
        .map_err(CheckpointSqlError::Query)?;

    let Some(row) = row else {
        return Ok(None);
    };

    let state_json: String = row.try_get("state_json").map_err(CheckpointSqlError::Query)?;
    Ok(Some(StoredCheckpoint {
        thread_id: row.try_get("thread_id").map_err(CheckpointSqlError::Query)?,
        seq: row.try_get("seq").map_err(CheckpointSqlError::Query)?,
        created_at: row.try_get("created_at").map_err(CheckpointSqlError::Query)?,
        node: row.try_get("node").map_err(CheckpointSqlError::Query)?,
        next_node: row.try_get("next_node").map_err(CheckpointSqlError::Query)?,
        step: row.try_get("step").map_err(CheckpointSqlError::Query)?,
        state_json: serde_json::from_str(&state_json)?,
    }))
}

pub async fn list_checkpoints(
    pool: &SqlitePool,
    thread_id: &str,
) -> Result<Vec<StoredMetadata>, CheckpointSqlError> {
    let rows = sqlx::query(SELECT_HISTORY_SQL)
        .bind(thread_id)
        .fetch_all(pool)
        .await
        .map_err(CheckpointSqlError::Query)?;

    rows.into_iter()
        .map(|row| {
            Ok(StoredMetadata {
                seq: row.try_get("seq")?,
                created_at: row.try_get("created_at")?,
                node: row.try_get("node")?,
                next_node: row.try_get("next_node")?,
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()
        .map_err(CheckpointSqlError::Query)
}

/// Deletes every thread's history. Returns the number of removed rows.
pub async fn clear_checkpoints(pool: &SqlitePool) -> Result<u64, CheckpointSqlError> {
    let result = sqlx::query("DELETE FROM checkpoints")
        .execute(pool)
        .await
        .map_err(CheckpointSqlError::Query)?;
    Ok(result.rows_affected())
}
