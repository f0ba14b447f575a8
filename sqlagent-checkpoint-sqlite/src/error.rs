use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckpointSqlError {
    #[error("failed to connect to checkpoint database: {0}")]
    Connection(#[source] sqlx::Error),
    #[error("checkpoint migration failed: {0}")]
    Migration(#[source] sqlx::Error),
    #[error("checkpoint query failed: {0}")]
    Query(#[source] sqlx::Error),
    #[error("checkpoint state is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("checkpoint step {0} is out of range")]
    StepOutOfRange(String),
}
