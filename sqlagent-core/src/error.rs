use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("LLM provider failed: {0}")]
    LlmProvider(String),
    #[error("Database unavailable: {0}")]
    Database(String),
    #[error("Checkpoint failed: {0}")]
    CheckpointFailed(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Approval input failed: {0}")]
    Approval(String),
    #[error("Serialization/deserialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("{0}")]
    Custom(String),
}

/// Failure reported by a [`crate::SqlExecutor`] or [`crate::SchemaProvider`].
///
/// `Execution` carries the engine message verbatim so it can be fed back into
/// the next generation prompt. `Unavailable` means the database could not be
/// reached at all and is not retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SqlError {
    #[error("{0}")]
    Execution(String),
    #[error("database unavailable: {0}")]
    Unavailable(String),
}

impl SqlError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SqlError::Execution(_))
    }
}

impl From<SqlError> for AgentError {
    fn from(err: SqlError) -> Self {
        match err {
            SqlError::Execution(message) => AgentError::Custom(message),
            SqlError::Unavailable(message) => AgentError::Database(message),
        }
    }
}
