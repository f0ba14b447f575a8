use sqlagent_core::AgentError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("checkpoint failed: {0}")]
    Checkpoint(String),
    #[error("node '{node}' failed: {source}")]
    NodeFailed {
        node: String,
        #[source]
        source: AgentError,
    },
    #[error("Max steps exceeded: reached {reached}, limit {max}")]
    MaxStepsExceeded { max: usize, reached: usize },
    #[error("no stored run for thread '{thread_id}'")]
    MissingThread { thread_id: String },
    #[error("thread '{thread_id}' is not waiting for approval")]
    NoPendingApproval { thread_id: String },
    #[error("invalid checkpoint: {0}")]
    InvalidCheckpoint(String),
    #[error("approval failed: {0}")]
    Approval(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("interrupted")]
    Interrupted,
}
