mod agent;
mod approval;
mod config;
mod error;
mod file_checkpointer;
mod generator;
mod node;
mod observer;
pub mod prompt;
mod state;

pub use agent::{RunOutcome, SqlAgent, SqlAgentBuilder, ThreadSnapshot};
pub use approval::{
    rejection_message, ApprovalDecision, ApprovalHandler, AutoApprove, PendingApproval,
};
pub use config::{min_steps_for, ExecutionConfig, DEFAULT_MAX_RETRIES, DEFAULT_MAX_STEPS};
pub use error::GraphError;
pub use file_checkpointer::{CheckpointRecord, FileCheckpointer};
pub use generator::{AnswerSynthesizer, SqlGenerator, ANSWER_FALLBACK};
pub use node::{route_after_execute, Node, Route};
pub use observer::Observer;
pub use state::{AgentState, AgentStateUpdate, ErrorUpdate};

pub use sqlagent_core::{Checkpoint, Checkpointer, HistoryCheckpointer, InMemoryCheckpointer};
