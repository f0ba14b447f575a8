mod checkpoint;
mod error;
mod llm;
mod sql;
pub mod state;

pub use checkpoint::{
    Checkpoint, CheckpointMetadata, Checkpointer, HistoryCheckpointer, InMemoryCheckpointer,
};
pub use error::{AgentError, SqlError};
pub use llm::{Llm, LlmRequest, LlmResponse, Message, Role};
pub use sql::{QueryResult, SchemaProvider, SqlExecutor, SqlValue};
pub use state::StateSchema;
