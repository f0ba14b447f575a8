mod cohere;
mod ollama;

// OpenAI-compatible client (OpenAI, DeepSeek, Together, vLLM, ...)
pub mod openai_compatible;

pub use cohere::{CohereClient, COHERE_BASE_URL};
pub use ollama::OllamaClient;
pub use openai_compatible::{OpenAiCompatibleBuilder, OpenAiCompatibleClient};
pub use sqlagent_core::{Llm, LlmRequest, LlmResponse, Message, Role};

use std::time::Duration;

pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

pub(crate) fn provider_error(err: impl std::fmt::Display) -> sqlagent_core::AgentError {
    sqlagent_core::AgentError::LlmProvider(err.to_string())
}
