use std::sync::Arc;

use sqlagent_core::{AgentError, Llm, LlmRequest};

use crate::prompt::{answer_prompt, clean_sql, sql_prompt, DEFAULT_SYSTEM_PREAMBLE};
use crate::AgentState;

/// Answer recorded when the synthesizer returns nothing usable.
pub const ANSWER_FALLBACK: &str = "Error: Failed to generate answer.";

/// Turns the question, schema and last error into one SQL candidate.
#[derive(Clone)]
pub struct SqlGenerator {
    llm: Arc<dyn Llm>,
    model: String,
    temperature: Option<f32>,
    preamble: String,
}

impl SqlGenerator {
    pub fn new(llm: Arc<dyn Llm>) -> Self {
        Self {
            llm,
            model: String::new(),
            temperature: Some(0.0),
            preamble: DEFAULT_SYSTEM_PREAMBLE.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = preamble.into();
        self
    }

    pub fn prompt(&self, state: &AgentState) -> String {
        sql_prompt(
            &self.preamble,
            &state.schema_info,
            &state.question,
            state.error.as_deref(),
        )
    }

    pub async fn generate(&self, state: &AgentState) -> Result<String, AgentError> {
        let prompt = self.prompt(state);
        tracing::debug!(%prompt, "sql generation prompt");
        let request =
            LlmRequest::prompt(self.model.clone(), prompt).with_temperature(self.temperature);
        let response = self.llm.invoke(request).await?;
        Ok(clean_sql(&response.content))
    }
}

/// Turns the question and the (possibly stale or empty) result into prose.
#[derive(Clone)]
pub struct AnswerSynthesizer {
    llm: Arc<dyn Llm>,
    model: String,
    temperature: Option<f32>,
}

impl AnswerSynthesizer {
    pub fn new(llm: Arc<dyn Llm>) -> Self {
        Self {
            llm,
            model: String::new(),
            temperature: Some(0.0),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn prompt(&self, state: &AgentState) -> String {
        answer_prompt(&state.question, &state.db_result)
    }

    pub async fn synthesize(&self, state: &AgentState) -> Result<String, AgentError> {
        let prompt = self.prompt(state);
        tracing::debug!(%prompt, "answer prompt");
        let request =
            LlmRequest::prompt(self.model.clone(), prompt).with_temperature(self.temperature);
        let response = self.llm.invoke(request).await?;
        let answer = response.content.trim();
        if answer.is_empty() {
            tracing::warn!("answer synthesizer returned empty text");
            return Ok(ANSWER_FALLBACK.to_string());
        }
        Ok(answer.to_string())
    }
}
