use serde::{Deserialize, Serialize};
use sqlagent_core::StateSchema;

/// The record threaded through every transition of one question's run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    pub question: String,
    pub schema_info: String,
    pub sql_query: String,
    pub db_result: String,
    pub error: Option<String>,
    pub answer: String,
    pub retry_count: u32,
}

impl AgentState {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Default::default()
        }
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorUpdate {
    Set(String),
    Clear,
}

/// Partial update returned by a node. `None` leaves the field unchanged.
///
/// There is no `question` field: the question is fixed when the run starts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStateUpdate {
    pub schema_info: Option<String>,
    pub sql_query: Option<String>,
    pub db_result: Option<String>,
    pub error: Option<ErrorUpdate>,
    pub answer: Option<String>,
    pub retry_count: Option<u32>,
}

impl StateSchema for AgentState {
    type Update = AgentStateUpdate;

    fn apply(current: &Self, update: Self::Update) -> Self {
        let error = match update.error {
            Some(ErrorUpdate::Set(message)) => Some(message),
            Some(ErrorUpdate::Clear) => None,
            None => current.error.clone(),
        };
        Self {
            question: current.question.clone(),
            schema_info: update
                .schema_info
                .unwrap_or_else(|| current.schema_info.clone()),
            sql_query: update.sql_query.unwrap_or_else(|| current.sql_query.clone()),
            db_result: update.db_result.unwrap_or_else(|| current.db_result.clone()),
            error,
            answer: update.answer.unwrap_or_else(|| current.answer.clone()),
            retry_count: update.retry_count.unwrap_or(current.retry_count),
        }
    }
}
