use serde::{Deserialize, Serialize};
use sqlagent_core::AgentError;

use crate::AgentState;

/// What a suspended run exposes to the reviewer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingApproval {
    pub thread_id: String,
    pub question: String,
    pub sql_query: String,
    pub retry_count: u32,
}

impl PendingApproval {
    pub(crate) fn from_state(thread_id: &str, state: &AgentState) -> Self {
        Self {
            thread_id: thread_id.to_string(),
            question: state.question.clone(),
            sql_query: state.sql_query.clone(),
            retry_count: state.retry_count,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalDecision {
    Approve,
    Reject { feedback: String },
}

impl ApprovalDecision {
    pub fn reject(feedback: impl Into<String>) -> Self {
        ApprovalDecision::Reject {
            feedback: feedback.into(),
        }
    }
}

/// The error recorded for a rejected query. It is fed to the next
/// generation prompt exactly like an engine error.
pub fn rejection_message(feedback: &str) -> String {
    format!("Human Rejected SQL. Feedback: {feedback}")
}

#[async_trait::async_trait]
pub trait ApprovalHandler: Send + Sync {
    async fn decide(&self, pending: &PendingApproval) -> Result<ApprovalDecision, AgentError>;
}

/// Approves everything. Useful for dry runs of an approval-enabled config.
#[derive(Clone, Copy, Debug, Default)]
pub struct AutoApprove;

#[async_trait::async_trait]
impl ApprovalHandler for AutoApprove {
    async fn decide(&self, _pending: &PendingApproval) -> Result<ApprovalDecision, AgentError> {
        Ok(ApprovalDecision::Approve)
    }
}
