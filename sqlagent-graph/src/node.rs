use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{AgentState, GraphError};

/// States of the question-answering machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    GetSchema,
    GenerateSql,
    ExecuteSql,
    FinalizeAnswer,
}

impl Node {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Node::GetSchema => "get_schema",
            Node::GenerateSql => "generate_sql",
            Node::ExecuteSql => "execute_sql",
            Node::FinalizeAnswer => "finalize_answer",
        }
    }

    /// Node that follows `self` given the state it just produced.
    /// `None` means the run is over.
    pub fn successor(self, state: &AgentState, max_retries: u32) -> Option<Node> {
        match self {
            Node::GetSchema => Some(Node::GenerateSql),
            Node::GenerateSql => Some(Node::ExecuteSql),
            Node::ExecuteSql => Some(route_after_execute(state, max_retries).target()),
            Node::FinalizeAnswer => None,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Node {
    type Err = GraphError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "get_schema" => Ok(Node::GetSchema),
            "generate_sql" => Ok(Node::GenerateSql),
            "execute_sql" => Ok(Node::ExecuteSql),
            "finalize_answer" => Ok(Node::FinalizeAnswer),
            other => Err(GraphError::InvalidCheckpoint(format!("unknown node '{other}'"))),
        }
    }
}

/// Decision taken after an execution attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    Retry,
    Finalize,
}

impl Route {
    pub fn target(self) -> Node {
        match self {
            Route::Retry => Node::GenerateSql,
            Route::Finalize => Node::FinalizeAnswer,
        }
    }
}

/// Retry while the last attempt failed and the ceiling is not reached.
/// Past the ceiling the run still finalizes with whatever result it has.
pub fn route_after_execute(state: &AgentState, max_retries: u32) -> Route {
    if state.error.is_some() && state.retry_count < max_retries {
        Route::Retry
    } else {
        Route::Finalize
    }
}
