use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use sqlagent_core::{AgentError, CheckpointMetadata};
use sqlagent_graph::{AgentState, ApprovalDecision, ApprovalHandler, Node, Observer, PendingApproval};

const RULE_WIDTH: usize = 50;

/// Asks the operator on the terminal whether a generated query may run.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleApproval;

pub fn is_approval(input: &str) -> bool {
    matches!(input.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn prompt_decision(pending: &PendingApproval) -> Result<ApprovalDecision, ReadlineError> {
    let rule = "=".repeat(RULE_WIDTH);
    println!("\n{rule}");
    println!("Human Approval Required ({})", pending.thread_id);
    if pending.retry_count > 0 {
        println!("Attempt {} for: {}", pending.retry_count + 1, pending.question);
    }
    println!("The agent wants to execute the following SQL:\n{}", pending.sql_query);
    println!("{rule}");

    let mut editor = DefaultEditor::new()?;
    let answer = editor.readline("Do you approve this query? (y/n): ")?;
    if is_approval(&answer) {
        println!("SQL Approved. Executing...");
        return Ok(ApprovalDecision::Approve);
    }

    println!("SQL Rejected.");
    let feedback = editor.readline("Tell the AI what needs to be fixed:\n> ")?;
    println!("Feedback sent. Rewriting the query...");
    Ok(ApprovalDecision::reject(feedback.trim()))
}

#[async_trait::async_trait]
impl ApprovalHandler for ConsoleApproval {
    async fn decide(&self, pending: &PendingApproval) -> Result<ApprovalDecision, AgentError> {
        let pending = pending.clone();
        tokio::task::spawn_blocking(move || prompt_decision(&pending))
            .await
            .map_err(|err| AgentError::Approval(err.to_string()))?
            .map_err(|err| AgentError::Approval(err.to_string()))
    }
}

/// Prints node progress to stdout while logs go to stderr.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleObserver;

impl Observer for ConsoleObserver {
    fn on_node_exit(&self, _thread_id: &str, node: Node, state: &AgentState) {
        match node {
            Node::GetSchema => println!("Fetched schema."),
            Node::GenerateSql if state.retry_count > 0 => {
                println!("Rewrote SQL (attempt {}):\n{}", state.retry_count + 1, state.sql_query)
            }
            Node::GenerateSql => println!("Generated SQL:\n{}", state.sql_query),
            Node::ExecuteSql => match &state.error {
                Some(error) => println!("Execution Failed: {error}"),
                None => println!("Executed SQL."),
            },
            Node::FinalizeAnswer => println!("\nFINAL ANSWER:\n{}", state.answer),
        }
    }

    fn on_error(&self, _thread_id: &str, node: Node, error: &str) {
        println!("Step {node} failed: {error}");
    }
}

pub fn format_history_line(meta: &CheckpointMetadata) -> String {
    let next = meta.next.as_deref().unwrap_or("END");
    format!("{:>4}  {}  {} -> {next}", meta.seq, meta.created_at, meta.node)
}
