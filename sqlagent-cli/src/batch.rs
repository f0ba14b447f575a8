use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlagent_graph::{ApprovalHandler, SqlAgent};

const RECORD_SEPARATOR_WIDTH: usize = 50;

/// Non-blank, trimmed lines of the questions file.
pub fn read_questions(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("could not read questions from `{}`", path.display()))?;
    Ok(parse_questions(&text))
}

pub fn parse_questions(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn batch_thread_id(index: usize) -> String {
    format!("batch_question_{index}")
}

pub fn format_answer_record(index: usize, question: &str, answer: &str) -> String {
    format!(
        "Question {index}: {question}\nAnswer:\n{answer}\n{}\n\n",
        "-".repeat(RECORD_SEPARATOR_WIDTH)
    )
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub answered: usize,
    pub failed: usize,
}

/// Answers every question in order, one thread per question, writing a
/// record per question. A question that fails still gets a record with the
/// error as its answer and the batch moves on.
pub async fn run_batch<W: Write>(
    agent: &SqlAgent,
    questions: &[String],
    out: &mut W,
    approval: &dyn ApprovalHandler,
    pause: Duration,
) -> Result<BatchSummary> {
    let mut summary = BatchSummary::default();
    let total = questions.len();

    for (offset, question) in questions.iter().enumerate() {
        let index = offset + 1;
        let thread_id = batch_thread_id(index);
        println!("\nProcessing [{index}/{total}]: {question}");
        println!("{}", "-".repeat(RECORD_SEPARATOR_WIDTH));

        let answer = match agent.run_with_approval(&thread_id, question, approval).await {
            Ok(state) => {
                summary.answered += 1;
                state.answer
            }
            Err(err) => {
                tracing::error!(%thread_id, error = %err, "question failed");
                println!("Graph Error: {err}");
                summary.failed += 1;
                format!("Graph Error: {err}")
            }
        };

        out.write_all(format_answer_record(index, question, &answer).as_bytes())
            .context("could not write answer record")?;
        out.flush().context("could not flush answers")?;

        if index < total && !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }

    Ok(summary)
}
