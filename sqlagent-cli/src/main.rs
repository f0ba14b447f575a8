//! `sqlagent`: answer natural-language questions against a SQLite database.
//!
//! ```bash
//! # Answer every line of questions.txt into answers.txt
//! sqlagent batch
//!
//! # Review each generated query before it runs
//! sqlagent batch --approve --input questions.txt --output answers.txt
//!
//! # One question, then pick it up again later if it was left pending
//! sqlagent ask "How many customers are there?" --approve --thread-id demo
//! sqlagent resume demo
//! sqlagent history demo
//! ```

mod app;
mod batch;
mod config;
mod console;

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sqlagent_core::{HistoryCheckpointer, SchemaProvider};
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::console::{ConsoleApproval, ConsoleObserver};

const DEFAULT_LOG_FILTER: &str = "sqlagent=info";

#[derive(Debug, Parser)]
#[command(name = "sqlagent", version, about = "Self-correcting natural-language-to-SQL agent")]
struct Cli {
    /// Config file (defaults to ./sqlagent.toml when present)
    #[arg(long, global = true, env = "SQLAGENT_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `sqlagent_graph=debug` (overrides RUST_LOG)
    #[arg(long, global = true, env = "SQLAGENT_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Answer every question of a file, one record per question
    Batch {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
        /// Ask for approval before each query runs
        #[arg(long)]
        approve: bool,
        /// Keep stored runs from earlier batches
        #[arg(long)]
        keep_state: bool,
        /// Pause between questions in milliseconds
        #[arg(long)]
        pause_ms: Option<u64>,
    },
    /// Answer a single question
    Ask {
        question: String,
        #[arg(long)]
        approve: bool,
        #[arg(long, default_value = "ask")]
        thread_id: String,
    },
    /// Continue a stored run, e.g. one left waiting for approval
    Resume { thread_id: String },
    /// List the stored checkpoints of a thread, oldest first
    History { thread_id: String },
    /// Print the schema description given to the model
    Schema,
}

fn init_tracing(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).with_context(|| format!("invalid log filter `{level}`"))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref())?;

    let mut config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Batch {
            input,
            output,
            approve,
            keep_state,
            pause_ms,
        } => {
            if let Some(input) = input {
                config.batch.input = input;
            }
            if let Some(output) = output {
                config.batch.output = output;
            }
            if let Some(pause_ms) = pause_ms {
                config.batch.pause_ms = pause_ms;
            }
            config.agent.require_approval |= approve;
            run_batch_command(&config, keep_state).await
        }
        Command::Ask {
            question,
            approve,
            thread_id,
        } => {
            config.agent.require_approval |= approve;
            let agent = app::build_agent(&config, Some(Arc::new(ConsoleObserver))).await?;
            let state = agent
                .run_with_approval(&thread_id, &question, &ConsoleApproval)
                .await?;
            tracing::info!(%thread_id, retry_count = state.retry_count, "question answered");
            Ok(())
        }
        Command::Resume { thread_id } => {
            let agent = app::build_agent(&config, Some(Arc::new(ConsoleObserver))).await?;
            let Some(snapshot) = agent.snapshot(&thread_id).await? else {
                bail!("no stored run for thread `{thread_id}`");
            };
            if snapshot.is_terminal() {
                println!("Thread {thread_id} already finished.\n\nFINAL ANSWER:\n{}", snapshot.state.answer);
                return Ok(());
            }
            let outcome = agent.continue_run(&thread_id).await?;
            agent.settle(&thread_id, outcome, &ConsoleApproval).await?;
            Ok(())
        }
        Command::History { thread_id } => {
            let store = app::open_checkpointer(&config.checkpoint).await?;
            let history = store.history.list_checkpoints(&thread_id).await?;
            if history.is_empty() {
                bail!("no stored run for thread `{thread_id}`");
            }
            for meta in &history {
                println!("{}", console::format_history_line(meta));
            }
            Ok(())
        }
        Command::Schema => {
            let database = app::open_database(&config.database).await?;
            let schema = database.schema().await.context("could not describe schema")?;
            println!("{schema}");
            Ok(())
        }
    }
}

async fn run_batch_command(config: &AppConfig, keep_state: bool) -> Result<()> {
    let questions = batch::read_questions(&config.batch.input)?;
    let agent = app::build_agent(config, Some(Arc::new(ConsoleObserver))).await?;
    if !keep_state {
        agent.clear_state().await?;
    }

    let file = File::create(&config.batch.output)
        .with_context(|| format!("could not create `{}`", config.batch.output.display()))?;
    let mut out = BufWriter::new(file);

    println!("Self-correcting SQL agent starting ({} questions)", questions.len());
    println!("{}", "-".repeat(70));
    let summary = batch::run_batch(
        &agent,
        &questions,
        &mut out,
        &ConsoleApproval,
        Duration::from_millis(config.batch.pause_ms),
    )
    .await?;

    tracing::info!(answered = summary.answered, failed = summary.failed, "batch finished");
    println!(
        "\nBatch processing complete. Results saved to {}",
        config.batch.output.display()
    );
    Ok(())
}
