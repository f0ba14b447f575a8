use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlagent_checkpoint_sqlite::SqliteCheckpointer;
use sqlagent_core::{Checkpointer, HistoryCheckpointer, InMemoryCheckpointer, Llm};
use sqlagent_db::SqliteDatabase;
use sqlagent_graph::{
    AgentState, AnswerSynthesizer, FileCheckpointer, Observer, SqlAgent, SqlGenerator,
};
use sqlagent_llm::{CohereClient, OllamaClient, OpenAiCompatibleClient};

use crate::config::{
    AppConfig, CheckpointBackend, CheckpointSettings, DatabaseSettings, LlmProvider, LlmSettings,
};

pub fn build_llm(settings: &LlmSettings) -> Result<Arc<dyn Llm>> {
    let timeout = Duration::from_secs(settings.timeout_secs);
    let base_url = settings.base_url();
    tracing::debug!(provider = ?settings.provider, %base_url, model = %settings.model, "building llm client");

    let llm: Arc<dyn Llm> = match settings.provider {
        LlmProvider::Ollama => Arc::new(OllamaClient::with_timeout(
            base_url,
            settings.model.clone(),
            timeout,
        )?),
        LlmProvider::OpenAi => {
            let mut builder = OpenAiCompatibleClient::builder()
                .base_url(&base_url)?
                .default_model(settings.model.clone())
                .timeout(timeout);
            if let Some(key) = settings.api_key()? {
                builder = builder.api_key(key);
            }
            Arc::new(builder.build()?)
        }
        LlmProvider::Cohere => {
            let key = settings
                .api_key()?
                .context("cohere requires an API key")?;
            Arc::new(CohereClient::with_base_url(
                base_url,
                key,
                settings.model.clone(),
                timeout,
            )?)
        }
    };
    Ok(llm)
}

pub async fn open_database(settings: &DatabaseSettings) -> Result<Arc<SqliteDatabase>> {
    let database = SqliteDatabase::builder(settings.url.clone())
        .max_connections(settings.max_connections)
        .sample_rows(settings.sample_rows)
        .include_tables(settings.include_tables.iter().cloned())
        .init_statements(settings.init_statements.iter().cloned())
        .build()
        .await
        .with_context(|| format!("could not open database `{}`", settings.url))?;
    Ok(Arc::new(database))
}

/// The configured checkpoint backend, seen as the agent's state store and as
/// a per-thread history.
#[derive(Clone)]
pub struct CheckpointStore {
    pub state: Arc<dyn Checkpointer<AgentState>>,
    pub history: Arc<dyn HistoryCheckpointer<AgentState>>,
}

impl CheckpointStore {
    fn new<T>(store: T) -> Self
    where
        T: Checkpointer<AgentState> + HistoryCheckpointer<AgentState> + 'static,
    {
        let store = Arc::new(store);
        Self {
            state: store.clone(),
            history: store,
        }
    }
}

pub async fn open_checkpointer(settings: &CheckpointSettings) -> Result<CheckpointStore> {
    let store = match settings.backend {
        CheckpointBackend::Sqlite => {
            let url = format!("sqlite://{}", settings.path.display());
            let store = SqliteCheckpointer::builder(url)
                .build()
                .await
                .with_context(|| {
                    format!("could not open checkpoint store `{}`", settings.path.display())
                })?;
            CheckpointStore::new(store)
        }
        CheckpointBackend::File => CheckpointStore::new(FileCheckpointer::new(&settings.path)),
        CheckpointBackend::Memory => {
            CheckpointStore::new(InMemoryCheckpointer::<AgentState>::default())
        }
    };
    tracing::debug!(backend = ?settings.backend, path = %settings.path.display(), "checkpoint store ready");
    Ok(store)
}

/// Wires the configured model, database and checkpoint store into an agent.
pub async fn build_agent(config: &AppConfig, observer: Option<Arc<dyn Observer>>) -> Result<SqlAgent> {
    let llm = build_llm(&config.llm)?;
    let database = open_database(&config.database).await?;
    let checkpointer = open_checkpointer(&config.checkpoint).await?.state;

    let temperature = Some(config.llm.temperature);
    let mut generator = SqlGenerator::new(llm.clone())
        .with_model(config.llm.model.clone())
        .with_temperature(temperature);
    if let Some(preamble) = &config.agent.system_preamble {
        generator = generator.with_preamble(preamble.clone());
    }
    let synthesizer = AnswerSynthesizer::new(llm)
        .with_model(config.llm.model.clone())
        .with_temperature(temperature);

    let mut builder = SqlAgent::builder()
        .schema_provider(database.clone())
        .executor(database)
        .sql_generator(generator)
        .answer_synthesizer(synthesizer)
        .checkpointer(checkpointer)
        .config(config.execution_config());
    if let Some(observer) = observer {
        builder = builder.observer(observer);
    }
    Ok(builder.build()?)
}
