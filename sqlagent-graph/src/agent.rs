use std::sync::Arc;

use sqlagent_core::{
    AgentError, Checkpoint, Checkpointer, InMemoryCheckpointer, Llm, SchemaProvider,
    SqlExecutor, StateSchema,
};

use crate::approval::{rejection_message, ApprovalDecision, ApprovalHandler, PendingApproval};
use crate::{
    route_after_execute, AgentState, AgentStateUpdate, AnswerSynthesizer, ErrorUpdate,
    ExecutionConfig, GraphError, Node, Observer, SqlGenerator,
};

/// Result of driving a thread until it finishes or suspends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(AgentState),
    AwaitingApproval(PendingApproval),
}

impl RunOutcome {
    pub fn answer(&self) -> Option<&str> {
        match self {
            RunOutcome::Completed(state) => Some(state.answer.as_str()),
            RunOutcome::AwaitingApproval(_) => None,
        }
    }
}

/// Stored state of a thread plus its pending transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadSnapshot {
    pub state: AgentState,
    pub step: u64,
    pub node: Node,
    /// `None` once the run reached `finalize_answer`.
    pub next: Option<Node>,
}

impl ThreadSnapshot {
    fn from_checkpoint(checkpoint: Checkpoint<AgentState>) -> Result<Self, GraphError> {
        let node = checkpoint.node.parse()?;
        let next = checkpoint
            .next
            .as_deref()
            .map(str::parse::<Node>)
            .transpose()?;
        Ok(Self {
            state: checkpoint.state,
            step: checkpoint.step,
            node,
            next,
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.next.is_none()
    }

    pub fn is_awaiting_execution(&self) -> bool {
        self.next == Some(Node::ExecuteSql)
    }
}

/// Drives one question through schema fetch, SQL generation, execution with
/// bounded retries, optional human approval, and answer synthesis.
///
/// Every node is followed by a checkpoint keyed by thread id, so a suspended
/// (or crashed) run can be picked up by another `SqlAgent` sharing the store.
pub struct SqlAgent {
    schema: Arc<dyn SchemaProvider>,
    executor: Arc<dyn SqlExecutor>,
    generator: SqlGenerator,
    synthesizer: AnswerSynthesizer,
    checkpointer: Arc<dyn Checkpointer<AgentState>>,
    observer: Option<Arc<dyn Observer>>,
    config: ExecutionConfig,
}

impl SqlAgent {
    pub fn builder() -> SqlAgentBuilder {
        SqlAgentBuilder::default()
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Starts a fresh run for `question`, replacing whatever the thread held.
    #[tracing::instrument(name = "sql_agent.run", skip(self))]
    pub async fn run(&self, thread_id: &str, question: &str) -> Result<RunOutcome, GraphError> {
        tracing::info!("starting run");
        self.drive(thread_id, AgentState::new(question), Node::GetSchema, 0, false)
            .await
    }

    /// Runs to completion and returns the answer. A run that suspends for
    /// approval yields [`GraphError::Interrupted`]; its state stays stored.
    pub async fn invoke(&self, thread_id: &str, question: &str) -> Result<String, GraphError> {
        match self.run(thread_id, question).await? {
            RunOutcome::Completed(state) => Ok(state.answer),
            RunOutcome::AwaitingApproval(_) => Err(GraphError::Interrupted),
        }
    }

    /// Applies a reviewer decision to a thread suspended before `execute_sql`.
    #[tracing::instrument(name = "sql_agent.resume", skip(self))]
    pub async fn resume(
        &self,
        thread_id: &str,
        decision: ApprovalDecision,
    ) -> Result<RunOutcome, GraphError> {
        let snapshot = self.require_snapshot(thread_id).await?;
        if !snapshot.is_awaiting_execution() {
            return Err(GraphError::NoPendingApproval {
                thread_id: thread_id.to_string(),
            });
        }

        match decision {
            ApprovalDecision::Approve => {
                tracing::info!(sql = %snapshot.state.sql_query, "sql approved");
                self.drive(thread_id, snapshot.state, Node::ExecuteSql, snapshot.step, true)
                    .await
            }
            ApprovalDecision::Reject { feedback } => {
                // Recorded as the outcome of execute_sql so the router decides
                // what follows, exactly as for an engine failure.
                let update = AgentStateUpdate {
                    error: Some(ErrorUpdate::Set(rejection_message(&feedback))),
                    retry_count: Some(snapshot.state.retry_count + 1),
                    ..Default::default()
                };
                let state = AgentState::apply(&snapshot.state, update);
                let step = snapshot.step + 1;
                let route = route_after_execute(&state, self.config.max_retries);
                tracing::warn!(
                    retry_count = state.retry_count,
                    ?route,
                    %feedback,
                    "sql rejected by reviewer"
                );
                self.save(thread_id, &state, step, Node::ExecuteSql, Some(route.target()))
                    .await?;
                self.drive(thread_id, state, route.target(), step, false)
                    .await
            }
        }
    }

    /// Continues a stored thread from its pending transition. A thread that
    /// is waiting for approval reports the same pending query again.
    #[tracing::instrument(name = "sql_agent.continue", skip(self))]
    pub async fn continue_run(&self, thread_id: &str) -> Result<RunOutcome, GraphError> {
        let snapshot = self.require_snapshot(thread_id).await?;
        match snapshot.next {
            None => Ok(RunOutcome::Completed(snapshot.state)),
            Some(next) => {
                tracing::info!(%next, step = snapshot.step, "continuing stored run");
                self.drive(thread_id, snapshot.state, next, snapshot.step, false)
                    .await
            }
        }
    }

    /// Starts a run and settles every approval checkpoint through `handler`.
    pub async fn run_with_approval(
        &self,
        thread_id: &str,
        question: &str,
        handler: &dyn ApprovalHandler,
    ) -> Result<AgentState, GraphError> {
        let outcome = self.run(thread_id, question).await?;
        self.settle(thread_id, outcome, handler).await
    }

    /// Feeds reviewer decisions until `outcome` reaches a terminal state.
    pub async fn settle(
        &self,
        thread_id: &str,
        mut outcome: RunOutcome,
        handler: &dyn ApprovalHandler,
    ) -> Result<AgentState, GraphError> {
        loop {
            match outcome {
                RunOutcome::Completed(state) => return Ok(state),
                RunOutcome::AwaitingApproval(pending) => {
                    let decision = handler
                        .decide(&pending)
                        .await
                        .map_err(|err| GraphError::Approval(err.to_string()))?;
                    outcome = self.resume(thread_id, decision).await?;
                }
            }
        }
    }

    /// Current state and pending transition of a thread, if stored.
    pub async fn snapshot(&self, thread_id: &str) -> Result<Option<ThreadSnapshot>, GraphError> {
        let checkpoint = self
            .checkpointer
            .load(thread_id)
            .await
            .map_err(checkpoint_error)?;
        checkpoint.map(ThreadSnapshot::from_checkpoint).transpose()
    }

    /// Drops every stored thread.
    pub async fn clear_state(&self) -> Result<(), GraphError> {
        self.checkpointer.clear().await.map_err(checkpoint_error)
    }

    async fn require_snapshot(&self, thread_id: &str) -> Result<ThreadSnapshot, GraphError> {
        self.snapshot(thread_id)
            .await?
            .ok_or_else(|| GraphError::MissingThread {
                thread_id: thread_id.to_string(),
            })
    }

    async fn drive(
        &self,
        thread_id: &str,
        mut state: AgentState,
        mut node: Node,
        mut step: u64,
        mut approved: bool,
    ) -> Result<RunOutcome, GraphError> {
        let mut executed = 0usize;
        loop {
            if node == Node::ExecuteSql && self.config.require_approval && !approved {
                let pending = PendingApproval::from_state(thread_id, &state);
                tracing::info!(
                    retry_count = pending.retry_count,
                    sql = %pending.sql_query,
                    "awaiting human approval"
                );
                if let Some(observer) = &self.observer {
                    observer.on_interrupt(&pending);
                }
                return Ok(RunOutcome::AwaitingApproval(pending));
            }
            approved = false;

            if let Some(max) = self.config.max_steps {
                if executed >= max {
                    return Err(GraphError::MaxStepsExceeded {
                        max,
                        reached: executed,
                    });
                }
            }

            if let Some(observer) = &self.observer {
                observer.on_node_enter(thread_id, node);
            }
            let update = match self.execute_node(node, &state).await {
                Ok(update) => update,
                Err(source) => {
                    tracing::error!(%node, error = %source, "node failed");
                    if let Some(observer) = &self.observer {
                        observer.on_error(thread_id, node, &source.to_string());
                    }
                    return Err(GraphError::NodeFailed {
                        node: node.as_str().to_string(),
                        source,
                    });
                }
            };
            state = AgentState::apply(&state, update);
            executed += 1;
            step += 1;

            let next = node.successor(&state, self.config.max_retries);
            self.save(thread_id, &state, step, node, next).await?;
            if let Some(observer) = &self.observer {
                observer.on_node_exit(thread_id, node, &state);
            }

            match next {
                Some(following) => node = following,
                None => {
                    tracing::info!(retry_count = state.retry_count, "run finished");
                    return Ok(RunOutcome::Completed(state));
                }
            }
        }
    }

    async fn execute_node(
        &self,
        node: Node,
        state: &AgentState,
    ) -> Result<AgentStateUpdate, AgentError> {
        match node {
            Node::GetSchema => {
                tracing::info!("fetching schema");
                let schema_info = self.schema.schema().await?;
                Ok(AgentStateUpdate {
                    schema_info: Some(schema_info),
                    retry_count: Some(0),
                    error: Some(ErrorUpdate::Clear),
                    ..Default::default()
                })
            }
            Node::GenerateSql => {
                if let Some(error) = &state.error {
                    tracing::warn!(
                        retry_count = state.retry_count,
                        %error,
                        "regenerating sql after failure"
                    );
                }
                let sql_query = self.generator.generate(state).await?;
                tracing::info!(sql = %sql_query, "generated sql");
                Ok(AgentStateUpdate {
                    sql_query: Some(sql_query),
                    ..Default::default()
                })
            }
            Node::ExecuteSql => match self.executor.execute(&state.sql_query).await {
                Ok(result) => {
                    tracing::info!(rows = result.rows.len(), "sql executed");
                    Ok(AgentStateUpdate {
                        db_result: Some(result.to_string()),
                        error: Some(ErrorUpdate::Clear),
                        ..Default::default()
                    })
                }
                Err(err) if err.is_recoverable() => {
                    let message = err.to_string();
                    let retry_count = state.retry_count + 1;
                    tracing::warn!(retry_count, error = %message, "sql execution failed");
                    Ok(AgentStateUpdate {
                        error: Some(ErrorUpdate::Set(message)),
                        retry_count: Some(retry_count),
                        ..Default::default()
                    })
                }
                Err(err) => Err(err.into()),
            },
            Node::FinalizeAnswer => {
                if state.has_error() {
                    tracing::warn!(
                        retry_count = state.retry_count,
                        "retry ceiling reached, answering from the last available result"
                    );
                }
                let answer = self.synthesizer.synthesize(state).await?;
                Ok(AgentStateUpdate {
                    answer: Some(answer),
                    ..Default::default()
                })
            }
        }
    }

    async fn save(
        &self,
        thread_id: &str,
        state: &AgentState,
        step: u64,
        node: Node,
        next: Option<Node>,
    ) -> Result<(), GraphError> {
        let checkpoint = Checkpoint::new(
            thread_id.to_string(),
            state.clone(),
            step,
            node.as_str().to_string(),
            next.map(|n| n.as_str().to_string()),
        );
        self.checkpointer
            .save(&checkpoint)
            .await
            .map_err(checkpoint_error)?;
        if let Some(observer) = &self.observer {
            observer.on_checkpoint_saved(thread_id, node);
        }
        Ok(())
    }
}

fn checkpoint_error(err: AgentError) -> GraphError {
    GraphError::Checkpoint(err.to_string())
}

#[derive(Default)]
pub struct SqlAgentBuilder {
    schema: Option<Arc<dyn SchemaProvider>>,
    executor: Option<Arc<dyn SqlExecutor>>,
    generator: Option<SqlGenerator>,
    synthesizer: Option<AnswerSynthesizer>,
    checkpointer: Option<Arc<dyn Checkpointer<AgentState>>>,
    observer: Option<Arc<dyn Observer>>,
    config: ExecutionConfig,
}

impl SqlAgentBuilder {
    pub fn schema_provider(mut self, schema: Arc<dyn SchemaProvider>) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn SqlExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Uses `llm` with default settings for both SQL generation and answers.
    pub fn llm(mut self, llm: Arc<dyn Llm>) -> Self {
        self.generator = Some(SqlGenerator::new(llm.clone()));
        self.synthesizer = Some(AnswerSynthesizer::new(llm));
        self
    }

    pub fn sql_generator(mut self, generator: SqlGenerator) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn answer_synthesizer(mut self, synthesizer: AnswerSynthesizer) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    pub fn checkpointer(mut self, checkpointer: Arc<dyn Checkpointer<AgentState>>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<SqlAgent, GraphError> {
        self.config.validate().map_err(GraphError::Config)?;
        let schema = self
            .schema
            .ok_or_else(|| GraphError::Config("schema provider is required".to_string()))?;
        let executor = self
            .executor
            .ok_or_else(|| GraphError::Config("sql executor is required".to_string()))?;
        let generator = self
            .generator
            .ok_or_else(|| GraphError::Config("sql generator is required".to_string()))?;
        let synthesizer = self
            .synthesizer
            .ok_or_else(|| GraphError::Config("answer synthesizer is required".to_string()))?;
        let checkpointer: Arc<dyn Checkpointer<AgentState>> = match self.checkpointer {
            Some(checkpointer) => checkpointer,
            None => Arc::new(InMemoryCheckpointer::<AgentState>::default()),
        };

        Ok(SqlAgent {
            schema,
            executor,
            generator,
            synthesizer,
            checkpointer,
            observer: self.observer,
            config: self.config,
        })
    }
}
