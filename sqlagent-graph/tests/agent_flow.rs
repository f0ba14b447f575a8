use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use sqlagent_core::{
    AgentError, Llm, LlmRequest, LlmResponse, QueryResult, SchemaProvider, SqlError, SqlExecutor,
    SqlValue,
};
use sqlagent_graph::{
    AgentState, AnswerSynthesizer, ExecutionConfig, GraphError, InMemoryCheckpointer, Node,
    Observer, RunOutcome, SqlAgent, SqlGenerator, ANSWER_FALLBACK,
};

#[derive(Default)]
struct ScriptedLlm {
    responses: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    fn new<I: IntoIterator<Item = &'static str>>(responses: I) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().map(|r| Ok(r.to_string())).collect()),
            prompts: Mutex::default(),
        })
    }

    fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(VecDeque::from([Err(message.to_string())])),
            prompts: Mutex::default(),
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Llm for ScriptedLlm {
    async fn invoke(&self, request: LlmRequest) -> Result<LlmResponse, AgentError> {
        self.prompts
            .lock()
            .unwrap()
            .push(request.messages[0].content.clone());
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(content)) => Ok(LlmResponse { content }),
            Some(Err(message)) => Err(AgentError::LlmProvider(message)),
            None => Err(AgentError::LlmProvider("script exhausted".to_string())),
        }
    }
}

struct StaticSchema(&'static str);

#[async_trait::async_trait]
impl SchemaProvider for StaticSchema {
    async fn schema(&self) -> Result<String, SqlError> {
        Ok(self.0.to_string())
    }
}

#[derive(Default)]
struct ScriptedExecutor {
    results: Mutex<VecDeque<Result<QueryResult, SqlError>>>,
    executed: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    fn new(results: Vec<Result<QueryResult, SqlError>>) -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(results.into()),
            executed: Mutex::default(),
        })
    }

    fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl SqlExecutor for ScriptedExecutor {
    async fn execute(&self, sql: &str) -> Result<QueryResult, SqlError> {
        self.executed.lock().unwrap().push(sql.to_string());
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(SqlError::Unavailable("no scripted result".to_string())))
    }
}

#[derive(Default)]
struct RecordingObserver {
    exits: Mutex<Vec<(Node, AgentState)>>,
}

impl Observer for RecordingObserver {
    fn on_node_exit(&self, _thread_id: &str, node: Node, state: &AgentState) {
        self.exits.lock().unwrap().push((node, state.clone()));
    }
}

fn count_result(n: i64) -> QueryResult {
    QueryResult::new(vec!["COUNT(*)".to_string()], vec![vec![SqlValue::Integer(n)]])
}

fn agent(
    sql_llm: Arc<ScriptedLlm>,
    answer_llm: Arc<ScriptedLlm>,
    executor: Arc<ScriptedExecutor>,
    config: ExecutionConfig,
) -> SqlAgent {
    SqlAgent::builder()
        .schema_provider(Arc::new(StaticSchema("CUSTOMERS(ID, NAME)")))
        .executor(executor)
        .sql_generator(SqlGenerator::new(sql_llm))
        .answer_synthesizer(AnswerSynthesizer::new(answer_llm))
        .config(config)
        .build()
        .expect("agent should build")
}

#[tokio::test]
async fn first_attempt_success_answers_without_retries() {
    let sql_llm = ScriptedLlm::new(["```sql\nSELECT COUNT(*) FROM CUSTOMERS;\n```"]);
    let answer_llm = ScriptedLlm::new(["There are 42 customers."]);
    let executor = ScriptedExecutor::new(vec![Ok(count_result(42))]);
    let agent = agent(
        sql_llm.clone(),
        answer_llm.clone(),
        executor.clone(),
        ExecutionConfig::default(),
    );

    let outcome = agent
        .run("batch_question_1", "How many customers are there?")
        .await
        .unwrap();

    let RunOutcome::Completed(state) = outcome else {
        panic!("expected a completed run");
    };
    assert_eq!(state.answer, "There are 42 customers.");
    assert_eq!(state.retry_count, 0);
    assert_eq!(state.error, None);
    assert_eq!(state.db_result, "[(42,)]");
    assert_eq!(state.schema_info, "CUSTOMERS(ID, NAME)");
    assert_eq!(executor.executed(), vec!["SELECT COUNT(*) FROM CUSTOMERS"]);

    let sql_prompts = sql_llm.prompts();
    assert_eq!(sql_prompts.len(), 1);
    assert!(sql_prompts[0].contains("Schema: CUSTOMERS(ID, NAME)"));
    assert!(sql_prompts[0].contains("Question: How many customers are there?"));
    assert!(!sql_prompts[0].contains("PREVIOUS ERROR"));

    let answer_prompts = answer_llm.prompts();
    assert_eq!(answer_prompts.len(), 1);
    assert!(answer_prompts[0].contains("42"));
}

#[tokio::test]
async fn execution_failure_retries_with_engine_error_in_prompt() {
    let sql_llm = ScriptedLlm::new([
        "SELECT CUSTOMER_NAME FROM CUSTOMERS",
        "SELECT NAME FROM CUSTOMERS",
    ]);
    let answer_llm = ScriptedLlm::new(["Ada and Grace."]);
    let executor = ScriptedExecutor::new(vec![
        Err(SqlError::Execution("ORA-00904: invalid identifier".to_string())),
        Ok(QueryResult::new(
            vec!["NAME".to_string()],
            vec![
                vec![SqlValue::Text("Ada".to_string())],
                vec![SqlValue::Text("Grace".to_string())],
            ],
        )),
    ]);
    let observer = Arc::new(RecordingObserver::default());
    let agent = SqlAgent::builder()
        .schema_provider(Arc::new(StaticSchema("CUSTOMERS(ID, NAME)")))
        .executor(executor.clone())
        .sql_generator(SqlGenerator::new(sql_llm.clone()))
        .answer_synthesizer(AnswerSynthesizer::new(answer_llm))
        .observer(observer.clone())
        .build()
        .unwrap();

    let state = match agent.run("t-retry", "Who are the customers?").await.unwrap() {
        RunOutcome::Completed(state) => state,
        other => panic!("unexpected outcome: {other:?}"),
    };

    let exits = observer.exits.lock().unwrap().clone();
    let nodes: Vec<Node> = exits.iter().map(|(node, _)| *node).collect();
    assert_eq!(
        nodes,
        vec![
            Node::GetSchema,
            Node::GenerateSql,
            Node::ExecuteSql,
            Node::GenerateSql,
            Node::ExecuteSql,
            Node::FinalizeAnswer,
        ]
    );

    let (_, after_failure) = &exits[2];
    assert_eq!(after_failure.retry_count, 1);
    assert_eq!(
        after_failure.error.as_deref(),
        Some("ORA-00904: invalid identifier")
    );
    assert_eq!(after_failure.db_result, "");

    let prompts = sql_llm.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("PREVIOUS ERROR: ORA-00904: invalid identifier"));
    assert!(prompts[1].contains("INSTRUCTION: Fix the SQL to avoid this error."));

    assert_eq!(state.retry_count, 1);
    assert_eq!(state.error, None);
    assert_eq!(state.db_result, "[('Ada',), ('Grace',)]");
    assert_eq!(
        executor.executed(),
        vec!["SELECT CUSTOMER_NAME FROM CUSTOMERS", "SELECT NAME FROM CUSTOMERS"]
    );
}

#[tokio::test]
async fn three_failures_finalize_with_best_effort_answer() {
    let sql_llm = ScriptedLlm::new(["SELECT A FROM X", "SELECT B FROM X", "SELECT C FROM X"]);
    let answer_llm = ScriptedLlm::new(["I could not retrieve the data."]);
    let executor = ScriptedExecutor::new(vec![
        Err(SqlError::Execution("ORA-00942: table or view does not exist".to_string())),
        Err(SqlError::Execution("ORA-00942: table or view does not exist".to_string())),
        Err(SqlError::Execution("ORA-00942: table or view does not exist".to_string())),
    ]);
    let agent = agent(
        sql_llm.clone(),
        answer_llm.clone(),
        executor.clone(),
        ExecutionConfig::default(),
    );

    let answer = agent.invoke("t-ceiling", "How many orders?").await.unwrap();
    assert_eq!(answer, "I could not retrieve the data.");

    let snapshot = agent.snapshot("t-ceiling").await.unwrap().unwrap();
    assert!(snapshot.is_terminal());
    assert_eq!(snapshot.node, Node::FinalizeAnswer);
    assert_eq!(snapshot.state.retry_count, 3);
    assert_eq!(snapshot.state.db_result, "");
    assert!(snapshot.state.has_error());

    assert_eq!(executor.executed().len(), 3);
    assert_eq!(sql_llm.prompts().len(), 3);
    assert!(answer_llm.prompts()[0].contains("Database Result: \n"));
}

#[tokio::test]
async fn custom_ceiling_is_respected() {
    let sql_llm = ScriptedLlm::new(["SELECT 1 FROM NOWHERE"]);
    let answer_llm = ScriptedLlm::new(["No data."]);
    let executor =
        ScriptedExecutor::new(vec![Err(SqlError::Execution("no such table".to_string()))]);
    let agent = agent(
        sql_llm.clone(),
        answer_llm,
        executor.clone(),
        ExecutionConfig::default().with_max_retries(1),
    );

    let answer = agent.invoke("t-one", "anything?").await.unwrap();
    assert_eq!(answer, "No data.");
    assert_eq!(executor.executed().len(), 1);
    assert_eq!(sql_llm.prompts().len(), 1);
}

#[tokio::test]
async fn blank_answer_is_replaced_by_marker() {
    let agent = agent(
        ScriptedLlm::new(["SELECT COUNT(*) FROM CUSTOMERS"]),
        ScriptedLlm::new(["   \n"]),
        ScriptedExecutor::new(vec![Ok(count_result(0))]),
        ExecutionConfig::default(),
    );

    let answer = agent.invoke("t-blank", "How many?").await.unwrap();
    assert_eq!(answer, ANSWER_FALLBACK);
}

#[tokio::test]
async fn unreachable_database_is_fatal_for_the_question() {
    let agent = agent(
        ScriptedLlm::new(["SELECT 1"]),
        ScriptedLlm::new(["unused"]),
        ScriptedExecutor::new(vec![Err(SqlError::Unavailable(
            "connection refused".to_string(),
        ))]),
        ExecutionConfig::default(),
    );

    let err = agent.run("t-down", "How many?").await.unwrap_err();
    match err {
        GraphError::NodeFailed { node, source } => {
            assert_eq!(node, "execute_sql");
            assert!(source.to_string().contains("connection refused"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn llm_outage_is_fatal_for_the_question() {
    let agent = agent(
        ScriptedLlm::failing("503 Service Unavailable"),
        ScriptedLlm::new(["unused"]),
        ScriptedExecutor::new(vec![]),
        ExecutionConfig::default(),
    );

    let err = agent.invoke("t-llm", "How many?").await.unwrap_err();
    assert!(matches!(err, GraphError::NodeFailed { ref node, .. } if node == "generate_sql"));
    assert!(err.to_string().contains("503 Service Unavailable"));
}

#[tokio::test]
async fn large_ceiling_still_finalizes_within_step_limit() {
    let failures = (0..25)
        .map(|_| Err(SqlError::Execution("no such column: customer_name".to_string())))
        .collect();
    let executor = ScriptedExecutor::new(failures);
    let agent = agent(
        ScriptedLlm::new(std::iter::repeat("SELECT customer_name FROM CUSTOMERS").take(25)),
        ScriptedLlm::new(["I could not find customer names."]),
        executor.clone(),
        ExecutionConfig::default().with_max_retries(25),
    );

    let answer = agent.invoke("t-ceiling", "List customer names").await.unwrap();

    assert_eq!(answer, "I could not find customer names.");
    assert_eq!(executor.executed().len(), 25);
    let snapshot = agent.snapshot("t-ceiling").await.unwrap().unwrap();
    assert_eq!(snapshot.state.retry_count, 25);
    assert!(snapshot.is_terminal());
}

#[test]
fn step_limit_too_low_for_ceiling_is_rejected_at_build() {
    let err = SqlAgent::builder()
        .schema_provider(Arc::new(StaticSchema("CUSTOMERS(ID, NAME)")))
        .executor(ScriptedExecutor::new(vec![]))
        .llm(ScriptedLlm::new(["SELECT 1"]))
        .config(ExecutionConfig {
            max_steps: Some(2),
            ..Default::default()
        })
        .build()
        .err()
        .unwrap();

    assert!(matches!(err, GraphError::Config(_)));
    assert_eq!(
        err.to_string(),
        "invalid configuration: max_steps 2 is too low for max_retries 3, need at least 8"
    );
}

#[tokio::test]
async fn new_run_on_same_thread_starts_fresh() {
    let checkpointer = Arc::new(InMemoryCheckpointer::<AgentState>::default());
    let agent = SqlAgent::builder()
        .schema_provider(Arc::new(StaticSchema("CUSTOMERS(ID, NAME)")))
        .executor(ScriptedExecutor::new(vec![
            Err(SqlError::Execution("bad column".to_string())),
            Ok(count_result(1)),
            Ok(count_result(2)),
        ]))
        .llm(ScriptedLlm::new([
            "SELECT X FROM CUSTOMERS",
            "SELECT COUNT(*) FROM CUSTOMERS",
            "first answer",
            "SELECT COUNT(*) FROM CUSTOMERS",
            "second answer",
        ]))
        .checkpointer(checkpointer)
        .build()
        .unwrap();

    assert_eq!(agent.invoke("same", "q1").await.unwrap(), "first answer");
    let RunOutcome::Completed(state) = agent.run("same", "q2").await.unwrap() else {
        panic!("expected completion");
    };
    assert_eq!(state.question, "q2");
    assert_eq!(state.retry_count, 0);
    assert_eq!(state.answer, "second answer");
}

#[tokio::test]
async fn continue_run_on_finished_thread_returns_final_state() {
    let agent = agent(
        ScriptedLlm::new(["SELECT COUNT(*) FROM CUSTOMERS"]),
        ScriptedLlm::new(["There are 7 customers."]),
        ScriptedExecutor::new(vec![Ok(count_result(7))]),
        ExecutionConfig::default(),
    );
    agent.invoke("done", "How many?").await.unwrap();

    let outcome = agent.continue_run("done").await.unwrap();
    assert_eq!(outcome.answer(), Some("There are 7 customers."));

    let missing = agent.continue_run("never-started").await.unwrap_err();
    assert!(matches!(missing, GraphError::MissingThread { .. }));
}

#[test]
fn builder_requires_collaborators() {
    let err = SqlAgent::builder().build().err().expect("missing schema");
    assert_eq!(
        err.to_string(),
        "invalid configuration: schema provider is required"
    );
}
