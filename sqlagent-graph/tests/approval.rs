use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use sqlagent_core::{
    AgentError, Checkpointer, Llm, LlmRequest, LlmResponse, QueryResult, SchemaProvider, SqlError,
    SqlExecutor, SqlValue,
};
use sqlagent_graph::{
    AgentState, AnswerSynthesizer, ApprovalDecision, ApprovalHandler, ExecutionConfig,
    FileCheckpointer, GraphError, Node, PendingApproval, RunOutcome, SqlAgent, SqlGenerator,
};

struct ScriptedLlm {
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    fn new<I: IntoIterator<Item = &'static str>>(responses: I) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().map(str::to_string).collect()),
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
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .map(|content| LlmResponse { content })
            .ok_or_else(|| AgentError::LlmProvider("script exhausted".to_string()))
    }
}

struct StaticSchema;

#[async_trait::async_trait]
impl SchemaProvider for StaticSchema {
    async fn schema(&self) -> Result<String, SqlError> {
        Ok("ORDERS(ID, CUSTOMER_ID, TOTAL)".to_string())
    }
}

#[derive(Default)]
struct CountingExecutor {
    executed: Mutex<Vec<String>>,
}

impl CountingExecutor {
    fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl SqlExecutor for CountingExecutor {
    async fn execute(&self, sql: &str) -> Result<QueryResult, SqlError> {
        self.executed.lock().unwrap().push(sql.to_string());
        Ok(QueryResult::new(
            vec!["COUNT(*)".to_string()],
            vec![vec![SqlValue::Integer(12)]],
        ))
    }
}

struct ScriptedReviewer {
    decisions: Mutex<VecDeque<ApprovalDecision>>,
    seen: Mutex<Vec<PendingApproval>>,
}

impl ScriptedReviewer {
    fn new(decisions: Vec<ApprovalDecision>) -> Self {
        Self {
            decisions: Mutex::new(decisions.into()),
            seen: Mutex::default(),
        }
    }
}

#[async_trait::async_trait]
impl ApprovalHandler for ScriptedReviewer {
    async fn decide(&self, pending: &PendingApproval) -> Result<ApprovalDecision, AgentError> {
        self.seen.lock().unwrap().push(pending.clone());
        self.decisions
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AgentError::Approval("reviewer has no more decisions".to_string()))
    }
}

struct Harness {
    agent: SqlAgent,
    sql_llm: Arc<ScriptedLlm>,
    executor: Arc<CountingExecutor>,
}

fn harness(
    sql: &[&'static str],
    answers: &[&'static str],
    checkpointer: Option<Arc<dyn Checkpointer<AgentState>>>,
) -> Harness {
    let sql_llm = ScriptedLlm::new(sql.iter().copied());
    let executor = Arc::new(CountingExecutor::default());
    let mut builder = SqlAgent::builder()
        .schema_provider(Arc::new(StaticSchema))
        .executor(executor.clone())
        .sql_generator(SqlGenerator::new(sql_llm.clone()))
        .answer_synthesizer(AnswerSynthesizer::new(ScriptedLlm::new(
            answers.iter().copied(),
        )))
        .config(ExecutionConfig::default().with_approval(true));
    if let Some(checkpointer) = checkpointer {
        builder = builder.checkpointer(checkpointer);
    }
    Harness {
        agent: builder.build().unwrap(),
        sql_llm,
        executor,
    }
}

fn pending(outcome: RunOutcome) -> PendingApproval {
    match outcome {
        RunOutcome::AwaitingApproval(pending) => pending,
        other => panic!("expected a suspended run, got {other:?}"),
    }
}

#[tokio::test]
async fn run_suspends_before_execution() {
    let h = harness(&["SELECT COUNT(*) FROM ORDERS;"], &[], None);

    let pending = pending(h.agent.run("t1", "How many orders?").await.unwrap());
    assert_eq!(pending.thread_id, "t1");
    assert_eq!(pending.question, "How many orders?");
    assert_eq!(pending.sql_query, "SELECT COUNT(*) FROM ORDERS");
    assert_eq!(pending.retry_count, 0);
    assert!(h.executor.executed().is_empty());

    let snapshot = h.agent.snapshot("t1").await.unwrap().unwrap();
    assert_eq!(snapshot.node, Node::GenerateSql);
    assert_eq!(snapshot.next, Some(Node::ExecuteSql));
    assert!(snapshot.is_awaiting_execution());
}

#[tokio::test]
async fn approval_executes_the_pending_query() {
    let h = harness(&["SELECT COUNT(*) FROM ORDERS"], &["There are 12 orders."], None);
    h.agent.run("t2", "How many orders?").await.unwrap();

    let outcome = h.agent.resume("t2", ApprovalDecision::Approve).await.unwrap();
    assert_eq!(outcome.answer(), Some("There are 12 orders."));
    assert_eq!(h.executor.executed(), vec!["SELECT COUNT(*) FROM ORDERS"]);

    let snapshot = h.agent.snapshot("t2").await.unwrap().unwrap();
    assert!(snapshot.is_terminal());
    assert_eq!(snapshot.state.retry_count, 0);
    assert_eq!(snapshot.state.db_result, "[(12,)]");
}

#[tokio::test]
async fn rejection_feeds_back_into_exactly_one_regeneration() {
    let h = harness(
        &["SELECT COUNT(*) FROM SALES", "SELECT COUNT(*) FROM ORDERS"],
        &[],
        None,
    );
    h.agent.run("t3", "How many orders?").await.unwrap();

    let outcome = h
        .agent
        .resume("t3", ApprovalDecision::reject("use table ORDERS instead"))
        .await
        .unwrap();

    let pending = pending(outcome);
    assert_eq!(pending.sql_query, "SELECT COUNT(*) FROM ORDERS");
    assert_eq!(pending.retry_count, 1);
    assert!(h.executor.executed().is_empty());

    let prompts = h.sql_llm.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1]
        .contains("PREVIOUS ERROR: Human Rejected SQL. Feedback: use table ORDERS instead"));

    let snapshot = h.agent.snapshot("t3").await.unwrap().unwrap();
    assert_eq!(
        snapshot.state.error.as_deref(),
        Some("Human Rejected SQL. Feedback: use table ORDERS instead")
    );
    assert_eq!(snapshot.state.retry_count, 1);
}

#[tokio::test]
async fn rejections_share_the_retry_ceiling() {
    let h = harness(
        &["SELECT 1", "SELECT 2", "SELECT 3"],
        &["I could not produce an approved query."],
        None,
    );
    h.agent.run("t4", "How many orders?").await.unwrap();
    h.agent
        .resume("t4", ApprovalDecision::reject("no"))
        .await
        .unwrap();
    h.agent
        .resume("t4", ApprovalDecision::reject("still no"))
        .await
        .unwrap();

    let outcome = h
        .agent
        .resume("t4", ApprovalDecision::reject("absolutely not"))
        .await
        .unwrap();

    let RunOutcome::Completed(state) = outcome else {
        panic!("expected the ceiling to finalize the run");
    };
    assert_eq!(state.retry_count, 3);
    assert_eq!(state.answer, "I could not produce an approved query.");
    assert_eq!(state.db_result, "");
    assert!(h.executor.executed().is_empty());
    assert_eq!(h.sql_llm.prompts().len(), 3);
}

#[tokio::test]
async fn resume_requires_a_pending_approval() {
    let h = harness(&["SELECT COUNT(*) FROM ORDERS"], &["12 orders."], None);

    let missing = h
        .agent
        .resume("nobody", ApprovalDecision::Approve)
        .await
        .unwrap_err();
    assert!(matches!(missing, GraphError::MissingThread { .. }));

    h.agent.run("t5", "How many orders?").await.unwrap();
    h.agent.resume("t5", ApprovalDecision::Approve).await.unwrap();

    let finished = h
        .agent
        .resume("t5", ApprovalDecision::Approve)
        .await
        .unwrap_err();
    assert!(matches!(finished, GraphError::NoPendingApproval { .. }));
}

#[tokio::test]
async fn invoke_reports_interruption() {
    let h = harness(&["SELECT COUNT(*) FROM ORDERS"], &[], None);
    let err = h.agent.invoke("t6", "How many orders?").await.unwrap_err();
    assert!(matches!(err, GraphError::Interrupted));
    assert!(h.agent.snapshot("t6").await.unwrap().is_some());
}

#[tokio::test]
async fn continue_run_reports_the_same_pending_query() {
    let h = harness(&["SELECT COUNT(*) FROM ORDERS"], &[], None);
    let first = pending(h.agent.run("t7", "How many orders?").await.unwrap());

    let again = pending(h.agent.continue_run("t7").await.unwrap());
    assert_eq!(first, again);
    assert_eq!(h.sql_llm.prompts().len(), 1);
}

#[tokio::test]
async fn suspended_run_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn Checkpointer<AgentState>> = Arc::new(FileCheckpointer::new(dir.path()));

    let before = harness(&["SELECT COUNT(*) FROM ORDERS"], &[], Some(store.clone()));
    pending(before.agent.run("batch_question_1", "How many orders?").await.unwrap());
    drop(before);

    let store: Arc<dyn Checkpointer<AgentState>> = Arc::new(FileCheckpointer::new(dir.path()));
    let after = harness(&[], &["There are 12 orders."], Some(store));
    let outcome = after
        .agent
        .resume("batch_question_1", ApprovalDecision::Approve)
        .await
        .unwrap();

    assert_eq!(outcome.answer(), Some("There are 12 orders."));
    assert_eq!(after.executor.executed(), vec!["SELECT COUNT(*) FROM ORDERS"]);
    assert!(after.sql_llm.prompts().is_empty());
}

#[tokio::test]
async fn run_with_approval_settles_every_checkpoint() {
    let h = harness(
        &["SELECT * FROM ORDERS", "SELECT COUNT(*) FROM ORDERS"],
        &["There are 12 orders."],
        None,
    );
    let reviewer = ScriptedReviewer::new(vec![
        ApprovalDecision::reject("only the count please"),
        ApprovalDecision::Approve,
    ]);

    let state = h
        .agent
        .run_with_approval("t8", "How many orders?", &reviewer)
        .await
        .unwrap();

    assert_eq!(state.answer, "There are 12 orders.");
    assert_eq!(state.retry_count, 1);
    assert_eq!(state.error, None);

    let seen = reviewer.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].sql_query, "SELECT * FROM ORDERS");
    assert_eq!(seen[1].sql_query, "SELECT COUNT(*) FROM ORDERS");
    assert_eq!(seen[1].retry_count, 1);
}

#[tokio::test]
async fn reviewer_failure_surfaces_as_approval_error() {
    let h = harness(&["SELECT COUNT(*) FROM ORDERS"], &[], None);
    let reviewer = ScriptedReviewer::new(Vec::new());

    let err = h
        .agent
        .run_with_approval("t9", "How many orders?", &reviewer)
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::Approval(ref message) if message.contains("no more decisions")));
}
