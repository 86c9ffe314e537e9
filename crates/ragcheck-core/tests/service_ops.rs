//! Evaluation service tests: dataset CRUD, validation, tenant isolation and
//! the asynchronous run lifecycle.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ragcheck_core::{
    EngineConfig, EvalError, EvaluationService, NewDataset, NewDatasetItem, RunTarget, Runner,
    RunnerError, RunnerFactory, RunnerOutput, RunnerRegistry,
};
use ragcheck_state::{DatasetId, MemoryEvalStore, TaskId, TaskStatus, TenantId};
use tokio::sync::Semaphore;

fn tenant() -> TenantId {
    TenantId::new("tenant-a")
}

fn other_tenant() -> TenantId {
    TenantId::new("tenant-b")
}

fn dataset(n: usize) -> NewDataset {
    NewDataset {
        name: "faq".to_string(),
        description: "support questions".to_string(),
        items: (0..n)
            .map(|i| {
                NewDatasetItem::new(format!("question {i}"), "the cat sat on the mat")
                    .with_relevant_ids(&["d1", "d2"])
            })
            .collect(),
        ..NewDataset::default()
    }
}

/// Echoes the expected answer; optionally blocks until the gate opens.
struct EchoRunner {
    gate: Option<Arc<Semaphore>>,
    scopes: Mutex<Vec<Vec<String>>>,
}

impl EchoRunner {
    fn new() -> Self {
        Self {
            gate: None,
            scopes: Mutex::new(Vec::new()),
        }
    }

    fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            scopes: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Runner for EchoRunner {
    async fn run(&self, _query: &str, scope: &[String]) -> Result<RunnerOutput, RunnerError> {
        self.scopes.lock().unwrap().push(scope.to_vec());
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        Ok(RunnerOutput {
            retrieved_ids: vec!["d1".to_string(), "d2".to_string()],
            generated_text: "the cat sat on the mat".to_string(),
        })
    }
}

async fn service_with(runner: Arc<dyn Runner>) -> EvaluationService {
    let registry = RunnerRegistry::fixed();
    registry.insert("agent-1", runner).await;
    EvaluationService::new(
        Arc::new(MemoryEvalStore::new()),
        Arc::new(registry),
        EngineConfig::default(),
    )
    .unwrap()
}

// ---------------------------------------------------------------------------
// Datasets
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_and_read_dataset() {
    let svc = service_with(Arc::new(EchoRunner::new())).await;

    let ds = svc.create_dataset(&tenant(), dataset(3)).await.unwrap();
    assert_eq!(ds.item_count, 3);
    assert_eq!(ds.version, 1);
    assert_eq!(ds.content_digest.len(), 64);

    let fetched = svc.get_dataset(&tenant(), &ds.id).await.unwrap();
    assert_eq!(fetched, ds);

    let items = svc.get_dataset_items(&tenant(), &ds.id).await.unwrap();
    assert_eq!(items.len(), 3);
    for (i, item) in items.iter().enumerate() {
        assert_eq!(item.position, i);
        assert_eq!(item.query, format!("question {i}"));
        assert_eq!(item.dataset_id, ds.id);
    }

    let listed = svc.list_datasets(&tenant()).await.unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn invalid_items_reject_the_whole_dataset() {
    let svc = service_with(Arc::new(EchoRunner::new())).await;

    let mut bad_query = dataset(3);
    bad_query.items[1].query = "   ".to_string();
    let err = svc.create_dataset(&tenant(), bad_query).await.unwrap_err();
    assert!(matches!(err, EvalError::ItemValidation { index: 1, .. }));

    let mut bad_id = dataset(2);
    bad_id.items[0].relevant_ids.push(String::new());
    let err = svc.create_dataset(&tenant(), bad_id).await.unwrap_err();
    assert!(matches!(err, EvalError::ItemValidation { index: 0, .. }));

    let mut unnamed = dataset(1);
    unnamed.name = String::new();
    let err = svc.create_dataset(&tenant(), unnamed).await.unwrap_err();
    assert!(matches!(err, EvalError::InvalidDataset(_)));

    assert!(svc.list_datasets(&tenant()).await.unwrap().is_empty());
}

#[tokio::test]
async fn datasets_are_tenant_scoped() {
    let svc = service_with(Arc::new(EchoRunner::new())).await;
    let ds = svc.create_dataset(&tenant(), dataset(1)).await.unwrap();

    let err = svc.get_dataset(&other_tenant(), &ds.id).await.unwrap_err();
    assert!(matches!(err, EvalError::DatasetNotFound(_)));
    assert!(svc.list_datasets(&other_tenant()).await.unwrap().is_empty());
    assert!(svc
        .run_evaluation(&other_tenant(), &ds.id, RunTarget::agent("agent-1"))
        .await
        .is_err());
}

#[tokio::test]
async fn delete_dataset_removes_items() {
    let svc = service_with(Arc::new(EchoRunner::new())).await;
    let ds = svc.create_dataset(&tenant(), dataset(2)).await.unwrap();

    svc.delete_dataset(&tenant(), &ds.id).await.unwrap();

    assert!(matches!(
        svc.get_dataset(&tenant(), &ds.id).await,
        Err(EvalError::DatasetNotFound(_))
    ));
    assert!(matches!(
        svc.get_dataset_items(&tenant(), &ds.id).await,
        Err(EvalError::DatasetNotFound(_))
    ));
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn run_returns_pending_task_and_completes_in_background() {
    let runner = Arc::new(EchoRunner::new());
    let svc = service_with(runner.clone()).await;
    let ds = svc.create_dataset(&tenant(), dataset(4)).await.unwrap();

    let target = RunTarget::agent("agent-1").with_knowledge_scope(vec!["kb-support".into()]);
    let task = svc.run_evaluation(&tenant(), &ds.id, target).await.unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.progress, 0);
    assert_eq!(task.total_items, 4);

    let done = svc.wait_for_task(&tenant(), &task.id).await.unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.progress, 100);
    assert!(done.started_at.is_some());
    assert!(done.completed_at.is_some());
    assert_eq!(done.avg_metrics["recall"], 1.0);
    assert_eq!(done.avg_metrics["rougeL"], 1.0);

    let stored = svc.get_task(&tenant(), &task.id).await.unwrap();
    assert_eq!(stored.status, TaskStatus::Completed);

    let results = svc.get_task_results(&tenant(), &task.id).await.unwrap();
    assert_eq!(results.len(), 4);

    let scopes = runner.scopes.lock().unwrap();
    assert_eq!(scopes.len(), 4);
    assert!(scopes.iter().all(|s| s == &vec!["kb-support".to_string()]));
}

#[tokio::test]
async fn list_tasks_filters_by_dataset() {
    let svc = service_with(Arc::new(EchoRunner::new())).await;
    let a = svc.create_dataset(&tenant(), dataset(1)).await.unwrap();
    let b = svc.create_dataset(&tenant(), dataset(1)).await.unwrap();

    let ta = svc
        .run_evaluation(&tenant(), &a.id, RunTarget::agent("agent-1"))
        .await
        .unwrap();
    let tb = svc
        .run_evaluation(&tenant(), &b.id, RunTarget::agent("agent-1"))
        .await
        .unwrap();
    svc.wait_for_task(&tenant(), &ta.id).await.unwrap();
    svc.wait_for_task(&tenant(), &tb.id).await.unwrap();

    assert_eq!(svc.list_tasks(&tenant(), None).await.unwrap().len(), 2);
    let only_a = svc.list_tasks(&tenant(), Some(&a.id)).await.unwrap();
    assert_eq!(only_a.len(), 1);
    assert_eq!(only_a[0].id, ta.id);
    assert!(svc.list_tasks(&other_tenant(), None).await.unwrap().is_empty());
}

#[tokio::test]
async fn run_on_missing_dataset_is_rejected() {
    let svc = service_with(Arc::new(EchoRunner::new())).await;
    let err = svc
        .run_evaluation(&tenant(), &DatasetId::from("nope"), RunTarget::agent("agent-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, EvalError::DatasetNotFound(_)));
}

#[tokio::test]
async fn unknown_agent_is_rejected_without_creating_a_task() {
    let svc = service_with(Arc::new(EchoRunner::new())).await;
    let ds = svc.create_dataset(&tenant(), dataset(1)).await.unwrap();

    let err = svc
        .run_evaluation(&tenant(), &ds.id, RunTarget::agent("ghost"))
        .await
        .unwrap_err();
    assert!(matches!(err, EvalError::RunnerUnavailable { ref agent_id, .. } if agent_id == "ghost"));
    assert!(svc.list_tasks(&tenant(), None).await.unwrap().is_empty());
}

#[tokio::test]
async fn running_task_cannot_be_deleted() {
    let gate = Arc::new(Semaphore::new(0));
    let svc = service_with(Arc::new(EchoRunner::gated(Arc::clone(&gate)))).await;
    let ds = svc.create_dataset(&tenant(), dataset(2)).await.unwrap();

    let task = svc
        .run_evaluation(&tenant(), &ds.id, RunTarget::agent("agent-1"))
        .await
        .unwrap();
    assert!(svc.is_running(&task.id));

    let err = svc.delete_task(&tenant(), &task.id).await.unwrap_err();
    assert!(matches!(err, EvalError::TaskInProgress(_)));

    // Results already written stay readable while the run is live.
    assert!(svc.get_task_results(&tenant(), &task.id).await.is_ok());

    gate.add_permits(2);
    let done = svc.wait_for_task(&tenant(), &task.id).await.unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert!(!svc.is_running(&task.id));

    svc.delete_task(&tenant(), &task.id).await.unwrap();
    assert!(matches!(
        svc.get_task(&tenant(), &task.id).await,
        Err(EvalError::TaskNotFound(_))
    ));
    assert!(matches!(
        svc.get_task_results(&tenant(), &task.id).await,
        Err(EvalError::TaskNotFound(_))
    ));
}

#[tokio::test]
async fn task_reads_are_tenant_scoped() {
    let svc = service_with(Arc::new(EchoRunner::new())).await;
    let ds = svc.create_dataset(&tenant(), dataset(1)).await.unwrap();
    let task = svc
        .run_evaluation(&tenant(), &ds.id, RunTarget::agent("agent-1"))
        .await
        .unwrap();
    svc.wait_for_task(&tenant(), &task.id).await.unwrap();

    assert!(matches!(
        svc.get_task(&other_tenant(), &task.id).await,
        Err(EvalError::TaskNotFound(_))
    ));
    assert!(matches!(
        svc.wait_for_task(&other_tenant(), &task.id).await,
        Err(EvalError::TaskNotFound(_))
    ));
    assert!(matches!(
        svc.delete_task(&other_tenant(), &task.id).await,
        Err(EvalError::TaskNotFound(_))
    ));
    assert!(matches!(
        svc.get_task(&tenant(), &TaskId::from("missing")).await,
        Err(EvalError::TaskNotFound(_))
    ));
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let err = EvaluationService::new(
        Arc::new(MemoryEvalStore::new()),
        Arc::new(RunnerRegistry::fixed()),
        EngineConfig::default().with_max_concurrency(0),
    )
    .err()
    .unwrap();
    assert!(matches!(err, EvalError::Config(_)));
}

#[derive(Default)]
struct CountingFactory {
    created: AtomicUsize,
}

#[async_trait]
impl RunnerFactory for CountingFactory {
    async fn create(&self, _agent_id: &str) -> Result<Arc<dyn Runner>, RunnerError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(EchoRunner::new()))
    }
}

#[tokio::test]
async fn registry_creates_each_agent_runner_once() {
    let factory = Arc::new(CountingFactory::default());
    let svc = EvaluationService::new(
        Arc::new(MemoryEvalStore::new()),
        Arc::new(RunnerRegistry::new(factory.clone())),
        EngineConfig::default(),
    )
    .unwrap();
    let ds = svc.create_dataset(&tenant(), dataset(1)).await.unwrap();

    for _ in 0..3 {
        let task = svc
            .run_evaluation(&tenant(), &ds.id, RunTarget::agent("agent-x"))
            .await
            .unwrap();
        svc.wait_for_task(&tenant(), &task.id).await.unwrap();
    }
    assert_eq!(factory.created.load(Ordering::SeqCst), 1);
}
