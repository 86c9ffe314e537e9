//! Evaluation service: the public operation surface.
//!
//! Synchronous operations return [`EvalError`]. `run_evaluation` persists a
//! pending task, hands the run to a detached tokio task and returns at once;
//! everything that goes wrong after that is reported on the task record.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use ragcheck_state::{
    DatasetId, DatasetItemRecord, DatasetRecord, DatasetSource, EvalStore, ItemId, ResultRecord,
    TaskId, TaskRecord, TenantId,
};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, instrument, Instrument};

use crate::config::EngineConfig;
use crate::error::{EvalError, Result};
use crate::executor::{self, RunContext};
use crate::metrics::MetricSet;
use crate::obs;
use crate::registry::RunnerRegistry;
use crate::runner::RunTarget;

/// Request body for [`EvaluationService::create_dataset`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewDataset {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub source: DatasetSource,
    pub items: Vec<NewDatasetItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewDatasetItem {
    pub query: String,
    #[serde(default)]
    pub relevant_ids: Vec<String>,
    #[serde(default)]
    pub expected_answer: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl NewDatasetItem {
    pub fn new(query: impl Into<String>, expected_answer: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            expected_answer: expected_answer.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_relevant_ids(mut self, ids: &[&str]) -> Self {
        self.relevant_ids = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    fn validate(&self, index: usize) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(EvalError::ItemValidation {
                index,
                reason: "query is empty".into(),
            });
        }
        if self.relevant_ids.iter().any(|id| id.trim().is_empty()) {
            return Err(EvalError::ItemValidation {
                index,
                reason: "relevant_ids contains a blank id".into(),
            });
        }
        Ok(())
    }
}

/// Terminal record of a run, published once by the detached run task.
type Completion = watch::Receiver<Option<TaskRecord>>;

pub struct EvaluationService {
    store: Arc<dyn EvalStore>,
    registry: Arc<RunnerRegistry>,
    metrics: Arc<MetricSet>,
    config: EngineConfig,
    active: Mutex<HashMap<TaskId, Completion>>,
}

impl EvaluationService {
    /// Build a service scoring with the standard metric set.
    pub fn new(
        store: Arc<dyn EvalStore>,
        registry: Arc<RunnerRegistry>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            registry,
            metrics: Arc::new(MetricSet::standard(config.bleu_max_order)),
            config,
            active: Mutex::new(HashMap::new()),
        })
    }

    /// Replace the metric set used by runs started after this call.
    #[must_use]
    pub fn with_metrics(mut self, metrics: MetricSet) -> Self {
        self.metrics = Arc::new(metrics);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metrics(&self) -> &MetricSet {
        &self.metrics
    }

    // -----------------------------------------------------------------------
    // Datasets
    // -----------------------------------------------------------------------

    /// Validate and persist a dataset with all of its items.
    ///
    /// Any invalid item rejects the whole dataset; nothing is written.
    #[instrument(skip_all, fields(tenant = %tenant, name = %new.name))]
    pub async fn create_dataset(&self, tenant: &TenantId, new: NewDataset) -> Result<DatasetRecord> {
        if new.name.trim().is_empty() {
            return Err(EvalError::InvalidDataset("name is empty".into()));
        }
        for (index, item) in new.items.iter().enumerate() {
            item.validate(index)?;
        }

        let dataset_id = DatasetId::new();
        let items: Vec<DatasetItemRecord> = new
            .items
            .into_iter()
            .enumerate()
            .map(|(position, item)| DatasetItemRecord {
                id: ItemId::new(),
                dataset_id: dataset_id.clone(),
                position,
                query: item.query,
                relevant_ids: item.relevant_ids,
                expected_answer: item.expected_answer,
                metadata: item.metadata,
            })
            .collect();

        let dataset = DatasetRecord::new(
            dataset_id,
            tenant.clone(),
            new.name,
            new.description,
            new.source,
            &items,
        );

        self.store.create_dataset(dataset.clone(), items).await?;
        info!(dataset_id = %dataset.id, items = dataset.item_count, "dataset created");
        Ok(dataset)
    }

    pub async fn get_dataset(
        &self,
        tenant: &TenantId,
        dataset_id: &DatasetId,
    ) -> Result<DatasetRecord> {
        Ok(self.store.get_dataset(tenant, dataset_id).await?)
    }

    pub async fn list_datasets(&self, tenant: &TenantId) -> Result<Vec<DatasetRecord>> {
        Ok(self.store.list_datasets(tenant).await?)
    }

    /// Items of a dataset in position order.
    pub async fn get_dataset_items(
        &self,
        tenant: &TenantId,
        dataset_id: &DatasetId,
    ) -> Result<Vec<DatasetItemRecord>> {
        Ok(self.store.list_dataset_items(tenant, dataset_id).await?)
    }

    #[instrument(skip_all, fields(tenant = %tenant, dataset_id = %dataset_id))]
    pub async fn delete_dataset(&self, tenant: &TenantId, dataset_id: &DatasetId) -> Result<()> {
        self.store.delete_dataset(tenant, dataset_id).await?;
        info!("dataset deleted");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    /// Start evaluating `dataset_id` against `target` and return the pending task.
    ///
    /// The run continues in the background even if the caller's future is
    /// dropped. Poll [`get_task`](Self::get_task) or await
    /// [`wait_for_task`](Self::wait_for_task) for the outcome.
    #[instrument(skip_all, fields(tenant = %tenant, dataset_id = %dataset_id, agent_id = %target.agent_id))]
    pub async fn run_evaluation(
        &self,
        tenant: &TenantId,
        dataset_id: &DatasetId,
        target: RunTarget,
    ) -> Result<TaskRecord> {
        let dataset = self.store.get_dataset(tenant, dataset_id).await?;
        let items = self.store.list_dataset_items(tenant, &dataset.id).await?;

        let runner = self
            .registry
            .get_or_create(&target.agent_id)
            .await
            .map_err(|e| EvalError::RunnerUnavailable {
                agent_id: target.agent_id.clone(),
                reason: e.to_string(),
            })?;

        let task = TaskRecord::new(
            tenant.clone(),
            dataset.id,
            target.agent_id,
            target.knowledge_scope,
            items.len(),
        );
        self.store.upsert_task(&task).await?;

        let ctx = RunContext {
            store: Arc::clone(&self.store),
            runner,
            metrics: Arc::clone(&self.metrics),
            config: self.config.clone(),
        };
        let (done_tx, done_rx) = watch::channel(None);
        let span = obs::task_span(task.id.as_str());
        let run = executor::execute(ctx, task.clone(), items.into());
        tokio::spawn(
            async move {
                let finished = run.await;
                let _ = done_tx.send(Some(finished));
            }
            .instrument(span),
        );

        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        active.retain(|_, done| is_executing(done));
        active.insert(task.id.clone(), done_rx);
        drop(active);

        info!(task_id = %task.id, total_items = task.total_items, "evaluation accepted");
        Ok(task)
    }

    pub async fn get_task(&self, tenant: &TenantId, task_id: &TaskId) -> Result<TaskRecord> {
        Ok(self.store.get_task(tenant, task_id).await?)
    }

    /// Tasks of a tenant, newest first, optionally for one dataset only.
    pub async fn list_tasks(
        &self,
        tenant: &TenantId,
        dataset_id: Option<&DatasetId>,
    ) -> Result<Vec<TaskRecord>> {
        Ok(self.store.list_tasks(tenant, dataset_id).await?)
    }

    /// Per-item results written so far. Readable while the task is running.
    pub async fn get_task_results(
        &self,
        tenant: &TenantId,
        task_id: &TaskId,
    ) -> Result<Vec<ResultRecord>> {
        self.store.get_task(tenant, task_id).await?;
        Ok(self.store.list_results(tenant, task_id).await?)
    }

    /// Delete a task and its results. Rejected while the run is executing.
    #[instrument(skip_all, fields(tenant = %tenant, task_id = %task_id))]
    pub async fn delete_task(&self, tenant: &TenantId, task_id: &TaskId) -> Result<()> {
        self.store.get_task(tenant, task_id).await?;
        if self.is_running(task_id) {
            return Err(EvalError::TaskInProgress(task_id.clone()));
        }
        self.store.delete_task(tenant, task_id).await?;
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(task_id);
        info!("task deleted");
        Ok(())
    }

    /// Wait until a run started by this service reaches a terminal state.
    ///
    /// For tasks this service is not tracking, returns the stored record.
    pub async fn wait_for_task(&self, tenant: &TenantId, task_id: &TaskId) -> Result<TaskRecord> {
        self.store.get_task(tenant, task_id).await?;

        let done = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(task_id)
            .cloned();
        if let Some(mut done) = done {
            let finished = done
                .wait_for(Option::is_some)
                .await
                .ok()
                .and_then(|task| (*task).clone());
            if let Some(task) = finished {
                return Ok(task);
            }
        }
        self.get_task(tenant, task_id).await
    }

    /// Whether a run started by this service is still executing.
    pub fn is_running(&self, task_id: &TaskId) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(task_id)
            .is_some_and(is_executing)
    }
}

fn is_executing(done: &Completion) -> bool {
    // A closed channel without a value means the run task died.
    done.borrow().is_none() && done.has_changed().is_ok()
}
