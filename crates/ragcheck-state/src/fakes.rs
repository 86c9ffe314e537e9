//! In-memory `EvalStore`
//!
//! Provides `MemoryEvalStore`, which satisfies the full store contract
//! without any external dependencies. Used by tests and by the CLI for
//! offline runs.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use crate::error::StorageError;
use crate::schema::*;
use crate::storage_traits::*;

#[derive(Debug, Default)]
struct Tables {
    datasets: HashMap<DatasetId, DatasetRecord>,
    items: HashMap<DatasetId, Vec<DatasetItemRecord>>,
    tasks: HashMap<TaskId, TaskRecord>,
    results: HashMap<TaskId, Vec<ResultRecord>>,
}

/// In-memory store. One lock guards every table so multi-table writes
/// (dataset + items, cascading deletes) are atomic.
#[derive(Debug, Default)]
pub struct MemoryEvalStore {
    tables: Mutex<Tables>,
}

impl MemoryEvalStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        // A panic while holding the lock cannot leave a half-applied write:
        // every mutation below validates first and mutates last.
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn dataset_in_scope<'a>(
    tables: &'a Tables,
    tenant: &TenantId,
    dataset_id: &DatasetId,
) -> StorageResult<&'a DatasetRecord> {
    tables
        .datasets
        .get(dataset_id)
        .filter(|d| &d.tenant_id == tenant)
        .ok_or_else(|| StorageError::DatasetNotFound {
            dataset_id: dataset_id.to_string(),
        })
}

fn task_in_scope<'a>(
    tables: &'a Tables,
    tenant: &TenantId,
    task_id: &TaskId,
) -> StorageResult<&'a TaskRecord> {
    tables
        .tasks
        .get(task_id)
        .filter(|t| &t.tenant_id == tenant)
        .ok_or_else(|| StorageError::TaskNotFound {
            task_id: task_id.to_string(),
        })
}

#[async_trait]
impl EvalStore for MemoryEvalStore {
    async fn create_dataset(
        &self,
        dataset: DatasetRecord,
        mut items: Vec<DatasetItemRecord>,
    ) -> StorageResult<()> {
        if let Some(foreign) = items.iter().find(|i| i.dataset_id != dataset.id) {
            return Err(StorageError::ForeignItem {
                item_id: foreign.id.to_string(),
                dataset_id: dataset.id.to_string(),
            });
        }
        items.sort_by_key(|i| i.position);

        let mut tables = self.tables();
        if tables.datasets.contains_key(&dataset.id) {
            return Err(StorageError::DuplicateDataset {
                dataset_id: dataset.id.to_string(),
            });
        }
        debug!(dataset_id = %dataset.id, items = items.len(), "dataset created");
        tables.items.insert(dataset.id.clone(), items);
        tables.datasets.insert(dataset.id.clone(), dataset);
        Ok(())
    }

    async fn get_dataset(
        &self,
        tenant: &TenantId,
        dataset_id: &DatasetId,
    ) -> StorageResult<DatasetRecord> {
        let tables = self.tables();
        dataset_in_scope(&tables, tenant, dataset_id).cloned()
    }

    async fn list_datasets(&self, tenant: &TenantId) -> StorageResult<Vec<DatasetRecord>> {
        let tables = self.tables();
        let mut datasets: Vec<DatasetRecord> = tables
            .datasets
            .values()
            .filter(|d| &d.tenant_id == tenant)
            .cloned()
            .collect();
        datasets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(datasets)
    }

    async fn list_dataset_items(
        &self,
        tenant: &TenantId,
        dataset_id: &DatasetId,
    ) -> StorageResult<Vec<DatasetItemRecord>> {
        let tables = self.tables();
        dataset_in_scope(&tables, tenant, dataset_id)?;
        Ok(tables.items.get(dataset_id).cloned().unwrap_or_default())
    }

    async fn delete_dataset(
        &self,
        tenant: &TenantId,
        dataset_id: &DatasetId,
    ) -> StorageResult<()> {
        let mut tables = self.tables();
        dataset_in_scope(&tables, tenant, dataset_id)?;
        tables.items.remove(dataset_id);
        tables.datasets.remove(dataset_id);
        debug!(dataset_id = %dataset_id, "dataset deleted");
        Ok(())
    }

    async fn upsert_task(&self, task: &TaskRecord) -> StorageResult<()> {
        let mut tables = self.tables();
        if let Some(existing) = tables.tasks.get(&task.id) {
            if existing.tenant_id != task.tenant_id {
                return Err(StorageError::TenantMismatch {
                    record: existing.tenant_id.to_string(),
                    scope: task.tenant_id.to_string(),
                });
            }
        }
        tables.tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn get_task(&self, tenant: &TenantId, task_id: &TaskId) -> StorageResult<TaskRecord> {
        let tables = self.tables();
        task_in_scope(&tables, tenant, task_id).cloned()
    }

    async fn list_tasks(
        &self,
        tenant: &TenantId,
        dataset_id: Option<&DatasetId>,
    ) -> StorageResult<Vec<TaskRecord>> {
        let tables = self.tables();
        let mut tasks: Vec<TaskRecord> = tables
            .tasks
            .values()
            .filter(|t| &t.tenant_id == tenant)
            .filter(|t| dataset_id.map(|d| &t.dataset_id == d).unwrap_or(true))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks)
    }

    async fn delete_task(&self, tenant: &TenantId, task_id: &TaskId) -> StorageResult<()> {
        let mut tables = self.tables();
        task_in_scope(&tables, tenant, task_id)?;
        tables.results.remove(task_id);
        tables.tasks.remove(task_id);
        debug!(task_id = %task_id, "task deleted");
        Ok(())
    }

    async fn insert_result(&self, result: &ResultRecord) -> StorageResult<()> {
        let mut tables = self.tables();
        task_in_scope(&tables, &result.tenant_id, &result.task_id)?;
        let results = tables.results.entry(result.task_id.clone()).or_default();
        if results.iter().any(|r| r.item_id == result.item_id) {
            return Err(StorageError::DuplicateResult {
                task_id: result.task_id.to_string(),
                item_id: result.item_id.to_string(),
            });
        }
        results.push(result.clone());
        Ok(())
    }

    async fn list_results(
        &self,
        tenant: &TenantId,
        task_id: &TaskId,
    ) -> StorageResult<Vec<ResultRecord>> {
        let tables = self.tables();
        task_in_scope(&tables, tenant, task_id)?;
        Ok(tables.results.get(task_id).cloned().unwrap_or_default())
    }
}
