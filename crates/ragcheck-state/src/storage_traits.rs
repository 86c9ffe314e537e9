//! Storage trait definitions for ragcheck
//!
//! `EvalStore` is the single persistence contract the engine depends on:
//! datasets with their items, evaluation tasks, and per-item results, all
//! scoped by tenant.
//!
//! The trait is async and backend-agnostic. An in-memory implementation is
//! provided in the `fakes` module.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::schema::{
    DatasetId, DatasetItemRecord, DatasetRecord, ResultRecord, TaskId, TaskRecord, TenantId,
};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Tenant-scoped persistence for datasets, tasks and results.
///
/// Guarantees:
/// - `create_dataset` is atomic: either the dataset and every item become
///   visible together, or nothing does.
/// - Reads after a successful write within a tenant observe that write.
/// - `delete_dataset` / `delete_task` remove dependent items/results before
///   the parent row, without exposing a parent with missing children.
/// - `upsert_task` is an idempotent write keyed by task id.
/// - `insert_result` accepts at most one result per (task, item).
/// - Records are never visible across tenants.
#[async_trait]
pub trait EvalStore: Send + Sync {
    /// Persist a dataset together with all of its items.
    async fn create_dataset(
        &self,
        dataset: DatasetRecord,
        items: Vec<DatasetItemRecord>,
    ) -> StorageResult<()>;

    /// Fetch a dataset. Returns `StorageError::DatasetNotFound` if absent.
    async fn get_dataset(
        &self,
        tenant: &TenantId,
        dataset_id: &DatasetId,
    ) -> StorageResult<DatasetRecord>;

    /// List datasets for a tenant, newest first.
    async fn list_datasets(&self, tenant: &TenantId) -> StorageResult<Vec<DatasetRecord>>;

    /// List a dataset's items ordered by position.
    async fn list_dataset_items(
        &self,
        tenant: &TenantId,
        dataset_id: &DatasetId,
    ) -> StorageResult<Vec<DatasetItemRecord>>;

    /// Delete a dataset and its items.
    async fn delete_dataset(&self, tenant: &TenantId, dataset_id: &DatasetId)
        -> StorageResult<()>;

    /// Insert or replace a task row.
    async fn upsert_task(&self, task: &TaskRecord) -> StorageResult<()>;

    /// Fetch a task. Returns `StorageError::TaskNotFound` if absent.
    async fn get_task(&self, tenant: &TenantId, task_id: &TaskId) -> StorageResult<TaskRecord>;

    /// List tasks for a tenant, optionally restricted to one dataset, newest first.
    async fn list_tasks(
        &self,
        tenant: &TenantId,
        dataset_id: Option<&DatasetId>,
    ) -> StorageResult<Vec<TaskRecord>>;

    /// Delete a task and its results.
    async fn delete_task(&self, tenant: &TenantId, task_id: &TaskId) -> StorageResult<()>;

    /// Write a result. Fails with `DuplicateResult` if the (task, item) pair
    /// already has one, or `TaskNotFound` if the task does not exist.
    async fn insert_result(&self, result: &ResultRecord) -> StorageResult<()>;

    /// List all results of a task.
    async fn list_results(
        &self,
        tenant: &TenantId,
        task_id: &TaskId,
    ) -> StorageResult<Vec<ResultRecord>>;
}
