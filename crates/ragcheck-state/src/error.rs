//! Error types for ragcheck-state

use thiserror::Error;

use crate::schema::TaskStatus;

/// Errors returned by [`EvalStore`](crate::EvalStore) implementations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Dataset does not exist within the tenant scope
    #[error("dataset not found: {dataset_id}")]
    DatasetNotFound { dataset_id: String },

    /// Task does not exist within the tenant scope
    #[error("task not found: {task_id}")]
    TaskNotFound { task_id: String },

    /// A result for this (task, item) pair was already written
    #[error("result already recorded for task {task_id}, item {item_id}")]
    DuplicateResult { task_id: String, item_id: String },

    /// A dataset with this id already exists
    #[error("dataset already exists: {dataset_id}")]
    DuplicateDataset { dataset_id: String },

    /// Record belongs to a different tenant than the one it was written under
    #[error("tenant mismatch: record tenant {record}, scope tenant {scope}")]
    TenantMismatch { record: String, scope: String },

    /// Item set handed to `create_dataset` does not belong to the dataset
    #[error("item {item_id} does not belong to dataset {dataset_id}")]
    ForeignItem { item_id: String, dataset_id: String },

    /// Backend failure (connection, query)
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// A task status change the lifecycle does not allow.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("illegal task transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: TaskStatus,
    pub to: TaskStatus,
}

impl StorageError {
    /// Whether the error means the addressed record is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::DatasetNotFound { .. } | StorageError::TaskNotFound { .. }
        )
    }
}
