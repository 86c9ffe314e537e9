//! Engine-level error taxonomy.

use ragcheck_state::{DatasetId, StorageError, TaskId};

use crate::config::ConfigError;

/// Errors returned synchronously by [`EvaluationService`](crate::EvaluationService).
///
/// Failures inside an accepted run are never returned here; they land on the
/// task's status and error summary.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("dataset not found: {0}")]
    DatasetNotFound(DatasetId),

    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("invalid dataset: {0}")]
    InvalidDataset(String),

    #[error("invalid item at index {index}: {reason}")]
    ItemValidation { index: usize, reason: String },

    #[error("runner unavailable for agent {agent_id}: {reason}")]
    RunnerUnavailable { agent_id: String, reason: String },

    #[error("task {0} is still running")]
    TaskInProgress(TaskId),

    #[error("storage error: {0}")]
    Storage(StorageError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl From<StorageError> for EvalError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::DatasetNotFound { dataset_id } => {
                EvalError::DatasetNotFound(DatasetId(dataset_id))
            }
            StorageError::TaskNotFound { task_id } => EvalError::TaskNotFound(TaskId(task_id)),
            other => EvalError::Storage(other),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EvalError>;
