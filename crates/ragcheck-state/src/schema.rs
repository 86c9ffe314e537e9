//! Record definitions for ragcheck persistence
//!
//! Tables:
//! - datasets: Named collections of evaluation cases
//! - dataset_items: Ground-truth cases owned by a dataset
//! - tasks: One evaluation run of a dataset against an agent
//! - results: Per-item outcome of a task (write-once)

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::InvalidTransition;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a new random id
            pub fn new() -> Self {
                $name(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }
    };
}

record_id!(
    /// Unique identifier for a dataset
    DatasetId
);
record_id!(
    /// Unique identifier for a dataset item
    ItemId
);
record_id!(
    /// Unique identifier for an evaluation task
    TaskId
);
record_id!(
    /// Unique identifier for an evaluation result
    ResultId
);

/// Isolation scope. Every store operation is keyed by tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        TenantId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metric name to score. Ordered so serialized output is stable.
pub type MetricScores = BTreeMap<String, f64>;

// ---------------------------------------------------------------------------
// Datasets
// ---------------------------------------------------------------------------

/// Where a dataset came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DatasetSource {
    #[default]
    Manual,
    Imported,
    /// Exported from recorded agent traces
    Trace,
}

/// Dataset row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub id: DatasetId,
    pub tenant_id: TenantId,
    pub name: String,
    pub description: String,
    pub source: DatasetSource,
    pub item_count: usize,
    pub version: u32,
    /// SHA-256 hex of the canonical item set
    pub content_digest: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DatasetRecord {
    /// Build a dataset row for `items`, stamping count and digest.
    pub fn new(
        id: DatasetId,
        tenant_id: TenantId,
        name: impl Into<String>,
        description: impl Into<String>,
        source: DatasetSource,
        items: &[DatasetItemRecord],
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            tenant_id,
            name: name.into(),
            description: description.into(),
            source,
            item_count: items.len(),
            version: 1,
            content_digest: items_digest(items),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A single ground-truth case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetItemRecord {
    pub id: ItemId,
    pub dataset_id: DatasetId,
    /// Position within the dataset (0-based)
    pub position: usize,
    pub query: String,
    /// Relevant document ids. Order carries no meaning.
    pub relevant_ids: Vec<String>,
    pub expected_answer: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// SHA-256 over the fields that define an item set, ignoring generated ids.
pub fn items_digest(items: &[DatasetItemRecord]) -> String {
    let mut hasher = Sha256::new();
    for item in items {
        let mut relevant = item.relevant_ids.clone();
        relevant.sort();
        let canonical = serde_json::json!({
            "query": item.query,
            "relevant_ids": relevant,
            "expected_answer": item.expected_answer,
        });
        hasher.update(canonical.to_string().as_bytes());
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Lifecycle of an evaluation task.
///
/// `Pending -> Running -> Completed | Failed`. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Pending, TaskStatus::Failed)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Evaluation task row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub tenant_id: TenantId,
    pub dataset_id: DatasetId,
    /// Agent the dataset is evaluated against
    pub agent_id: String,
    /// Knowledge bases the agent may retrieve from (empty = agent default)
    #[serde(default)]
    pub knowledge_scope: Vec<String>,
    pub status: TaskStatus,
    pub total_items: usize,
    pub processed_items: usize,
    pub succeeded_items: usize,
    pub failed_items: usize,
    /// Percentage in [0, 100]
    pub progress: u8,
    pub avg_metrics: MetricScores,
    pub error_summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    /// Create a pending task for `total_items` cases.
    pub fn new(
        tenant_id: TenantId,
        dataset_id: DatasetId,
        agent_id: impl Into<String>,
        knowledge_scope: Vec<String>,
        total_items: usize,
    ) -> Self {
        Self {
            id: TaskId::new(),
            tenant_id,
            dataset_id,
            agent_id: agent_id.into(),
            knowledge_scope,
            status: TaskStatus::Pending,
            total_items,
            processed_items: 0,
            succeeded_items: 0,
            failed_items: 0,
            progress: 0,
            avg_metrics: MetricScores::new(),
            error_summary: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move to `next`, stamping lifecycle timestamps.
    ///
    /// Entering `Running` sets `started_at`; entering a terminal state sets
    /// `completed_at` and pins progress at 100. Illegal moves leave the record
    /// untouched.
    pub fn transition(&mut self, next: TaskStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        match next {
            TaskStatus::Running => self.started_at = Some(Utc::now()),
            TaskStatus::Completed | TaskStatus::Failed => {
                self.progress = 100;
                self.completed_at = Some(Utc::now());
            }
            TaskStatus::Pending => {}
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Why a single item could not be scored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemErrorKind {
    /// Runner failed before producing retrieval output
    Retrieval,
    /// Runner retrieved but failed to generate
    Generation,
    /// Per-item timeout elapsed
    Timeout,
    /// Run deadline reached before the item finished
    Cancelled,
    /// Evaluation unit ended without reporting an outcome
    Aborted,
    /// Result could not be written
    Persistence,
}

/// Item-level failure recorded on a result row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    pub kind: ItemErrorKind,
    pub message: String,
}

/// Per-item evaluation outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub id: ResultId,
    pub tenant_id: TenantId,
    pub task_id: TaskId,
    pub item_id: ItemId,
    pub retrieved_ids: Vec<String>,
    pub generated_text: String,
    pub scores: MetricScores,
    pub retrieval_success: bool,
    pub generation_success: bool,
    pub error: Option<ItemError>,
    pub created_at: DateTime<Utc>,
}

impl ResultRecord {
    /// Both runner phases succeeded; only these count toward averages.
    pub fn is_success(&self) -> bool {
        self.retrieval_success && self.generation_success
    }
}
