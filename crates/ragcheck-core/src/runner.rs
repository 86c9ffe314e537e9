//! Runner contract.
//!
//! A runner executes one query against an agent and reports what it
//! retrieved and what it generated. The engine never inspects how the
//! answer was produced; it only scores the typed output.

use std::sync::Arc;

use async_trait::async_trait;
use ragcheck_state::ItemErrorKind;
use serde::{Deserialize, Serialize};

/// Output of a successful runner call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunnerOutput {
    /// Retrieved document ids in rank order.
    pub retrieved_ids: Vec<String>,
    pub generated_text: String,
}

/// Runner failure for a single query.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunnerError {
    #[error("retrieval failed: {0}")]
    Retrieval(String),

    /// Generation failed after retrieval produced `retrieved_ids`.
    #[error("generation failed: {message}")]
    Generation {
        retrieved_ids: Vec<String>,
        message: String,
    },

    #[error("agent unavailable: {0}")]
    Unavailable(String),
}

impl RunnerError {
    /// Item-level error classification recorded on the result row.
    pub fn kind(&self) -> ItemErrorKind {
        match self {
            RunnerError::Generation { .. } => ItemErrorKind::Generation,
            RunnerError::Retrieval(_) | RunnerError::Unavailable(_) => ItemErrorKind::Retrieval,
        }
    }
}

/// Executes queries against one agent.
///
/// Must be safe to call concurrently; the executor issues up to
/// `max_concurrency` calls at once. Dropping the returned future cancels the
/// call.
#[async_trait]
pub trait Runner: Send + Sync {
    async fn run(
        &self,
        query: &str,
        knowledge_scope: &[String],
    ) -> Result<RunnerOutput, RunnerError>;
}

/// Builds runners for agent ids on demand.
#[async_trait]
pub trait RunnerFactory: Send + Sync {
    async fn create(&self, agent_id: &str) -> Result<Arc<dyn Runner>, RunnerError>;
}

/// Which agent to evaluate and what it may retrieve from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTarget {
    pub agent_id: String,
    /// Knowledge bases to scope retrieval to. Empty means the agent default.
    #[serde(default)]
    pub knowledge_scope: Vec<String>,
}

impl RunTarget {
    pub fn agent(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            knowledge_scope: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_knowledge_scope(mut self, scope: Vec<String>) -> Self {
        self.knowledge_scope = scope;
        self
    }
}
