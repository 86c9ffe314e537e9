//! Runner that replays pre-recorded agent outputs.
//!
//! The outputs file is a JSON object keyed by query:
//!
//! ```json
//! {
//!   "what is the refund window?": {
//!     "retrieved_ids": ["policy-7", "faq-2"],
//!     "generated_text": "Refunds are accepted within 30 days."
//!   },
//!   "who approves exceptions?": { "error": "agent timed out" },
//!   "where is the form?": { "retrieved_ids": ["faq-9"], "error": "generation failed" }
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use ragcheck_core::{Runner, RunnerError, RunnerOutput};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RecordedOutput {
    /// A recorded failure. Retrieved ids mark a failure during generation.
    Failure {
        error: String,
        #[serde(default)]
        retrieved_ids: Vec<String>,
    },
    Success(RunnerOutput),
}

#[derive(Debug, Default)]
pub struct RecordedRunner {
    outputs: HashMap<String, RecordedOutput>,
}

impl RecordedRunner {
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        Ok(Self {
            outputs: serde_json::from_str(raw)?,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read recorded outputs: {:?}", path))?;
        Self::from_json(&raw)
            .with_context(|| format!("Recorded outputs are not valid JSON: {:?}", path))
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

#[async_trait]
impl Runner for RecordedRunner {
    async fn run(
        &self,
        query: &str,
        _knowledge_scope: &[String],
    ) -> Result<RunnerOutput, RunnerError> {
        match self.outputs.get(query) {
            Some(RecordedOutput::Success(output)) => Ok(output.clone()),
            Some(RecordedOutput::Failure {
                error,
                retrieved_ids,
            }) if !retrieved_ids.is_empty() => Err(RunnerError::Generation {
                retrieved_ids: retrieved_ids.clone(),
                message: error.clone(),
            }),
            Some(RecordedOutput::Failure { error, .. }) => Err(RunnerError::Retrieval(error.clone())),
            None => Err(RunnerError::Retrieval(format!(
                "no recorded output for query {query:?}"
            ))),
        }
    }
}
