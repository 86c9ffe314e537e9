//! Metric library.
//!
//! Every metric is a pure, deterministic function of a [`MetricInput`] that
//! returns a score in `[0, 1]`. Metrics are grouped into a [`MetricSet`],
//! which is what the executor scores each item with.
//!
//! | name        | kind       |
//! |-------------|------------|
//! | `recall`    | retrieval  |
//! | `precision` | retrieval  |
//! | `f1`        | retrieval  |
//! | `mrr`       | retrieval  |
//! | `bleu`      | generation |
//! | `rouge1`    | generation |
//! | `rouge2`    | generation |
//! | `rougeL`    | generation |

pub mod bleu;
pub mod retrieval;
pub mod rouge;
pub mod text;

use std::sync::Arc;

use ragcheck_state::MetricScores;
use tracing::debug;

pub use bleu::Bleu;
pub use retrieval::{Mrr, Precision, Recall, F1};
pub use rouge::{RougeL, RougeN};

/// Why a metric cannot score an input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetricError {
    #[error("{field} contains a blank identifier")]
    BlankIdentifier { field: &'static str },

    #[error("{field} is required")]
    MissingField { field: &'static str },
}

/// Per-item inputs to the metric library.
///
/// Built once from a dataset item and the runner's output, then only read.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetricInput {
    retrieved_ids: Vec<String>,
    relevant_ids: Vec<String>,
    generated_text: String,
    expected_text: String,
}

impl MetricInput {
    pub fn new(
        retrieved_ids: Vec<String>,
        relevant_ids: Vec<String>,
        generated_text: impl Into<String>,
        expected_text: impl Into<String>,
    ) -> Self {
        Self {
            retrieved_ids,
            relevant_ids,
            generated_text: generated_text.into(),
            expected_text: expected_text.into(),
        }
    }

    /// Input carrying only retrieval data.
    pub fn retrieval(retrieved_ids: Vec<String>, relevant_ids: Vec<String>) -> Self {
        Self::new(retrieved_ids, relevant_ids, "", "")
    }

    /// Input carrying only generation data.
    pub fn text(generated_text: impl Into<String>, expected_text: impl Into<String>) -> Self {
        Self::new(Vec::new(), Vec::new(), generated_text, expected_text)
    }

    /// Retrieved ids in rank order.
    pub fn retrieved_ids(&self) -> &[String] {
        &self.retrieved_ids
    }

    pub fn relevant_ids(&self) -> &[String] {
        &self.relevant_ids
    }

    pub fn generated_text(&self) -> &str {
        &self.generated_text
    }

    pub fn expected_text(&self) -> &str {
        &self.expected_text
    }
}

/// A named scoring function.
pub trait Metric: Send + Sync {
    /// Stable identifier used as the key in result and aggregate maps.
    fn name(&self) -> &str;

    /// Check that `input` carries what this metric needs.
    fn validate(&self, input: &MetricInput) -> Result<(), MetricError>;

    /// Score `input`. Always in `[0, 1]`.
    fn compute(&self, input: &MetricInput) -> f64;
}

pub(crate) fn require_expected_text(input: &MetricInput) -> Result<(), MetricError> {
    if input.expected_text().trim().is_empty() {
        return Err(MetricError::MissingField {
            field: "expected_text",
        });
    }
    Ok(())
}

/// Ordered collection of metrics applied to every item of a run.
#[derive(Clone)]
pub struct MetricSet {
    metrics: Vec<Arc<dyn Metric>>,
}

impl std::fmt::Debug for MetricSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl Default for MetricSet {
    fn default() -> Self {
        Self::standard(bleu::DEFAULT_MAX_ORDER)
    }
}

impl MetricSet {
    /// An empty set; add metrics with [`MetricSet::with`].
    pub fn empty() -> Self {
        Self {
            metrics: Vec::new(),
        }
    }

    /// All built-in metrics, BLEU at the given maximum order.
    pub fn standard(bleu_max_order: usize) -> Self {
        Self::empty()
            .with(Recall)
            .with(Precision)
            .with(F1)
            .with(Mrr)
            .with(Bleu::new(bleu_max_order))
            .with(RougeN::new(1))
            .with(RougeN::new(2))
            .with(RougeL)
    }

    /// Register another metric. A metric with the same name replaces the old one.
    pub fn with(mut self, metric: impl Metric + 'static) -> Self {
        let metric: Arc<dyn Metric> = Arc::new(metric);
        match self.metrics.iter().position(|m| m.name() == metric.name()) {
            Some(idx) => self.metrics[idx] = metric,
            None => self.metrics.push(metric),
        }
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.metrics.iter().map(|m| m.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Score `input` with every registered metric.
    ///
    /// The map always carries every name in [`MetricSet::names`]. Input a
    /// metric cannot judge (an empty reference, a blank id) scores 0 so
    /// averages keep one sample per result.
    pub fn score(&self, input: &MetricInput) -> MetricScores {
        let mut scores = MetricScores::new();
        for metric in &self.metrics {
            if let Err(e) = metric.validate(input) {
                debug!(metric = metric.name(), error = %e, "degenerate metric input");
            }
            scores.insert(metric.name().to_string(), metric.compute(input));
        }
        scores
    }
}
