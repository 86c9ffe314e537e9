//! Retrieval metrics
//!
//! Standard IR scores over the retrieved identifier list and the ground-truth
//! relevant set of a single query:
//! - Recall: share of relevant ids that were retrieved
//! - Precision: share of retrieved ids that are relevant
//! - F1: harmonic mean of the two
//! - MRR: reciprocal rank of the first relevant retrieved id

use std::collections::HashSet;

use super::{Metric, MetricError, MetricInput};

fn id_set(ids: &[String]) -> HashSet<&str> {
    ids.iter().map(String::as_str).collect()
}

fn hits(retrieved: &HashSet<&str>, relevant: &HashSet<&str>) -> usize {
    retrieved.intersection(relevant).count()
}

/// |retrieved ∩ relevant| / |relevant|, 0 when nothing is relevant.
pub fn recall(retrieved: &[String], relevant: &[String]) -> f64 {
    let relevant = id_set(relevant);
    if relevant.is_empty() {
        return 0.0;
    }
    hits(&id_set(retrieved), &relevant) as f64 / relevant.len() as f64
}

/// |retrieved ∩ relevant| / |retrieved|, 0 when nothing was retrieved.
pub fn precision(retrieved: &[String], relevant: &[String]) -> f64 {
    let retrieved = id_set(retrieved);
    if retrieved.is_empty() {
        return 0.0;
    }
    hits(&retrieved, &id_set(relevant)) as f64 / retrieved.len() as f64
}

/// Harmonic mean of precision and recall, 0 when both are 0.
pub fn f1(retrieved: &[String], relevant: &[String]) -> f64 {
    let p = precision(retrieved, relevant);
    let r = recall(retrieved, relevant);
    if p + r == 0.0 {
        0.0
    } else {
        2.0 * p * r / (p + r)
    }
}

/// 1 / (1-based rank of the first relevant retrieved id), 0 if none.
pub fn reciprocal_rank(retrieved: &[String], relevant: &[String]) -> f64 {
    let relevant = id_set(relevant);
    retrieved
        .iter()
        .position(|id| relevant.contains(id.as_str()))
        .map(|idx| 1.0 / (idx + 1) as f64)
        .unwrap_or(0.0)
}

fn validate_ids(input: &MetricInput) -> Result<(), MetricError> {
    if input.retrieved_ids().iter().any(|id| id.trim().is_empty()) {
        return Err(MetricError::BlankIdentifier {
            field: "retrieved_ids",
        });
    }
    if input.relevant_ids().iter().any(|id| id.trim().is_empty()) {
        return Err(MetricError::BlankIdentifier {
            field: "relevant_ids",
        });
    }
    Ok(())
}

macro_rules! retrieval_metric {
    ($(#[$meta:meta])* $ty:ident, $name:literal, $func:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $ty;

        impl Metric for $ty {
            fn name(&self) -> &str {
                $name
            }

            fn validate(&self, input: &MetricInput) -> Result<(), MetricError> {
                validate_ids(input)
            }

            fn compute(&self, input: &MetricInput) -> f64 {
                $func(input.retrieved_ids(), input.relevant_ids())
            }
        }
    };
}

retrieval_metric!(
    /// Recall over the relevant set.
    Recall,
    "recall",
    recall
);
retrieval_metric!(
    /// Precision over the retrieved list.
    Precision,
    "precision",
    precision
);
retrieval_metric!(
    /// Retrieval F1.
    F1,
    "f1",
    f1
);
retrieval_metric!(
    /// Reciprocal rank of the first hit.
    Mrr,
    "mrr",
    reciprocal_rank
);
