//! ROUGE-N and ROUGE-L.
//!
//! Both are symmetric: the overlap (clipped n-gram count, or LCS length) is
//! divided by the larger of the two sides rather than reporting separate
//! precision/recall.

use super::text::{clipped_overlap, lcs_length, ngram_counts, ngram_total, tokenize};
use super::{Metric, MetricError, MetricInput};

/// Clipped n-gram overlap / max(|candidate n-grams|, |reference n-grams|).
pub fn rouge_n(candidate: &str, reference: &str, n: usize) -> f64 {
    let cand = tokenize(candidate);
    let refr = tokenize(reference);
    let denom = ngram_total(cand.len(), n).max(ngram_total(refr.len(), n));
    if ngram_total(cand.len(), n) == 0 || ngram_total(refr.len(), n) == 0 {
        return 0.0;
    }
    let overlap = clipped_overlap(&ngram_counts(&cand, n), &ngram_counts(&refr, n));
    overlap as f64 / denom as f64
}

/// LCS length / max(|candidate|, |reference|).
pub fn rouge_l(candidate: &str, reference: &str) -> f64 {
    let cand = tokenize(candidate);
    let refr = tokenize(reference);
    if cand.is_empty() || refr.is_empty() {
        return 0.0;
    }
    lcs_length(&cand, &refr) as f64 / cand.len().max(refr.len()) as f64
}

/// ROUGE-N for a fixed n.
#[derive(Debug, Clone)]
pub struct RougeN {
    n: usize,
    name: String,
}

impl RougeN {
    pub fn new(n: usize) -> Self {
        let n = n.max(1);
        Self {
            n,
            name: format!("rouge{n}"),
        }
    }
}

impl Metric for RougeN {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, input: &MetricInput) -> Result<(), MetricError> {
        super::require_expected_text(input)
    }

    fn compute(&self, input: &MetricInput) -> f64 {
        rouge_n(input.generated_text(), input.expected_text(), self.n)
    }
}

/// ROUGE-L.
#[derive(Debug, Clone, Copy, Default)]
pub struct RougeL;

impl Metric for RougeL {
    fn name(&self) -> &str {
        "rougeL"
    }

    fn validate(&self, input: &MetricInput) -> Result<(), MetricError> {
        super::require_expected_text(input)
    }

    fn compute(&self, input: &MetricInput) -> f64 {
        rouge_l(input.generated_text(), input.expected_text())
    }
}
