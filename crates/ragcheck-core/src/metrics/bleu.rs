//! BLEU-N with uniform weights and a brevity penalty.
//!
//! BLEU = BP × exp(Σ wₙ log pₙ), wₙ = 1/N
//! BP = 1 if c ≥ r, exp(1 - r/c) if 0 < c < r, 0 if c = 0
//!
//! Orders whose modified precision is zero (including orders longer than
//! the candidate) are left out of the log-sum. A candidate that shares no
//! unigram with the reference scores 0.

use super::text::{clipped_overlap, ngram_counts, ngram_total, tokenize};
use super::{Metric, MetricError, MetricInput};

pub const DEFAULT_MAX_ORDER: usize = 4;

/// Clipped n-gram precision of `candidate` against `reference`.
pub fn modified_precision(candidate: &[String], reference: &[String], n: usize) -> f64 {
    let total = ngram_total(candidate.len(), n);
    if total == 0 {
        return 0.0;
    }
    let cand = ngram_counts(candidate, n);
    let refr = ngram_counts(reference, n);
    clipped_overlap(&cand, &refr) as f64 / total as f64
}

/// Brevity penalty for candidate length `c` against reference length `r`.
pub fn brevity_penalty(c: usize, r: usize) -> f64 {
    if c == 0 {
        0.0
    } else if c >= r {
        1.0
    } else {
        (1.0 - r as f64 / c as f64).exp()
    }
}

/// BLEU-`max_order` of `candidate` against `reference`.
pub fn bleu(candidate: &str, reference: &str, max_order: usize) -> f64 {
    let cand = tokenize(candidate);
    let refr = tokenize(reference);
    if cand.is_empty() || refr.is_empty() || max_order == 0 {
        return 0.0;
    }

    let weight = 1.0 / max_order as f64;
    let mut log_sum = 0.0;
    for n in 1..=max_order {
        let p = modified_precision(&cand, &refr, n);
        if p == 0.0 {
            if n == 1 {
                return 0.0;
            }
            continue;
        }
        log_sum += weight * p.ln();
    }

    brevity_penalty(cand.len(), refr.len()) * log_sum.exp()
}

/// BLEU metric of a fixed maximum order.
#[derive(Debug, Clone)]
pub struct Bleu {
    max_order: usize,
}

impl Bleu {
    pub fn new(max_order: usize) -> Self {
        Self {
            max_order: max_order.max(1),
        }
    }

    pub fn max_order(&self) -> usize {
        self.max_order
    }
}

impl Default for Bleu {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ORDER)
    }
}

impl Metric for Bleu {
    fn name(&self) -> &str {
        "bleu"
    }

    fn validate(&self, input: &MetricInput) -> Result<(), MetricError> {
        super::require_expected_text(input)
    }

    fn compute(&self, input: &MetricInput) -> f64 {
        bleu(input.generated_text(), input.expected_text(), self.max_order)
    }
}
