//! Tokenization and sequence helpers shared by the text metrics.

use std::collections::HashMap;

/// Lower-cased whitespace tokenization. Punctuation is kept attached.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

/// Count each n-gram (as a token window) in `tokens`.
///
/// Empty when `n == 0` or the sequence is shorter than `n`.
pub fn ngram_counts(tokens: &[String], n: usize) -> HashMap<&[String], usize> {
    let mut counts = HashMap::new();
    if n == 0 || tokens.len() < n {
        return counts;
    }
    for window in tokens.windows(n) {
        *counts.entry(window).or_insert(0) += 1;
    }
    counts
}

/// Number of n-grams in a sequence of `len` tokens.
pub fn ngram_total(len: usize, n: usize) -> usize {
    if n == 0 || len < n {
        0
    } else {
        len - n + 1
    }
}

/// Sum over shared n-grams of the smaller multiplicity.
pub fn clipped_overlap(
    candidate: &HashMap<&[String], usize>,
    reference: &HashMap<&[String], usize>,
) -> usize {
    candidate
        .iter()
        .filter_map(|(gram, c)| reference.get(gram).map(|r| (*c).min(*r)))
        .sum()
}

/// Length of the longest common subsequence of two token sequences.
///
/// Classic (m+1)×(n+1) dynamic-programming table.
pub fn lcs_length(a: &[String], b: &[String]) -> usize {
    let m = a.len();
    let n = b.len();
    if m == 0 || n == 0 {
        return 0;
    }

    let mut table = vec![vec![0usize; n + 1]; m + 1];
    for i in 1..=m {
        for j in 1..=n {
            table[i][j] = if a[i - 1] == b[j - 1] {
                table[i - 1][j - 1] + 1
            } else {
                table[i - 1][j].max(table[i][j - 1])
            };
        }
    }
    table[m][n]
}
