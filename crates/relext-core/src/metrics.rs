//! Classification metrics reported per epoch.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Unweighted mean of per-class F1 over every label present in either
/// `y_true` or `y_pred`. Classes with no true or predicted positives
/// contribute 0. Returns 0.0 for empty input.
pub fn macro_f1(y_true: &[u32], y_pred: &[u32]) -> f64 {
    // label -> (tp, fp, fn)
    let mut counts: BTreeMap<u32, (usize, usize, usize)> = BTreeMap::new();

    for (&t, &p) in y_true.iter().zip(y_pred) {
        if t == p {
            counts.entry(t).or_default().0 += 1;
        } else {
            counts.entry(p).or_default().1 += 1;
            counts.entry(t).or_default().2 += 1;
        }
    }

    if counts.is_empty() {
        return 0.0;
    }

    let total: f64 = counts
        .values()
        .map(|&(tp, fp, fn_)| {
            let denom = 2 * tp + fp + fn_;
            if denom == 0 {
                0.0
            } else {
                (2 * tp) as f64 / denom as f64
            }
        })
        .sum();

    total / counts.len() as f64
}

/// Aggregate result of one pass over a dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// `correct / (steps * batch_size)`. Undercounts when the last batch is
    /// short; kept so numbers stay comparable with earlier runs.
    pub accuracy: f64,
    /// Mean of per-batch macro-F1.
    pub f1: f64,
    pub steps: usize,
    pub samples: usize,
    pub correct: usize,
}

impl EpochMetrics {
    /// `correct / samples`, ignoring batch sizes.
    pub fn exact_accuracy(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.correct as f64 / self.samples as f64
        }
    }
}
