//! Aggregate performance metrics over recorded predictions
//!
//! Confusion-matrix counts and derived precision/recall/F1 are recomputed on
//! read from predictions that carry a ground-truth outcome. ROC AUC uses the
//! rank-sum formulation with average ranks for tied probabilities.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ClassLabel;

/// Window selector for a metrics snapshot.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsWindow {
    /// Restrict to the most recent N predictions (None = all).
    pub last_n: Option<usize>,
    /// Restrict to predictions served by one model.
    pub model_id: Option<String>,
}

/// One ground-truthed prediction.
#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub probability: f64,
    pub predicted: ClassLabel,
    pub actual: ClassLabel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_positive: u64,
    pub false_positive: u64,
    pub false_negative: u64,
    pub true_negative: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: u64,
}

/// Derived metrics, present only when the window held ground truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatedMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    /// None when the window holds only one class.
    pub roc_auc: Option<f64>,
    pub confusion_matrix: ConfusionMatrix,
    pub per_class_metrics: BTreeMap<String, ClassMetrics>,
}

/// Snapshot over a window of predictions. `evaluated` is None when no
/// ground truth exists in the window.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub evaluated: Option<EvaluatedMetrics>,
    /// Ground-truthed predictions in the window.
    pub sample_size: usize,
    /// Total predictions scanned in the window.
    pub window_size: usize,
    pub last_evaluated: DateTime<Utc>,
}

impl MetricsSnapshot {
    pub fn is_available(&self) -> bool {
        self.evaluated.is_some()
    }
}

pub(super) fn compute_snapshot(window_size: usize, samples: &[Sample]) -> MetricsSnapshot {
    let evaluated = if samples.is_empty() {
        None
    } else {
        Some(evaluate(samples))
    };
    MetricsSnapshot {
        evaluated,
        sample_size: samples.len(),
        window_size,
        last_evaluated: Utc::now(),
    }
}

fn evaluate(samples: &[Sample]) -> EvaluatedMetrics {
    let mut matrix = ConfusionMatrix {
        true_positive: 0,
        false_positive: 0,
        false_negative: 0,
        true_negative: 0,
    };
    for s in samples {
        match (s.predicted, s.actual) {
            (ClassLabel::Positive, ClassLabel::Positive) => matrix.true_positive += 1,
            (ClassLabel::Positive, ClassLabel::Negative) => matrix.false_positive += 1,
            (ClassLabel::Negative, ClassLabel::Positive) => matrix.false_negative += 1,
            (ClassLabel::Negative, ClassLabel::Negative) => matrix.true_negative += 1,
        }
    }

    let total = samples.len() as f64;
    let accuracy = (matrix.true_positive + matrix.true_negative) as f64 / total;

    let positive = class_metrics(
        matrix.true_positive,
        matrix.false_positive,
        matrix.false_negative,
    );
    // Negative-class metrics mirror the matrix.
    let negative = class_metrics(
        matrix.true_negative,
        matrix.false_negative,
        matrix.false_positive,
    );

    let mut per_class = BTreeMap::new();
    per_class.insert(
        ClassLabel::Positive.display_name().to_string(),
        ClassMetrics {
            support: matrix.true_positive + matrix.false_negative,
            ..positive
        },
    );
    per_class.insert(
        ClassLabel::Negative.display_name().to_string(),
        ClassMetrics {
            support: matrix.true_negative + matrix.false_positive,
            ..negative
        },
    );

    EvaluatedMetrics {
        accuracy,
        precision: positive.precision,
        recall: positive.recall,
        f1_score: positive.f1_score,
        roc_auc: roc_auc(samples),
        confusion_matrix: matrix,
        per_class_metrics: per_class,
    }
}

fn class_metrics(tp: u64, fp: u64, fn_: u64) -> ClassMetrics {
    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1_score = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    ClassMetrics {
        precision,
        recall,
        f1_score,
        support: 0,
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Rank-sum (Mann-Whitney) AUC with average ranks for ties. None when only
/// one class is present.
fn roc_auc(samples: &[Sample]) -> Option<f64> {
    let n_pos = samples
        .iter()
        .filter(|s| s.actual == ClassLabel::Positive)
        .count();
    let n_neg = samples.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut indexed: Vec<(f64, bool)> = samples
        .iter()
        .map(|s| (s.probability, s.actual == ClassLabel::Positive))
        .collect();
    indexed.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut rank_sum_pos = 0.0;
    let mut i = 0;
    while i < indexed.len() {
        let mut j = i;
        while j + 1 < indexed.len() && indexed[j + 1].0 == indexed[i].0 {
            j += 1;
        }
        // Ranks are 1-based; tied values share the average rank.
        let avg_rank = ((i + 1) + (j + 1)) as f64 / 2.0;
        for entry in &indexed[i..=j] {
            if entry.1 {
                rank_sum_pos += avg_rank;
            }
        }
        i = j + 1;
    }

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Some((rank_sum_pos - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(probability: f64, predicted: ClassLabel, actual: ClassLabel) -> Sample {
        Sample {
            probability,
            predicted,
            actual,
        }
    }

    #[test]
    fn test_no_ground_truth_is_unavailable() {
        let snapshot = compute_snapshot(10, &[]);
        assert!(!snapshot.is_available());
        assert_eq!(snapshot.window_size, 10);
        assert_eq!(snapshot.sample_size, 0);
    }

    #[test]
    fn test_confusion_matrix_counts() {
        let samples = vec![
            sample(0.9, ClassLabel::Positive, ClassLabel::Positive),
            sample(0.8, ClassLabel::Positive, ClassLabel::Negative),
            sample(0.2, ClassLabel::Negative, ClassLabel::Negative),
            sample(0.3, ClassLabel::Negative, ClassLabel::Positive),
        ];
        let evaluated = compute_snapshot(4, &samples).evaluated.unwrap();
        let m = evaluated.confusion_matrix;
        assert_eq!(
            (m.true_positive, m.false_positive, m.false_negative, m.true_negative),
            (1, 1, 1, 1)
        );
        assert_eq!(evaluated.accuracy, 0.5);
        assert_eq!(evaluated.precision, 0.5);
        assert_eq!(evaluated.recall, 0.5);
        assert_eq!(evaluated.f1_score, 0.5);
    }

    #[test]
    fn test_per_class_metrics_and_support() {
        let samples = vec![
            sample(0.9, ClassLabel::Positive, ClassLabel::Positive),
            sample(0.7, ClassLabel::Positive, ClassLabel::Positive),
            sample(0.1, ClassLabel::Negative, ClassLabel::Negative),
        ];
        let evaluated = compute_snapshot(3, &samples).evaluated.unwrap();
        let positive = &evaluated.per_class_metrics["Good Subject"];
        assert_eq!(positive.support, 2);
        assert_eq!(positive.precision, 1.0);
        let negative = &evaluated.per_class_metrics["Bad Subject"];
        assert_eq!(negative.support, 1);
        assert_eq!(negative.recall, 1.0);
    }

    #[test]
    fn test_auc_perfect_separation() {
        let samples = vec![
            sample(0.9, ClassLabel::Positive, ClassLabel::Positive),
            sample(0.8, ClassLabel::Positive, ClassLabel::Positive),
            sample(0.2, ClassLabel::Negative, ClassLabel::Negative),
            sample(0.1, ClassLabel::Negative, ClassLabel::Negative),
        ];
        let evaluated = compute_snapshot(4, &samples).evaluated.unwrap();
        assert_eq!(evaluated.roc_auc, Some(1.0));
    }

    #[test]
    fn test_auc_single_class_is_none() {
        let samples = vec![
            sample(0.9, ClassLabel::Positive, ClassLabel::Positive),
            sample(0.8, ClassLabel::Positive, ClassLabel::Positive),
        ];
        let evaluated = compute_snapshot(2, &samples).evaluated.unwrap();
        assert_eq!(evaluated.roc_auc, None);
    }

    #[test]
    fn test_auc_with_ties() {
        // One positive and one negative share probability 0.5: AUC 0.5.
        let samples = vec![
            sample(0.5, ClassLabel::Positive, ClassLabel::Positive),
            sample(0.5, ClassLabel::Negative, ClassLabel::Negative),
        ];
        let evaluated = compute_snapshot(2, &samples).evaluated.unwrap();
        assert_eq!(evaluated.roc_auc, Some(0.5));
    }
}
