//! Explainability engine
//!
//! Decomposes a predicted probability into a base value plus additive
//! per-feature contributions. The defining correctness property:
//!
//!   base_value + sum(contributions) == probability   (within 1e-6)
//!
//! Artifacts supply raw attribution scores; this module rescales them onto
//! the probability gap so the identity holds by construction. Positive
//! contributions push toward the Positive class.

use serde::Serialize;

use super::PredictionEngine;
use crate::error::{ServingError, ServingResult};
use crate::history::ClassLabel;
use crate::schema::{preprocess, validate, FeatureVector, Record};

/// A feature's additive share of the deviation between base value and the
/// final predicted probability.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureContribution {
    pub feature: String,
    /// Encoded value the model actually consumed.
    pub value: f64,
    pub impact: f64,
}

/// Additive decomposition of one prediction.
#[derive(Debug, Clone, Serialize)]
pub struct Explanation {
    pub base_value: f64,
    /// One entry per schema feature, in schema order.
    pub contributions: Vec<FeatureContribution>,
}

impl Explanation {
    /// Sum of all contributions; `base_value + total()` reconstructs the
    /// predicted probability.
    pub fn total(&self) -> f64 {
        self.contributions.iter().map(|c| c.impact).sum()
    }

    /// Features with the largest positive contribution, ties broken by
    /// feature name ascending for determinism.
    pub fn top_positive(&self, k: usize) -> Vec<FeatureContribution> {
        let mut positive: Vec<&FeatureContribution> =
            self.contributions.iter().filter(|c| c.impact > 0.0).collect();
        positive.sort_by(|a, b| {
            b.impact
                .partial_cmp(&a.impact)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.feature.cmp(&b.feature))
        });
        positive.into_iter().take(k).cloned().collect()
    }

    /// Features with the largest-magnitude negative contribution, same
    /// tie-break rule.
    pub fn top_negative(&self, k: usize) -> Vec<FeatureContribution> {
        let mut negative: Vec<&FeatureContribution> =
            self.contributions.iter().filter(|c| c.impact < 0.0).collect();
        negative.sort_by(|a, b| {
            a.impact
                .partial_cmp(&b.impact)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.feature.cmp(&b.feature))
        });
        negative.into_iter().take(k).cloned().collect()
    }
}

/// Full explanation payload for one record.
#[derive(Debug, Clone, Serialize)]
pub struct ExplanationReport {
    pub model_id: String,
    pub class_label: ClassLabel,
    pub probability: f64,
    pub explanation: Explanation,
    pub top_positive_features: Vec<FeatureContribution>,
    pub top_negative_features: Vec<FeatureContribution>,
}

impl PredictionEngine {
    /// Explain a record's prediction under the active model.
    ///
    /// Runs the same validate/preprocess path as prediction so the
    /// decomposition refers to exactly the vector the model scored.
    pub fn explain_record(&self, record: &Record) -> ServingResult<ExplanationReport> {
        let report = validate(record, self.schema());
        if !report.is_valid {
            return Err(ServingError::Validation { report });
        }
        let vector = preprocess(record, self.schema(), self.config().impute_missing)?;

        let active = self.registry().get_active().map_err(|err| match err {
            ServingError::NoActiveModel => ServingError::ModelUnavailable,
            other => other,
        })?;
        let probability = active.artifact.predict(&vector);
        let (class_label, _) = self.classify(probability);

        let raw = active.artifact.attribution(&vector).ok_or_else(|| {
            ServingError::ExplanationUnsupported {
                model_id: active.version.model_id.clone(),
                algorithm: active.version.algorithm.clone(),
            }
        })?;

        let explanation = reconcile(
            self.schema().iter().map(|spec| spec.name.clone()),
            &vector,
            raw.base_probability,
            &raw.scores,
            probability,
        );

        let k = self.config().effective_top_k();
        Ok(ExplanationReport {
            model_id: active.version.model_id,
            class_label,
            probability,
            top_positive_features: explanation.top_positive(k),
            top_negative_features: explanation.top_negative(k),
            explanation,
        })
    }
}

/// Rescale raw margin-space scores so contributions sum exactly to the gap
/// between base value and predicted probability.
fn reconcile(
    names: impl Iterator<Item = String>,
    vector: &FeatureVector,
    base_value: f64,
    raw_scores: &[f64],
    probability: f64,
) -> Explanation {
    let gap = probability - base_value;
    let raw_total: f64 = raw_scores.iter().sum();

    let n = raw_scores.len().max(1);
    let contributions = names
        .enumerate()
        .map(|(i, feature)| {
            let raw = raw_scores.get(i).copied().unwrap_or(0.0);
            // For margin-space scores the raw total shares the gap's sign
            // through sigmoid monotonicity; the ensemble pre-reconciles its
            // members onto the probability scale. Either way the scale
            // factor is non-negative and each score keeps its sign.
            let impact = if raw_total.abs() > 1e-12 {
                raw * (gap / raw_total)
            } else {
                gap / n as f64
            };
            FeatureContribution {
                feature,
                value: vector.get(i).unwrap_or(f64::NAN),
                impact,
            }
        })
        .collect();

    Explanation {
        base_value,
        contributions,
    }
}
