//! Predictor capability seam
//!
//! A trained artifact is an opaque `predict(vector) -> probability`
//! capability behind the [`Predictor`] trait, so concrete model families can
//! be swapped without touching engine logic. Artifacts that can decompose
//! their output additionally expose raw margin-space attribution scores; the
//! explainability engine rescales those onto the probability scale.

use std::sync::Arc;

use crate::schema::FeatureVector;

/// Raw attribution material from an artifact: the reference output for an
/// average input plus one raw score per feature. Scores carry the artifact's
/// native scale (margin space for linear/tree, probability space for the
/// ensemble); only their proportions and signs are meaningful. Final
/// reconciliation with the predicted probability is the engine's job.
#[derive(Debug, Clone)]
pub struct RawAttribution {
    pub base_probability: f64,
    pub scores: Vec<f64>,
}

/// A trained classification artifact.
pub trait Predictor: Send + Sync {
    /// Artifact family, for logs and error messages.
    fn family(&self) -> &'static str;

    /// Positive-class probability in [0, 1] for one feature vector.
    fn predict(&self, vector: &FeatureVector) -> f64;

    /// Per-feature attribution material, when the family supports it.
    fn attribution(&self, vector: &FeatureVector) -> Option<RawAttribution> {
        let _ = vector;
        None
    }
}

pub(crate) fn sigmoid(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}

/// Logistic-regression artifact: weights column-aligned with the schema plus
/// per-feature baselines (training-population means) used as the reference
/// point for attribution and for NaN missing-markers.
#[derive(Debug, Clone)]
pub struct LinearModel {
    intercept: f64,
    weights: Vec<f64>,
    baselines: Vec<f64>,
}

impl LinearModel {
    pub fn new(intercept: f64, weights: Vec<f64>, baselines: Vec<f64>) -> Self {
        debug_assert_eq!(weights.len(), baselines.len());
        Self {
            intercept,
            weights,
            baselines,
        }
    }

    fn margin(&self, vector: &FeatureVector) -> f64 {
        let mut margin = self.intercept;
        for (i, &w) in self.weights.iter().enumerate() {
            let x = vector
                .get(i)
                .filter(|v| !v.is_nan())
                .unwrap_or(self.baselines[i]);
            margin += w * x;
        }
        margin
    }

    fn base_margin(&self) -> f64 {
        let mut margin = self.intercept;
        for (w, b) in self.weights.iter().zip(&self.baselines) {
            margin += w * b;
        }
        margin
    }
}

impl Predictor for LinearModel {
    fn family(&self) -> &'static str {
        "linear"
    }

    fn predict(&self, vector: &FeatureVector) -> f64 {
        sigmoid(self.margin(vector))
    }

    fn attribution(&self, vector: &FeatureVector) -> Option<RawAttribution> {
        let scores = self
            .weights
            .iter()
            .zip(&self.baselines)
            .enumerate()
            .map(|(i, (w, b))| {
                let x = vector.get(i).filter(|v| !v.is_nan()).unwrap_or(*b);
                w * (x - b)
            })
            .collect();
        Some(RawAttribution {
            base_probability: sigmoid(self.base_margin()),
            scores,
        })
    }
}

/// One decision stump in a boosted-stump artifact.
#[derive(Debug, Clone)]
pub struct Stump {
    /// Column index into the feature vector.
    pub feature: usize,
    pub threshold: f64,
    /// Margin added when the feature value is <= threshold.
    pub below: f64,
    /// Margin added when the feature value is > threshold.
    pub above: f64,
    /// Expected margin over the training population, the attribution
    /// reference for this stump (also used for NaN missing-markers).
    pub baseline: f64,
}

impl Stump {
    fn chosen(&self, vector: &FeatureVector) -> f64 {
        match vector.get(self.feature) {
            Some(x) if !x.is_nan() => {
                if x <= self.threshold {
                    self.below
                } else {
                    self.above
                }
            }
            _ => self.baseline,
        }
    }
}

/// Gradient-boosted stump ensemble over the schema's columns.
#[derive(Debug, Clone)]
pub struct TreeModel {
    bias: f64,
    stumps: Vec<Stump>,
    columns: usize,
}

impl TreeModel {
    pub fn new(bias: f64, stumps: Vec<Stump>, columns: usize) -> Self {
        Self {
            bias,
            stumps,
            columns,
        }
    }

    fn margin(&self, vector: &FeatureVector) -> f64 {
        self.bias + self.stumps.iter().map(|s| s.chosen(vector)).sum::<f64>()
    }

    fn base_margin(&self) -> f64 {
        self.bias + self.stumps.iter().map(|s| s.baseline).sum::<f64>()
    }
}

impl Predictor for TreeModel {
    fn family(&self) -> &'static str {
        "tree"
    }

    fn predict(&self, vector: &FeatureVector) -> f64 {
        sigmoid(self.margin(vector))
    }

    fn attribution(&self, vector: &FeatureVector) -> Option<RawAttribution> {
        let mut scores = vec![0.0; self.columns];
        for stump in &self.stumps {
            if let Some(slot) = scores.get_mut(stump.feature) {
                *slot += stump.chosen(vector) - stump.baseline;
            }
        }
        Some(RawAttribution {
            base_probability: sigmoid(self.base_margin()),
            scores,
        })
    }
}

/// Weighted average over member artifacts. Supports attribution only when
/// every member does.
pub struct EnsembleModel {
    members: Vec<(f64, Arc<dyn Predictor>)>,
}

impl EnsembleModel {
    pub fn new(members: Vec<(f64, Arc<dyn Predictor>)>) -> Self {
        Self { members }
    }

    fn total_weight(&self) -> f64 {
        let total: f64 = self.members.iter().map(|(w, _)| w).sum();
        if total > 0.0 {
            total
        } else {
            1.0
        }
    }
}

impl Predictor for EnsembleModel {
    fn family(&self) -> &'static str {
        "ensemble"
    }

    fn predict(&self, vector: &FeatureVector) -> f64 {
        let total = self.total_weight();
        self.members
            .iter()
            .map(|(w, m)| w * m.predict(vector))
            .sum::<f64>()
            / total
    }

    fn attribution(&self, vector: &FeatureVector) -> Option<RawAttribution> {
        let total = self.total_weight();
        let mut base = 0.0;
        let mut scores = vec![0.0; vector.len()];
        for (weight, member) in &self.members {
            let raw = member.attribution(vector)?;
            let share = weight / total;
            base += share * raw.base_probability;
            // Reconcile each member in probability space before averaging:
            // its raw scores are rescaled onto its own probability gap, so
            // the blended scores sum to the ensemble gap and keep each
            // member's signs. Averaging raw margin-space scores directly
            // would let a member with an opposing gap flip the total's sign.
            let gap = member.predict(vector) - raw.base_probability;
            let raw_total: f64 = raw.scores.iter().sum();
            if raw_total.abs() > 1e-12 {
                for (slot, score) in scores.iter_mut().zip(&raw.scores) {
                    *slot += share * score * (gap / raw_total);
                }
            } else {
                let n = raw.scores.len().max(1) as f64;
                for slot in scores.iter_mut().take(raw.scores.len()) {
                    *slot += share * gap / n;
                }
            }
        }
        Some(RawAttribution {
            base_probability: base,
            scores,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(values: Vec<f64>) -> FeatureVector {
        FeatureVector::new(values)
    }

    #[test]
    fn test_linear_probability_bounds() {
        let model = LinearModel::new(0.2, vec![0.5, -1.0], vec![0.5, 0.5]);
        let p = model.predict(&vector(vec![1.0, 0.0]));
        assert!(p > 0.0 && p < 1.0);
        // Monotone in a positively weighted feature.
        let higher = model.predict(&vector(vec![3.0, 0.0]));
        assert!(higher > p);
    }

    #[test]
    fn test_linear_nan_falls_back_to_baseline() {
        let model = LinearModel::new(0.0, vec![1.0], vec![0.7]);
        let at_baseline = model.predict(&vector(vec![0.7]));
        let with_nan = model.predict(&vector(vec![f64::NAN]));
        assert!((at_baseline - with_nan).abs() < 1e-12);
        // Attribution score for a missing feature is zero.
        let raw = model.attribution(&vector(vec![f64::NAN])).unwrap();
        assert_eq!(raw.scores, vec![0.0]);
    }

    #[test]
    fn test_tree_stump_routing() {
        let model = TreeModel::new(
            0.0,
            vec![Stump {
                feature: 0,
                threshold: 2.0,
                below: 0.8,
                above: -0.8,
                baseline: 0.0,
            }],
            1,
        );
        assert!(model.predict(&vector(vec![1.0])) > 0.5);
        assert!(model.predict(&vector(vec![3.0])) < 0.5);
    }

    #[test]
    fn test_tree_attribution_accumulates_per_feature() {
        let model = TreeModel::new(
            0.1,
            vec![
                Stump {
                    feature: 1,
                    threshold: 0.5,
                    below: 0.3,
                    above: -0.2,
                    baseline: 0.1,
                },
                Stump {
                    feature: 1,
                    threshold: 1.5,
                    below: 0.2,
                    above: -0.1,
                    baseline: 0.0,
                },
            ],
            3,
        );
        let raw = model.attribution(&vector(vec![0.0, 0.0, 0.0])).unwrap();
        assert_eq!(raw.scores.len(), 3);
        assert_eq!(raw.scores[0], 0.0);
        assert!((raw.scores[1] - (0.2 + 0.2)).abs() < 1e-12);
    }

    #[test]
    fn test_ensemble_averages_members() {
        struct Constant(f64);
        impl Predictor for Constant {
            fn family(&self) -> &'static str {
                "constant"
            }
            fn predict(&self, _vector: &FeatureVector) -> f64 {
                self.0
            }
        }
        let ensemble = EnsembleModel::new(vec![
            (1.0, Arc::new(Constant(0.2)) as Arc<dyn Predictor>),
            (3.0, Arc::new(Constant(0.6)) as Arc<dyn Predictor>),
        ]);
        let p = ensemble.predict(&vector(vec![0.0]));
        assert!((p - 0.5).abs() < 1e-12);
        // A member without attribution makes the ensemble unsupported.
        assert!(ensemble.attribution(&vector(vec![0.0])).is_none());
    }

    #[test]
    fn test_ensemble_attribution_sums_to_its_probability_gap() {
        // Members with opposing gaps: one pushes above its base, the other
        // below. The blended scores must still sum to the ensemble's own
        // base-to-probability gap with each member's signs intact.
        let up = LinearModel::new(0.4, vec![0.9, 0.0], vec![0.2, 0.0]);
        let down = LinearModel::new(-1.1, vec![0.0, -0.7], vec![0.0, 0.5]);
        let ensemble = EnsembleModel::new(vec![
            (2.0, Arc::new(up) as Arc<dyn Predictor>),
            (1.0, Arc::new(down) as Arc<dyn Predictor>),
        ]);
        let input = vector(vec![1.4, 1.2]);

        let raw = ensemble.attribution(&input).unwrap();
        let p = ensemble.predict(&input);
        let total: f64 = raw.scores.iter().sum();
        assert!((raw.base_probability + total - p).abs() < 1e-9);
        assert!(raw.scores[0] > 0.0, "upward member keeps its sign");
        assert!(raw.scores[1] < 0.0, "downward member keeps its sign");
    }
}
