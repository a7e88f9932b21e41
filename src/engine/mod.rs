//! Prediction engine
//!
//! Orchestrates the serving pipeline: validate, preprocess, score with the
//! active model, classify, and append to history before the caller sees the
//! result. Batch mode isolates per-item failures and honors an optional
//! deadline by marking unprocessed items not-attempted instead of discarding
//! completed work.

pub mod explain;

pub use explain::{Explanation, ExplanationReport, FeatureContribution};

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::ServingConfig;
use crate::error::{ServingError, ServingResult};
use crate::history::{
    ClassLabel, ConfidenceBand, HistoryStore, Prediction, PredictionDraft,
};
use crate::model::registry::ModelRegistry;
use crate::schema::{preprocess, validate, FeatureSchema, Record, ValidationReport};

/// Per-item failure inside a batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub kind: String,
    pub message: String,
    /// Structured validation detail when the failure was a validation one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ValidationReport>,
}

/// Outcome of one batch item; the tagged type keeps failures statically
/// distinguishable from successes.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchItemOutcome {
    Predicted(Prediction),
    Failed(BatchFailure),
    NotAttempted,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask_id: Option<Value>,
    pub outcome: BatchItemOutcome,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct BatchSummary {
    pub total_records: usize,
    pub good_subjects: usize,
    pub bad_subjects: usize,
    pub failed_records: usize,
    pub not_attempted: usize,
}

/// Order-preserving batch result.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub items: Vec<BatchItem>,
    pub summary: BatchSummary,
}

impl BatchOutcome {
    pub fn predictions(&self) -> impl Iterator<Item = &Prediction> {
        self.items.iter().filter_map(|item| match &item.outcome {
            BatchItemOutcome::Predicted(p) => Some(p),
            _ => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = (&BatchItem, &BatchFailure)> {
        self.items.iter().filter_map(|item| match &item.outcome {
            BatchItemOutcome::Failed(f) => Some((item, f)),
            _ => None,
        })
    }
}

pub struct PredictionEngine {
    schema: Arc<FeatureSchema>,
    registry: Arc<ModelRegistry>,
    history: Arc<HistoryStore>,
    config: ServingConfig,
}

impl PredictionEngine {
    pub fn new(
        schema: Arc<FeatureSchema>,
        registry: Arc<ModelRegistry>,
        history: Arc<HistoryStore>,
        config: ServingConfig,
    ) -> Self {
        Self {
            schema,
            registry,
            history,
            config,
        }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn config(&self) -> &ServingConfig {
        &self.config
    }

    pub(crate) fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Validate, preprocess, score, and record one record. The prediction
    /// is appended to history before being returned, so history can always
    /// answer queries for anything a caller has seen.
    pub fn predict_record(&self, record: &Record) -> ServingResult<Prediction> {
        let report = validate(record, &self.schema);
        if !report.is_valid {
            return Err(ServingError::Validation { report });
        }
        let vector = preprocess(record, &self.schema, self.config.impute_missing)?;

        let active = self.registry.get_active().map_err(|err| match err {
            ServingError::NoActiveModel => ServingError::ModelUnavailable,
            other => other,
        })?;
        let probability = active.artifact.predict(&vector);
        let (class_label, confidence_band) = self.classify(probability);

        let prediction = self.history.append(PredictionDraft {
            timestamp: Utc::now(),
            input_snapshot: record.clone(),
            model_id: active.version.model_id.clone(),
            class_label,
            probability,
            confidence_band,
            mask_id: record.get("MASK_ID").cloned(),
        });
        info!(
            prediction_id = %prediction.prediction_id,
            model_id = %prediction.model_id,
            probability = prediction.probability,
            "served prediction"
        );
        Ok(prediction)
    }

    /// Batch prediction with per-item failure isolation. A failure on one
    /// record never aborts the batch; items not reached before `deadline`
    /// are reported not-attempted with completed work intact.
    pub fn predict_batch(&self, records: &[Record], deadline: Option<Instant>) -> BatchOutcome {
        let mut items = Vec::with_capacity(records.len());
        let mut good = 0usize;
        let mut bad = 0usize;
        let mut failed = 0usize;
        let mut skipped = 0usize;

        for (index, record) in records.iter().enumerate() {
            let mask_id = record.get("MASK_ID").cloned();
            if deadline.is_some_and(|d| Instant::now() >= d) {
                skipped += 1;
                items.push(BatchItem {
                    index,
                    mask_id,
                    outcome: BatchItemOutcome::NotAttempted,
                });
                continue;
            }
            let outcome = match self.predict_record(record) {
                Ok(prediction) => {
                    match prediction.class_label {
                        ClassLabel::Positive => good += 1,
                        ClassLabel::Negative => bad += 1,
                    }
                    BatchItemOutcome::Predicted(prediction)
                }
                Err(err) => {
                    warn!(index, kind = err.kind(), "batch item failed: {}", err);
                    failed += 1;
                    let report = match &err {
                        ServingError::Validation { report } => Some(report.clone()),
                        _ => None,
                    };
                    BatchItemOutcome::Failed(BatchFailure {
                        kind: err.kind().to_string(),
                        message: err.to_string(),
                        report,
                    })
                }
            };
            items.push(BatchItem {
                index,
                mask_id,
                outcome,
            });
        }

        BatchOutcome {
            items,
            summary: BatchSummary {
                total_records: records.len(),
                good_subjects: good,
                bad_subjects: bad,
                failed_records: failed,
                not_attempted: skipped,
            },
        }
    }

    /// Class label and confidence band for a probability, per configured
    /// threshold policy.
    pub fn classify(&self, probability: f64) -> (ClassLabel, ConfidenceBand) {
        let label = if probability >= self.config.decision_threshold {
            ClassLabel::Positive
        } else {
            ClassLabel::Negative
        };
        let distance = (probability - self.config.decision_threshold).abs();
        let band = if distance >= self.config.band_high {
            ConfidenceBand::High
        } else if distance >= self.config.band_medium {
            ConfidenceBand::Medium
        } else {
            ConfidenceBand::Low
        };
        (label, band)
    }
}
