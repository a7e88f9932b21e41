//! Wire types for the REST API
//!
//! Response shapes mirror what the frontend already consumes (field names
//! like `missing_columns`, `shap_values`, `total_predictions` come from the
//! existing client contract); internal types are mapped here rather than
//! serialized directly.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::{BatchItemOutcome, BatchOutcome, ExplanationReport};
use crate::history::{HistoryPage, MetricsSnapshot, Prediction};
use crate::model::{ModelStatus, ModelVersion, TrainingMetrics};
use crate::schema::{FeatureSchema, FeatureSpec, FeatureVector, ValidationReport};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model_status: &'static str,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ModelInfoResponse {
    pub model_name: String,
    pub version: String,
    pub algorithm: String,
    pub training_date: NaiveDate,
    pub target: Option<String>,
    pub description: Option<String>,
    pub performance_metrics: TrainingMetrics,
}

#[derive(Debug, Serialize)]
pub struct FeaturesResponse {
    pub total_features: usize,
    pub categorical_features: usize,
    pub numerical_features: usize,
    pub features: Vec<FeatureSpec>,
}

impl FeaturesResponse {
    pub fn from_schema(schema: &FeatureSchema) -> Self {
        Self {
            total_features: schema.len(),
            categorical_features: schema.categorical_count(),
            numerical_features: schema.numeric_count(),
            features: schema.iter().cloned().collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InvalidValueDto {
    pub field: String,
    pub reason: &'static str,
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub is_valid: bool,
    pub missing_columns: Vec<String>,
    pub invalid_values: Vec<InvalidValueDto>,
    pub message: String,
}

impl From<ValidationReport> for ValidateResponse {
    fn from(report: ValidationReport) -> Self {
        Self {
            is_valid: report.is_valid,
            missing_columns: report.missing_fields,
            invalid_values: report
                .invalid_fields
                .into_iter()
                .map(|f| InvalidValueDto {
                    field: f.field,
                    reason: f.reason.as_str(),
                    detail: f.detail,
                })
                .collect(),
            message: report.message,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PreprocessResponse {
    pub preprocessed_data: BTreeMap<String, Value>,
}

impl PreprocessResponse {
    /// Flat name-to-value mapping; NaN missing-markers serialize as null.
    pub fn from_vector(schema: &FeatureSchema, vector: &FeatureVector) -> Self {
        let preprocessed_data = schema
            .iter()
            .enumerate()
            .map(|(i, spec)| {
                let value = vector
                    .get(i)
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null);
                (spec.name.clone(), value)
            })
            .collect();
        Self { preprocessed_data }
    }
}

#[derive(Debug, Serialize)]
pub struct PredictionDto {
    pub prediction_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "MASK_ID")]
    pub mask_id: Option<Value>,
    pub prediction: &'static str,
    pub probability: f64,
    pub class_label: &'static str,
    pub confidence: &'static str,
    pub model_id: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&Prediction> for PredictionDto {
    fn from(p: &Prediction) -> Self {
        Self {
            prediction_id: p.prediction_id.clone(),
            mask_id: p.mask_id.clone(),
            prediction: p.class_label.display_name(),
            probability: p.probability,
            class_label: p.class_label.description(),
            confidence: p.confidence_band.as_str(),
            model_id: p.model_id.clone(),
            timestamp: p.timestamp,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BatchFailureDto {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "MASK_ID")]
    pub mask_id: Option<Value>,
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_columns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_values: Option<Vec<InvalidValueDto>>,
}

#[derive(Debug, Serialize)]
pub struct BatchSummaryDto {
    pub total_records: usize,
    pub good_subjects: usize,
    pub bad_subjects: usize,
    pub failed_records: usize,
    pub not_attempted: usize,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub predictions: Vec<PredictionDto>,
    pub failures: Vec<BatchFailureDto>,
    pub not_attempted: Vec<usize>,
    pub summary: BatchSummaryDto,
}

impl From<&BatchOutcome> for BatchResponse {
    fn from(outcome: &BatchOutcome) -> Self {
        let mut predictions = Vec::new();
        let mut failures = Vec::new();
        let mut not_attempted = Vec::new();
        for item in &outcome.items {
            match &item.outcome {
                BatchItemOutcome::Predicted(p) => predictions.push(PredictionDto::from(p)),
                BatchItemOutcome::Failed(f) => {
                    let (missing, invalid) = match &f.report {
                        Some(report) => (
                            Some(report.missing_fields.clone()),
                            Some(
                                report
                                    .invalid_fields
                                    .iter()
                                    .map(|v| InvalidValueDto {
                                        field: v.field.clone(),
                                        reason: v.reason.as_str(),
                                        detail: v.detail.clone(),
                                    })
                                    .collect(),
                            ),
                        ),
                        None => (None, None),
                    };
                    failures.push(BatchFailureDto {
                        index: item.index,
                        mask_id: item.mask_id.clone(),
                        kind: f.kind.clone(),
                        message: f.message.clone(),
                        missing_columns: missing,
                        invalid_values: invalid,
                    });
                }
                BatchItemOutcome::NotAttempted => not_attempted.push(item.index),
            }
        }
        Self {
            predictions,
            failures,
            not_attempted,
            summary: BatchSummaryDto {
                total_records: outcome.summary.total_records,
                good_subjects: outcome.summary.good_subjects,
                bad_subjects: outcome.summary.bad_subjects,
                failed_records: outcome.summary.failed_records,
                not_attempted: outcome.summary.not_attempted,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ContributionDto {
    pub feature: String,
    pub value: f64,
    pub impact: f64,
}

#[derive(Debug, Serialize)]
pub struct ShapValuesDto {
    pub base_value: f64,
    pub features: BTreeMap<String, f64>,
}

#[derive(Debug, Serialize)]
pub struct ExplanationBodyDto {
    pub top_positive_features: Vec<ContributionDto>,
    pub top_negative_features: Vec<ContributionDto>,
    pub shap_values: ShapValuesDto,
}

#[derive(Debug, Serialize)]
pub struct ExplainResponse {
    pub prediction: &'static str,
    pub probability: f64,
    pub model_id: String,
    pub explanation: ExplanationBodyDto,
}

impl From<&ExplanationReport> for ExplainResponse {
    fn from(report: &ExplanationReport) -> Self {
        let to_dto = |c: &crate::engine::FeatureContribution| ContributionDto {
            feature: c.feature.clone(),
            value: c.value,
            impact: c.impact,
        };
        Self {
            prediction: report.class_label.display_name(),
            probability: report.probability,
            model_id: report.model_id.clone(),
            explanation: ExplanationBodyDto {
                top_positive_features: report.top_positive_features.iter().map(to_dto).collect(),
                top_negative_features: report.top_negative_features.iter().map(to_dto).collect(),
                shap_values: ShapValuesDto {
                    base_value: report.explanation.base_value,
                    features: report
                        .explanation
                        .contributions
                        .iter()
                        .map(|c| (c.feature.clone(), c.impact))
                        .collect(),
                },
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ModelDto {
    pub model_id: String,
    pub version: String,
    pub algorithm: String,
    pub training_date: NaiveDate,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub roc_auc: f64,
    pub status: ModelStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<&ModelVersion> for ModelDto {
    fn from(v: &ModelVersion) -> Self {
        Self {
            model_id: v.model_id.clone(),
            version: v.version.clone(),
            algorithm: v.algorithm.clone(),
            training_date: v.training_date,
            accuracy: v.metrics.accuracy,
            precision: v.metrics.precision,
            recall: v.metrics.recall,
            f1_score: v.metrics.f1_score,
            roc_auc: v.metrics.roc_auc,
            status: v.status,
            description: v.description.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelDto>,
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub status: &'static str,
    pub last_evaluated: DateTime<Utc>,
    pub sample_size: usize,
    pub window_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recall: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub f1_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roc_auc: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confusion_matrix: Option<crate::history::ConfusionMatrix>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_class_metrics: Option<BTreeMap<String, crate::history::ClassMetrics>>,
}

impl From<MetricsSnapshot> for MetricsResponse {
    fn from(snapshot: MetricsSnapshot) -> Self {
        match snapshot.evaluated {
            Some(evaluated) => Self {
                status: "ok",
                last_evaluated: snapshot.last_evaluated,
                sample_size: snapshot.sample_size,
                window_size: snapshot.window_size,
                accuracy: Some(evaluated.accuracy),
                precision: Some(evaluated.precision),
                recall: Some(evaluated.recall),
                f1_score: Some(evaluated.f1_score),
                roc_auc: evaluated.roc_auc,
                confusion_matrix: Some(evaluated.confusion_matrix),
                per_class_metrics: Some(evaluated.per_class_metrics),
            },
            None => Self {
                status: "unavailable",
                last_evaluated: snapshot.last_evaluated,
                sample_size: snapshot.sample_size,
                window_size: snapshot.window_size,
                accuracy: None,
                precision: None,
                recall: None,
                f1_score: None,
                roc_auc: None,
                confusion_matrix: None,
                per_class_metrics: None,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryItemDto {
    pub prediction_id: String,
    pub timestamp: DateTime<Utc>,
    pub prediction: &'static str,
    pub probability: f64,
    pub confidence: &'static str,
    pub model_name: String,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub predictions: Vec<HistoryItemDto>,
    pub total_predictions: usize,
    pub page: usize,
    pub page_size: usize,
}

impl From<HistoryPage> for HistoryResponse {
    fn from(page: HistoryPage) -> Self {
        Self {
            predictions: page
                .items
                .iter()
                .map(|p| HistoryItemDto {
                    prediction_id: p.prediction_id.clone(),
                    timestamp: p.timestamp,
                    prediction: p.class_label.display_name(),
                    probability: p.probability,
                    confidence: p.confidence_band.as_str(),
                    model_name: p.model_id.clone(),
                })
                .collect(),
            total_predictions: page.total_count,
            page: page.page,
            page_size: page.page_size,
        }
    }
}

/// Query parameters for `GET /api/history`.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub page: Option<usize>,
    pub size: Option<usize>,
    /// Filter by predicted class display name ("Good Subject"/"Bad Subject").
    pub prediction: Option<String>,
    pub model_id: Option<String>,
}

/// Query parameters for `GET /api/metrics`.
#[derive(Debug, Default, Deserialize)]
pub struct MetricsQuery {
    pub last_n: Option<usize>,
    pub model_id: Option<String>,
}

/// Query parameters for `POST /api/predict/batch`.
#[derive(Debug, Default, Deserialize)]
pub struct BatchQuery {
    /// Soft deadline for the whole batch in milliseconds.
    pub timeout_ms: Option<u64>,
}

/// Body for `POST /api/history/:id/outcome`.
#[derive(Debug, Deserialize)]
pub struct OutcomeRequest {
    /// Observed outcome as a class display name.
    pub actual: String,
}

/// Body for `POST /api/models/:id/deploy` response.
#[derive(Debug, Serialize)]
pub struct DeployResponse {
    pub deployment_id: uuid::Uuid,
    pub previous_model: Option<String>,
    pub new_model: String,
    pub status: ModelStatus,
    pub deployment_time: DateTime<Utc>,
    pub message: String,
}
