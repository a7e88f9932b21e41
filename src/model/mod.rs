//! Model catalog data structures and the versioned registry
//!
//! A [`ModelVersion`] is metadata about one trained artifact; the
//! [`registry::ModelRegistry`] owns the lifecycle of every version and
//! enforces the exactly-one-deployed invariant.

pub mod catalog;
pub mod predictor;
pub mod registry;

pub use catalog::ModelCatalog;
pub use predictor::{EnsembleModel, LinearModel, Predictor, RawAttribution, Stump, TreeModel};
pub use registry::{DeploymentOutcome, ModelRegistry};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a model version.
///
/// Permitted transitions: testing -> validated -> deployed -> retired, plus
/// validated -> retired for rejected candidates. Retired versions are kept
/// for audit and history reproducibility, never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    Testing,
    Validated,
    Deployed,
    Retired,
}

impl ModelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelStatus::Testing => "testing",
            ModelStatus::Validated => "validated",
            ModelStatus::Deployed => "deployed",
            ModelStatus::Retired => "retired",
        }
    }
}

impl std::fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Offline evaluation metrics recorded when the artifact was trained.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub roc_auc: f64,
}

/// Metadata for one trained model version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelVersion {
    pub model_id: String,
    pub version: String,
    pub algorithm: String,
    pub training_date: NaiveDate,
    pub metrics: TrainingMetrics,
    pub status: ModelStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
