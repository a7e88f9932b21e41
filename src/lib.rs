//! Prediction-serving and explainability backend for the adherence
//! classifier.
//!
//! The pipeline: a record is validated against the feature schema,
//! preprocessed into a column-aligned vector, scored by the active model
//! from the registry, appended to the prediction history, and optionally
//! decomposed into additive per-feature contributions.
//!
//! Hard invariants this crate maintains:
//! - exactly one model version is deployed at any instant;
//! - explanations reconcile: base value plus the contribution sum equals
//!   the predicted probability within 1e-6;
//! - history is append-only with monotonic-sortable ids and stable,
//!   1-indexed pagination.

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod model;
pub mod schema;

// Re-export commonly used types for convenience
pub use config::{DemotionPolicy, ServingConfig};
pub use engine::{BatchOutcome, ExplanationReport, PredictionEngine};
pub use error::{ServingError, ServingResult};
pub use history::{ClassLabel, ConfidenceBand, HistoryStore, Prediction};
pub use model::{ModelCatalog, ModelRegistry, ModelStatus, ModelVersion};
pub use schema::{FeatureSchema, FeatureSpec, Record};
