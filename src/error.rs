//! Error handling for the adherence serving backend
//!
//! This module provides idiomatic Rust error types using thiserror. Every
//! variant carries a stable machine-readable kind (returned by
//! [`ServingError::kind`]) alongside a human-readable message, so callers can
//! branch on failures without parsing display strings.

use thiserror::Error;

use crate::schema::ValidationReport;

/// Main error type for the serving backend
#[derive(Error, Debug)]
pub enum ServingError {
    /// The submitted record failed schema validation. User-correctable.
    #[error("Validation failed: {}", .report.message)]
    Validation { report: ValidationReport },

    /// No model currently holds deployed status.
    #[error("No deployed model is available to serve predictions")]
    ModelUnavailable,

    /// The referenced model id does not exist in the registry.
    #[error("Model '{model_id}' is not registered")]
    UnknownModel { model_id: String },

    /// The registry holds no active model (empty or all versions retired).
    #[error("Model registry has no active model")]
    NoActiveModel,

    /// The requested lifecycle transition is not permitted.
    #[error("Model '{model_id}' cannot move from '{from}' to '{to}'")]
    InvalidTransition {
        model_id: String,
        from: String,
        to: String,
    },

    /// A value survived validation but could not be coerced to its declared
    /// type. Indicates a validator/preprocessor mismatch.
    #[error("Preprocessing failed for field '{field}': {message}")]
    Preprocessing { field: String, message: String },

    /// The active model exposes no attribution method.
    #[error("Model '{model_id}' ({algorithm}) does not support explanations")]
    ExplanationUnsupported { model_id: String, algorithm: String },

    /// The referenced prediction id does not exist in the history store.
    #[error("Prediction '{prediction_id}' not found in history")]
    UnknownPrediction { prediction_id: String },

    /// A caller-supplied class label is not one of the known display names.
    /// User-correctable.
    #[error("Unknown class label '{label}'; expected 'Good Subject' or 'Bad Subject'")]
    UnknownLabel { label: String },

    /// Schema or model catalog configuration could not be loaded.
    #[error("Catalog error: {message}")]
    Catalog { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ServingError {
    /// Stable machine-readable error kind for API payloads and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ServingError::Validation { .. } => "validation_failure",
            ServingError::ModelUnavailable => "model_unavailable",
            ServingError::UnknownModel { .. } => "unknown_model",
            ServingError::NoActiveModel => "no_active_model",
            ServingError::InvalidTransition { .. } => "invalid_transition",
            ServingError::Preprocessing { .. } => "preprocessing_error",
            ServingError::ExplanationUnsupported { .. } => "explanation_unsupported",
            ServingError::UnknownPrediction { .. } => "unknown_prediction",
            ServingError::UnknownLabel { .. } => "unknown_label",
            ServingError::Catalog { .. } => "catalog_error",
            ServingError::Io(_) => "io_error",
            ServingError::Serialization(_) => "serialization_error",
            ServingError::Yaml(_) => "config_parse_error",
        }
    }

    /// Whether the failure is user-correctable (4xx-equivalent) as opposed
    /// to a server-side or registry-state condition.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServingError::Validation { .. }
                | ServingError::UnknownModel { .. }
                | ServingError::UnknownPrediction { .. }
                | ServingError::UnknownLabel { .. }
        )
    }

    pub fn catalog(message: impl Into<String>) -> Self {
        ServingError::Catalog {
            message: message.into(),
        }
    }

    pub fn preprocessing(field: impl Into<String>, message: impl Into<String>) -> Self {
        ServingError::Preprocessing {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for convenience
pub type ServingResult<T> = Result<T, ServingError>;
