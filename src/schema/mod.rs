//! Feature schema registry
//!
//! Declares the feature set the trained model was fitted on: name, kind,
//! required flag, and domain constraints per feature. The schema is built
//! once at service startup from the model's metadata (a YAML asset) and is
//! immutable thereafter; the validator and preprocessor both consult it.

pub mod preprocess;
pub mod validator;

pub use preprocess::{preprocess, FeatureVector};
pub use validator::{validate, InvalidField, InvalidReason, ValidationReport};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ServingError, ServingResult};

/// A raw input record: feature name to JSON value (number, string, or null).
/// Records may be partial; unknown keys are tolerated for forward
/// compatibility with evolving clients.
pub type Record = serde_json::Map<String, Value>;

/// Kind of a model input column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    Categorical,
    Numeric,
}

impl FeatureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureKind::Categorical => "categorical",
            FeatureKind::Numeric => "numeric",
        }
    }
}

/// Schema entry describing one model input column.
///
/// Categorical specs declare `allowed_values` (the declared ordering also
/// fixes the numeric encoding); numeric specs may declare `min_value` /
/// `max_value` bounds. A spec never carries both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FeatureKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    /// Imputation value for missing optional fields (0 when unspecified).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<f64>,
}

impl FeatureSpec {
    pub fn numeric(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FeatureKind::Numeric,
            required: false,
            description: None,
            allowed_values: None,
            min_value: None,
            max_value: None,
            default: None,
        }
    }

    pub fn categorical(name: impl Into<String>, allowed: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            kind: FeatureKind::Categorical,
            required: false,
            description: None,
            allowed_values: Some(allowed),
            min_value: None,
            max_value: None,
            default: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_bounds(mut self, min: f64, max: f64) -> Self {
        self.min_value = Some(min);
        self.max_value = Some(max);
        self
    }
}

/// On-disk schema asset shape.
#[derive(Debug, Deserialize)]
struct SchemaFile {
    #[serde(default)]
    target: Option<String>,
    features: Vec<FeatureSpec>,
}

/// Ordered, immutable set of feature specs with unique names.
#[derive(Debug, Clone)]
pub struct FeatureSchema {
    features: Vec<FeatureSpec>,
    index: HashMap<String, usize>,
    target: Option<String>,
}

impl FeatureSchema {
    /// Build a schema, enforcing structural invariants: unique names, no
    /// bounds on categorical specs, no allowed-value lists on numeric specs.
    pub fn new(features: Vec<FeatureSpec>) -> ServingResult<Self> {
        let mut index = HashMap::with_capacity(features.len());
        for (i, spec) in features.iter().enumerate() {
            if index.insert(spec.name.clone(), i).is_some() {
                return Err(ServingError::catalog(format!(
                    "duplicate feature name '{}' in schema",
                    spec.name
                )));
            }
            match spec.kind {
                FeatureKind::Categorical => {
                    if spec.min_value.is_some() || spec.max_value.is_some() {
                        return Err(ServingError::catalog(format!(
                            "categorical feature '{}' must not declare min/max bounds",
                            spec.name
                        )));
                    }
                    match &spec.allowed_values {
                        Some(values) if !values.is_empty() => {}
                        _ => {
                            return Err(ServingError::catalog(format!(
                                "categorical feature '{}' must declare allowed_values",
                                spec.name
                            )))
                        }
                    }
                }
                FeatureKind::Numeric => {
                    if spec.allowed_values.is_some() {
                        return Err(ServingError::catalog(format!(
                            "numeric feature '{}' must not declare allowed_values",
                            spec.name
                        )));
                    }
                    if let (Some(min), Some(max)) = (spec.min_value, spec.max_value) {
                        if min > max {
                            return Err(ServingError::catalog(format!(
                                "feature '{}' has min {} > max {}",
                                spec.name, min, max
                            )));
                        }
                    }
                }
            }
        }
        Ok(Self {
            features,
            index,
            target: None,
        })
    }

    /// Parse a schema from its YAML asset.
    pub fn from_yaml_str(yaml: &str) -> ServingResult<Self> {
        let file: SchemaFile = serde_yaml::from_str(yaml)?;
        let mut schema = Self::new(file.features)?;
        schema.target = file.target;
        Ok(schema)
    }

    /// The schema shipped with the trained adherence classifier.
    pub fn builtin() -> ServingResult<Self> {
        Self::from_yaml_str(include_str!("../../config/schema.yaml"))
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeatureSpec> {
        self.features.iter()
    }

    pub fn get(&self, name: &str) -> Option<&FeatureSpec> {
        self.index.get(name).map(|&i| &self.features[i])
    }

    /// Column position of a feature in the model's input order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn categorical_count(&self) -> usize {
        self.features
            .iter()
            .filter(|f| f.kind == FeatureKind::Categorical)
            .count()
    }

    pub fn numeric_count(&self) -> usize {
        self.features
            .iter()
            .filter(|f| f.kind == FeatureKind::Numeric)
            .count()
    }

    /// Prediction target declared by the model metadata, if any.
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }
}

/// Parse a record out of an arbitrary JSON value, rejecting non-objects.
pub fn record_from_value(value: Value) -> ServingResult<Record> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(ServingError::catalog(format!(
            "expected a JSON object record, got {}",
            type_name_of(&other)
        ))),
    }
}

pub(crate) fn type_name_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
