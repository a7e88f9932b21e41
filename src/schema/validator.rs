//! Record validation against the feature schema
//!
//! Produces a structured report instead of raising: missing required fields
//! and per-field constraint violations are collected in schema order so the
//! output is deterministic. Unknown fields are ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{type_name_of, FeatureKind, FeatureSchema, FeatureSpec, Record};

/// Machine-readable reason a field failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    NotInDomain,
    OutOfRange,
    TypeMismatch,
}

impl InvalidReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidReason::NotInDomain => "not_in_domain",
            InvalidReason::OutOfRange => "out_of_range",
            InvalidReason::TypeMismatch => "type_mismatch",
        }
    }
}

/// One field-level violation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidField {
    pub field: String,
    pub reason: InvalidReason,
    pub detail: String,
}

/// Outcome of validating one record. Produced fresh per call; never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub missing_fields: Vec<String>,
    pub invalid_fields: Vec<InvalidField>,
    pub message: String,
}

impl ValidationReport {
    fn build(missing_fields: Vec<String>, invalid_fields: Vec<InvalidField>) -> Self {
        let is_valid = missing_fields.is_empty() && invalid_fields.is_empty();
        let message = if is_valid {
            "Data validation successful".to_string()
        } else {
            format!(
                "Validation failed: {} missing field(s), {} invalid value(s)",
                missing_fields.len(),
                invalid_fields.len()
            )
        };
        Self {
            is_valid,
            missing_fields,
            invalid_fields,
            message,
        }
    }
}

/// Validate a record against the schema.
///
/// Never panics on malformed values; structurally broken payloads (non-object
/// bodies) are rejected at the transport layer before this is reached.
pub fn validate(record: &Record, schema: &FeatureSchema) -> ValidationReport {
    let mut missing = Vec::new();
    let mut invalid = Vec::new();

    for spec in schema.iter() {
        match record.get(&spec.name) {
            None | Some(Value::Null) => {
                if spec.required {
                    missing.push(spec.name.clone());
                }
            }
            Some(value) => {
                if let Some(entry) = check_value(spec, value) {
                    invalid.push(entry);
                }
            }
        }
    }

    ValidationReport::build(missing, invalid)
}

fn check_value(spec: &FeatureSpec, value: &Value) -> Option<InvalidField> {
    match spec.kind {
        FeatureKind::Categorical => check_categorical(spec, value),
        FeatureKind::Numeric => check_numeric(spec, value),
    }
}

fn check_categorical(spec: &FeatureSpec, value: &Value) -> Option<InvalidField> {
    let allowed = spec.allowed_values.as_deref().unwrap_or(&[]);
    if allowed.iter().any(|candidate| values_equal(candidate, value)) {
        return None;
    }
    Some(InvalidField {
        field: spec.name.clone(),
        reason: InvalidReason::NotInDomain,
        detail: format!("value {} is not in the declared domain", value),
    })
}

fn check_numeric(spec: &FeatureSpec, value: &Value) -> Option<InvalidField> {
    let number = match numeric_value(value) {
        Some(n) => n,
        None => {
            return Some(InvalidField {
                field: spec.name.clone(),
                reason: InvalidReason::TypeMismatch,
                detail: format!(
                    "expected a number, got {} {}",
                    type_name_of(value),
                    value
                ),
            })
        }
    };
    if let Some(min) = spec.min_value {
        if number < min {
            return Some(out_of_range(spec, number));
        }
    }
    if let Some(max) = spec.max_value {
        if number > max {
            return Some(out_of_range(spec, number));
        }
    }
    None
}

fn out_of_range(spec: &FeatureSpec, number: f64) -> InvalidField {
    InvalidField {
        field: spec.name.clone(),
        reason: InvalidReason::OutOfRange,
        detail: format!(
            "value {} outside range {}-{}",
            number,
            spec.min_value.map_or("-inf".to_string(), |v| v.to_string()),
            spec.max_value.map_or("+inf".to_string(), |v| v.to_string()),
        ),
    }
}

/// Numeric interpretation of a JSON value: numbers directly, strings via
/// parsing. Booleans are deliberately not coerced.
pub(crate) fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Equality for categorical membership: numeric values compare numerically
/// (so `2` matches `2.0`), strings compare exactly.
fn values_equal(candidate: &Value, value: &Value) -> bool {
    match (candidate, value) {
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Number(_), _) | (_, Value::Number(_)) => {
            match (numeric_value(candidate), numeric_value(value)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        }
        (a, b) => a == b,
    }
}
