//! Deterministic preprocessing of validated records
//!
//! Transforms a raw record into the fully-numeric vector the trained model
//! consumes. Every declared feature appears in the output, in schema order,
//! guaranteeing column alignment with the artifact. The transformation is
//! pure: same record and schema in, same vector out.

use serde_json::Value;

use super::validator::numeric_value;
use super::{FeatureKind, FeatureSchema, FeatureSpec, Record};
use crate::error::{ServingError, ServingResult};

/// Model-ready numeric representation of one record, column-aligned with the
/// schema. Derived, never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: Vec<f64>,
}

impl FeatureVector {
    pub(crate) fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }
}

/// Preprocess a record into a feature vector.
///
/// `impute_missing` selects between schema-default imputation and a NaN
/// sentinel for absent optional fields. Fails only when a present value
/// cannot be coerced after validation has already accepted the record.
pub fn preprocess(
    record: &Record,
    schema: &FeatureSchema,
    impute_missing: bool,
) -> ServingResult<FeatureVector> {
    let mut values = Vec::with_capacity(schema.len());
    for spec in schema.iter() {
        let encoded = match record.get(&spec.name) {
            None | Some(Value::Null) => missing_value(spec, impute_missing)?,
            Some(value) => encode(spec, value)?,
        };
        values.push(encoded);
    }
    Ok(FeatureVector::new(values))
}

fn missing_value(spec: &FeatureSpec, impute: bool) -> ServingResult<f64> {
    if spec.required {
        // Validation rejects absent required fields; reaching this branch
        // means the caller skipped validation.
        return Err(ServingError::preprocessing(
            &spec.name,
            "required field absent after validation",
        ));
    }
    if impute {
        Ok(spec.default.unwrap_or(0.0))
    } else {
        Ok(f64::NAN)
    }
}

fn encode(spec: &FeatureSpec, value: &Value) -> ServingResult<f64> {
    match spec.kind {
        FeatureKind::Numeric => numeric_value(value).ok_or_else(|| {
            ServingError::preprocessing(
                &spec.name,
                format!("cannot coerce {} to numeric", value),
            )
        }),
        FeatureKind::Categorical => {
            let allowed = spec.allowed_values.as_deref().unwrap_or(&[]);
            // Encoding is the position in the declared category ordering.
            for (code, candidate) in allowed.iter().enumerate() {
                if category_matches(candidate, value) {
                    return Ok(code as f64);
                }
            }
            Err(ServingError::preprocessing(
                &spec.name,
                format!("value {} has no category code", value),
            ))
        }
    }
}

fn category_matches(candidate: &Value, value: &Value) -> bool {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FeatureSpec;
    use serde_json::json;

    fn test_schema() -> FeatureSchema {
        FeatureSchema::new(vec![
            FeatureSpec::categorical("agecat", vec![json!(1), json!(2), json!(3)]).required(),
            FeatureSpec::numeric("T_stage").required().with_bounds(0.0, 4.0),
            FeatureSpec {
                default: Some(1.0),
                ..FeatureSpec::numeric("PERFORMANCE_ID")
            },
            FeatureSpec::numeric("num_pos_lymph_node"),
        ])
        .unwrap()
    }

    fn record(value: serde_json::Value) -> Record {
        match value {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_output_aligned_with_schema_order() {
        let schema = test_schema();
        let vector = preprocess(
            &record(json!({"T_stage": 2, "agecat": 2, "num_pos_lymph_node": 5})),
            &schema,
            true,
        )
        .unwrap();
        assert_eq!(vector.len(), schema.len());
        // agecat=2 encodes to category position 1.
        assert_eq!(vector.as_slice(), &[1.0, 2.0, 1.0, 5.0]);
    }

    #[test]
    fn test_missing_optional_imputed_with_default() {
        let vector = preprocess(
            &record(json!({"agecat": 1, "T_stage": 0})),
            &test_schema(),
            true,
        )
        .unwrap();
        assert_eq!(vector.get(2), Some(1.0)); // declared default
        assert_eq!(vector.get(3), Some(0.0)); // implicit default
    }

    #[test]
    fn test_missing_optional_sentinel_when_not_imputing() {
        let vector = preprocess(
            &record(json!({"agecat": 1, "T_stage": 0})),
            &test_schema(),
            false,
        )
        .unwrap();
        assert!(vector.get(2).unwrap().is_nan());
    }

    #[test]
    fn test_missing_required_is_preprocessing_error() {
        let err = preprocess(&record(json!({"agecat": 1})), &test_schema(), true).unwrap_err();
        assert_eq!(err.kind(), "preprocessing_error");
    }

    #[test]
    fn test_uncoercible_value_is_preprocessing_error() {
        let err = preprocess(
            &record(json!({"agecat": 1, "T_stage": {"nested": true}})),
            &test_schema(),
            true,
        )
        .unwrap_err();
        assert_eq!(err.kind(), "preprocessing_error");
    }

    #[test]
    fn test_deterministic() {
        let schema = test_schema();
        let rec = record(json!({"agecat": 3, "T_stage": 4, "num_pos_lymph_node": 2}));
        let a = preprocess(&rec, &schema, true).unwrap();
        let b = preprocess(&rec, &schema, true).unwrap();
        assert_eq!(a, b);
    }
}
