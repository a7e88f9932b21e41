//! Model catalog loading
//!
//! The catalog YAML declares every trained version shipped with the service:
//! registry metadata plus an artifact description that is materialized into
//! a concrete [`Predictor`] against the feature schema. Loaded once at
//! startup and seeded into the registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::info;

use super::predictor::{EnsembleModel, LinearModel, Predictor, Stump, TreeModel};
use super::registry::ModelRegistry;
use super::{ModelStatus, ModelVersion, TrainingMetrics};
use crate::error::{ServingError, ServingResult};
use crate::schema::FeatureSchema;

/// Artifact description, resolved by feature name so catalog files stay
/// readable and independent of column order.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ArtifactSpec {
    Linear {
        intercept: f64,
        weights: BTreeMap<String, f64>,
        #[serde(default)]
        baselines: BTreeMap<String, f64>,
    },
    Tree {
        bias: f64,
        stumps: Vec<StumpSpec>,
    },
    Ensemble {
        members: Vec<MemberSpec>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct StumpSpec {
    pub feature: String,
    pub threshold: f64,
    pub below: f64,
    pub above: f64,
    #[serde(default)]
    pub baseline: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemberSpec {
    pub weight: f64,
    pub artifact: ArtifactSpec,
}

impl ArtifactSpec {
    /// Materialize the spec into a predictor column-aligned with `schema`.
    pub fn build(&self, schema: &FeatureSchema) -> ServingResult<Arc<dyn Predictor>> {
        match self {
            ArtifactSpec::Linear {
                intercept,
                weights,
                baselines,
            } => {
                let mut weight_vec = vec![0.0; schema.len()];
                let mut baseline_vec = vec![0.0; schema.len()];
                for (name, weight) in weights {
                    let index = resolve(schema, name)?;
                    weight_vec[index] = *weight;
                }
                for (name, baseline) in baselines {
                    let index = resolve(schema, name)?;
                    baseline_vec[index] = *baseline;
                }
                Ok(Arc::new(LinearModel::new(*intercept, weight_vec, baseline_vec)))
            }
            ArtifactSpec::Tree { bias, stumps } => {
                let mut resolved = Vec::with_capacity(stumps.len());
                for stump in stumps {
                    resolved.push(Stump {
                        feature: resolve(schema, &stump.feature)?,
                        threshold: stump.threshold,
                        below: stump.below,
                        above: stump.above,
                        baseline: stump.baseline,
                    });
                }
                Ok(Arc::new(TreeModel::new(*bias, resolved, schema.len())))
            }
            ArtifactSpec::Ensemble { members } => {
                let mut built = Vec::with_capacity(members.len());
                for member in members {
                    built.push((member.weight, member.artifact.build(schema)?));
                }
                Ok(Arc::new(EnsembleModel::new(built)))
            }
        }
    }
}

fn resolve(schema: &FeatureSchema, name: &str) -> ServingResult<usize> {
    schema.position(name).ok_or_else(|| {
        ServingError::catalog(format!("catalog references unknown feature '{}'", name))
    })
}

fn default_status() -> ModelStatus {
    ModelStatus::Testing
}

/// One catalog entry: registry metadata plus the artifact description.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    pub model_id: String,
    pub version: String,
    pub algorithm: String,
    pub training_date: NaiveDate,
    #[serde(default = "default_status")]
    pub status: ModelStatus,
    pub metrics: TrainingMetrics,
    #[serde(default)]
    pub description: Option<String>,
    pub artifact: ArtifactSpec,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    models: Vec<CatalogEntry>,
}

/// Parsed model catalog.
#[derive(Debug)]
pub struct ModelCatalog {
    entries: Vec<CatalogEntry>,
}

impl ModelCatalog {
    pub fn from_yaml_str(yaml: &str) -> ServingResult<Self> {
        let file: CatalogFile = serde_yaml::from_str(yaml)?;
        if file.models.is_empty() {
            return Err(ServingError::catalog("model catalog declares no models"));
        }
        Ok(Self {
            entries: file.models,
        })
    }

    /// The catalog shipped with the service.
    pub fn builtin() -> ServingResult<Self> {
        Self::from_yaml_str(include_str!("../../config/models.yaml"))
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Build every artifact and seed the registry. Returns the number of
    /// versions registered.
    pub fn seed_into(
        &self,
        registry: &ModelRegistry,
        schema: &FeatureSchema,
    ) -> ServingResult<usize> {
        for entry in &self.entries {
            let artifact = entry.artifact.build(schema)?;
            registry.seed(
                ModelVersion {
                    model_id: entry.model_id.clone(),
                    version: entry.version.clone(),
                    algorithm: entry.algorithm.clone(),
                    training_date: entry.training_date,
                    metrics: entry.metrics,
                    status: entry.status,
                    description: entry.description.clone(),
                },
                artifact,
            )?;
        }
        info!(models = self.entries.len(), "seeded model registry from catalog");
        Ok(self.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DemotionPolicy;

    #[test]
    fn test_builtin_catalog_seeds_registry() {
        let schema = FeatureSchema::builtin().unwrap();
        let catalog = ModelCatalog::builtin().unwrap();
        let registry = ModelRegistry::new(DemotionPolicy::Validated);
        let count = catalog.seed_into(&registry, &schema).unwrap();
        assert!(count >= 2);
        assert_eq!(registry.deployed_count(), 1);

        let active = registry.get_active().unwrap();
        assert_eq!(active.version.model_id, "model_v1");
    }

    #[test]
    fn test_unknown_feature_rejected() {
        let schema = FeatureSchema::builtin().unwrap();
        let yaml = r#"
models:
  - model_id: bad
    version: "1.0.0"
    algorithm: LogisticRegression
    training_date: 2024-01-01
    metrics: {accuracy: 0.5, precision: 0.5, recall: 0.5, f1_score: 0.5, roc_auc: 0.5}
    artifact:
      type: linear
      intercept: 0.0
      weights: {no_such_feature: 1.0}
"#;
        let catalog = ModelCatalog::from_yaml_str(yaml).unwrap();
        let registry = ModelRegistry::new(DemotionPolicy::Validated);
        let err = catalog.seed_into(&registry, &schema).unwrap_err();
        assert_eq!(err.kind(), "catalog_error");
    }

    #[test]
    fn test_empty_catalog_rejected() {
        assert!(ModelCatalog::from_yaml_str("models: []").is_err());
    }
}
