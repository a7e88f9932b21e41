//! Versioned model registry with an atomic active-model pointer
//!
//! At most one version holds deployed status at any instant. Deployment is
//! a single critical section under a write lock: demote the old active,
//! promote the target, move the pointer. Readers take the read lock only
//! long enough to clone metadata and the artifact handle; no I/O happens
//! inside either section.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::predictor::Predictor;
use super::{ModelStatus, ModelVersion, TrainingMetrics};
use crate::config::DemotionPolicy;
use crate::error::{ServingError, ServingResult};

/// Metadata supplied when registering a freshly trained artifact.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelRegistration {
    pub model_id: String,
    pub version: String,
    pub algorithm: String,
    pub training_date: NaiveDate,
    pub metrics: TrainingMetrics,
    #[serde(default)]
    pub description: Option<String>,
}

/// Result of a deploy call, echoed to the operator.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentOutcome {
    /// Audit id for this deployment event.
    pub deployment_id: Uuid,
    pub previous_model: Option<String>,
    pub new_model: String,
    pub status: ModelStatus,
    pub deployment_time: DateTime<Utc>,
    pub message: String,
}

/// The active version plus its artifact handle, cloned out of the registry
/// so prediction paths never hold the lock.
#[derive(Clone)]
pub struct ActiveModel {
    pub version: ModelVersion,
    pub artifact: Arc<dyn Predictor>,
}

impl std::fmt::Debug for ActiveModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveModel")
            .field("version", &self.version)
            .field("artifact", &self.artifact.family())
            .finish()
    }
}

struct Entry {
    version: ModelVersion,
    artifact: Arc<dyn Predictor>,
}

#[derive(Default)]
struct Inner {
    entries: Vec<Entry>,
    active: Option<usize>,
}

pub struct ModelRegistry {
    inner: RwLock<Inner>,
    demotion: DemotionPolicy,
}

impl ModelRegistry {
    pub fn new(demotion: DemotionPolicy) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            demotion,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register a trained artifact. New versions always start in testing.
    pub fn register(
        &self,
        registration: ModelRegistration,
        artifact: Arc<dyn Predictor>,
    ) -> ServingResult<ModelVersion> {
        let version = ModelVersion {
            model_id: registration.model_id,
            version: registration.version,
            algorithm: registration.algorithm,
            training_date: registration.training_date,
            metrics: registration.metrics,
            status: ModelStatus::Testing,
            description: registration.description,
        };
        self.insert(version, artifact)
    }

    /// Seed a version in a declared status (catalog load at startup).
    pub fn seed(
        &self,
        version: ModelVersion,
        artifact: Arc<dyn Predictor>,
    ) -> ServingResult<ModelVersion> {
        self.insert(version, artifact)
    }

    fn insert(
        &self,
        version: ModelVersion,
        artifact: Arc<dyn Predictor>,
    ) -> ServingResult<ModelVersion> {
        let mut inner = self.write();
        if inner
            .entries
            .iter()
            .any(|e| e.version.model_id == version.model_id)
        {
            return Err(ServingError::catalog(format!(
                "model id '{}' already registered",
                version.model_id
            )));
        }
        if version.status == ModelStatus::Deployed && inner.active.is_some() {
            return Err(ServingError::catalog(format!(
                "model '{}' declared deployed but another model already is",
                version.model_id
            )));
        }
        info!(
            model_id = %version.model_id,
            status = %version.status,
            "registered model version"
        );
        let index = inner.entries.len();
        if version.status == ModelStatus::Deployed {
            inner.active = Some(index);
        }
        inner.entries.push(Entry {
            version: version.clone(),
            artifact,
        });
        Ok(version)
    }

    /// Promote a testing version to validated.
    pub fn validate_model(&self, model_id: &str) -> ServingResult<ModelVersion> {
        let mut inner = self.write();
        let index = find(&inner, model_id)?;
        let current = inner.entries[index].version.status;
        if current != ModelStatus::Testing {
            return Err(invalid_transition(model_id, current, ModelStatus::Validated));
        }
        inner.entries[index].version.status = ModelStatus::Validated;
        Ok(inner.entries[index].version.clone())
    }

    /// Atomically make `model_id` the active model.
    ///
    /// The displaced version is demoted per policy (validated by default);
    /// retirement remains an explicit separate operation. Deploying the
    /// already-active model is a success no-op with previous == new.
    pub fn deploy(&self, model_id: &str) -> ServingResult<DeploymentOutcome> {
        let mut inner = self.write();
        let index = find(&inner, model_id)?;
        let target_status = inner.entries[index].version.status;
        if target_status == ModelStatus::Retired {
            return Err(invalid_transition(model_id, target_status, ModelStatus::Deployed));
        }

        let now = Utc::now();
        if inner.active == Some(index) {
            return Ok(DeploymentOutcome {
                deployment_id: Uuid::new_v4(),
                previous_model: Some(model_id.to_string()),
                new_model: model_id.to_string(),
                status: ModelStatus::Deployed,
                deployment_time: now,
                message: format!("Model {} is already the active model", model_id),
            });
        }

        let previous = if let Some(old) = inner.active {
            let demoted = match self.demotion {
                DemotionPolicy::Validated => ModelStatus::Validated,
                DemotionPolicy::Retired => ModelStatus::Retired,
            };
            inner.entries[old].version.status = demoted;
            Some(inner.entries[old].version.model_id.clone())
        } else {
            None
        };
        inner.entries[index].version.status = ModelStatus::Deployed;
        inner.active = Some(index);

        info!(
            new_model = %model_id,
            previous_model = previous.as_deref().unwrap_or("none"),
            "deployed model"
        );
        Ok(DeploymentOutcome {
            deployment_id: Uuid::new_v4(),
            previous_model: previous,
            new_model: model_id.to_string(),
            status: ModelStatus::Deployed,
            deployment_time: now,
            message: format!("Model {} successfully deployed as active model", model_id),
        })
    }

    /// Retire a deployed or validated version. Retiring the active model
    /// leaves the registry with no active model.
    pub fn retire(&self, model_id: &str) -> ServingResult<ModelVersion> {
        let mut inner = self.write();
        let index = find(&inner, model_id)?;
        let current = inner.entries[index].version.status;
        match current {
            ModelStatus::Deployed | ModelStatus::Validated => {
                inner.entries[index].version.status = ModelStatus::Retired;
                if inner.active == Some(index) {
                    inner.active = None;
                    warn!(model_id = %model_id, "retired the active model; no model is deployed");
                }
                Ok(inner.entries[index].version.clone())
            }
            other => Err(invalid_transition(model_id, other, ModelStatus::Retired)),
        }
    }

    /// The currently deployed model, or NoActiveModel when the registry is
    /// empty or every version has been retired/demoted.
    pub fn get_active(&self) -> ServingResult<ActiveModel> {
        let inner = self.read();
        let index = inner.active.ok_or(ServingError::NoActiveModel)?;
        let entry = &inner.entries[index];
        Ok(ActiveModel {
            version: entry.version.clone(),
            artifact: Arc::clone(&entry.artifact),
        })
    }

    pub fn get(&self, model_id: &str) -> ServingResult<ModelVersion> {
        let inner = self.read();
        let index = find(&inner, model_id)?;
        Ok(inner.entries[index].version.clone())
    }

    /// All versions in registration order.
    pub fn list(&self) -> Vec<ModelVersion> {
        self.read()
            .entries
            .iter()
            .map(|e| e.version.clone())
            .collect()
    }

    /// Count of versions with deployed status. Always 0 or 1.
    pub fn deployed_count(&self) -> usize {
        self.read()
            .entries
            .iter()
            .filter(|e| e.version.status == ModelStatus::Deployed)
            .count()
    }
}

fn find(inner: &Inner, model_id: &str) -> ServingResult<usize> {
    inner
        .entries
        .iter()
        .position(|e| e.version.model_id == model_id)
        .ok_or_else(|| ServingError::UnknownModel {
            model_id: model_id.to_string(),
        })
}

fn invalid_transition(model_id: &str, from: ModelStatus, to: ModelStatus) -> ServingError {
    ServingError::InvalidTransition {
        model_id: model_id.to_string(),
        from: from.as_str().to_string(),
        to: to.as_str().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::predictor::LinearModel;

    fn artifact() -> Arc<dyn Predictor> {
        Arc::new(LinearModel::new(0.0, vec![1.0], vec![0.0]))
    }

    fn registration(id: &str) -> ModelRegistration {
        ModelRegistration {
            model_id: id.to_string(),
            version: "1.0.0".to_string(),
            algorithm: "LogisticRegression".to_string(),
            training_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            metrics: TrainingMetrics {
                accuracy: 0.8,
                precision: 0.8,
                recall: 0.8,
                f1_score: 0.8,
                roc_auc: 0.85,
            },
            description: None,
        }
    }

    #[test]
    fn test_register_starts_in_testing() {
        let registry = ModelRegistry::new(DemotionPolicy::Validated);
        let version = registry.register(registration("model_v1"), artifact()).unwrap();
        assert_eq!(version.status, ModelStatus::Testing);
        assert!(matches!(
            registry.get_active().unwrap_err(),
            ServingError::NoActiveModel
        ));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = ModelRegistry::new(DemotionPolicy::Validated);
        registry.register(registration("model_v1"), artifact()).unwrap();
        assert!(registry.register(registration("model_v1"), artifact()).is_err());
    }

    #[test]
    fn test_deploy_demotes_previous_to_validated() {
        let registry = ModelRegistry::new(DemotionPolicy::Validated);
        registry.register(registration("model_v1"), artifact()).unwrap();
        registry.register(registration("model_v2"), artifact()).unwrap();

        registry.deploy("model_v1").unwrap();
        let outcome = registry.deploy("model_v2").unwrap();
        assert_eq!(outcome.previous_model.as_deref(), Some("model_v1"));
        assert_eq!(outcome.new_model, "model_v2");
        assert_eq!(outcome.status, ModelStatus::Deployed);

        assert_eq!(registry.get("model_v1").unwrap().status, ModelStatus::Validated);
        assert_eq!(registry.get_active().unwrap().version.model_id, "model_v2");
        assert_eq!(registry.deployed_count(), 1);
    }

    #[test]
    fn test_redeploying_active_model_is_noop_success() {
        let registry = ModelRegistry::new(DemotionPolicy::Validated);
        registry.register(registration("model_v1"), artifact()).unwrap();
        registry.deploy("model_v1").unwrap();
        let outcome = registry.deploy("model_v1").unwrap();
        assert_eq!(outcome.previous_model.as_deref(), Some("model_v1"));
        assert_eq!(outcome.new_model, "model_v1");
        assert_eq!(registry.deployed_count(), 1);
    }

    #[test]
    fn test_deploy_unknown_model_fails() {
        let registry = ModelRegistry::new(DemotionPolicy::Validated);
        let err = registry.deploy("model_v9").unwrap_err();
        assert_eq!(err.kind(), "unknown_model");
    }

    #[test]
    fn test_retired_model_cannot_deploy() {
        let registry = ModelRegistry::new(DemotionPolicy::Validated);
        registry.register(registration("model_v1"), artifact()).unwrap();
        registry.validate_model("model_v1").unwrap();
        registry.retire("model_v1").unwrap();
        let err = registry.deploy("model_v1").unwrap_err();
        assert_eq!(err.kind(), "invalid_transition");
    }

    #[test]
    fn test_retiring_active_leaves_no_active() {
        let registry = ModelRegistry::new(DemotionPolicy::Validated);
        registry.register(registration("model_v1"), artifact()).unwrap();
        registry.deploy("model_v1").unwrap();
        registry.retire("model_v1").unwrap();
        assert!(matches!(
            registry.get_active().unwrap_err(),
            ServingError::NoActiveModel
        ));
        assert_eq!(registry.deployed_count(), 0);
    }

    #[test]
    fn test_testing_model_cannot_retire() {
        let registry = ModelRegistry::new(DemotionPolicy::Validated);
        registry.register(registration("model_v1"), artifact()).unwrap();
        assert_eq!(registry.retire("model_v1").unwrap_err().kind(), "invalid_transition");
    }

    #[test]
    fn test_retired_demotion_policy() {
        let registry = ModelRegistry::new(DemotionPolicy::Retired);
        registry.register(registration("model_v1"), artifact()).unwrap();
        registry.register(registration("model_v2"), artifact()).unwrap();
        registry.deploy("model_v1").unwrap();
        registry.deploy("model_v2").unwrap();
        assert_eq!(registry.get("model_v1").unwrap().status, ModelStatus::Retired);
    }
}
