//! REST API surface
//!
//! One axum handler per endpoint the frontend consumes. Handlers stay thin:
//! decode, call into the engine/registry/store, map to wire types. Errors
//! surface as structured bodies with a stable machine-readable kind; nothing
//! is swallowed into bare status codes.

pub mod types;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::config::ServingConfig;
use crate::engine::PredictionEngine;
use crate::error::{ServingError, ServingResult};
use crate::history::{ClassLabel, HistoryFilter, HistoryStore, MetricsWindow};
use crate::model::registry::ModelRegistry;
use crate::model::ModelCatalog;
use crate::schema::{FeatureSchema, Record};

use self::types::*;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<PredictionEngine>,
    pub registry: Arc<ModelRegistry>,
    pub history: Arc<HistoryStore>,
    pub schema: Arc<FeatureSchema>,
    pub config: ServingConfig,
}

impl AppState {
    /// Assemble the full service from the embedded schema and catalog.
    pub fn initialize(config: ServingConfig) -> ServingResult<Self> {
        let schema = Arc::new(FeatureSchema::builtin()?);
        Self::with_catalog(config, schema, &ModelCatalog::builtin()?)
    }

    /// Assemble the service from explicit assets (tests, alternate deploys).
    pub fn with_catalog(
        config: ServingConfig,
        schema: Arc<FeatureSchema>,
        catalog: &ModelCatalog,
    ) -> ServingResult<Self> {
        let registry = Arc::new(ModelRegistry::new(config.demotion));
        catalog.seed_into(&registry, &schema)?;
        let history = Arc::new(HistoryStore::new(config.max_page_size));
        let engine = Arc::new(PredictionEngine::new(
            Arc::clone(&schema),
            Arc::clone(&registry),
            Arc::clone(&history),
            config.clone(),
        ));
        Ok(Self {
            engine,
            registry,
            history,
            schema,
            config,
        })
    }
}

/// API error wrapper: maps the taxonomy onto status codes and a structured
/// JSON body.
#[derive(Debug)]
pub struct ApiError(pub ServingError);

impl From<ServingError> for ApiError {
    fn from(err: ServingError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ServingError::Validation { .. } | ServingError::UnknownLabel { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ServingError::UnknownModel { .. } | ServingError::UnknownPrediction { .. } => {
                StatusCode::NOT_FOUND
            }
            ServingError::ModelUnavailable | ServingError::NoActiveModel => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ServingError::InvalidTransition { .. } => StatusCode::CONFLICT,
            ServingError::ExplanationUnsupported { .. } => StatusCode::NOT_IMPLEMENTED,
            ServingError::Preprocessing { .. }
            | ServingError::Catalog { .. }
            | ServingError::Io(_)
            | ServingError::Serialization(_)
            | ServingError::Yaml(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(kind = self.0.kind(), "request failed: {}", self.0);
        }
        let mut body = json!({
            "error": {
                "kind": self.0.kind(),
                "message": self.0.to_string(),
            }
        });
        if let ServingError::Validation { report } = &self.0 {
            body["error"]["validation"] =
                serde_json::to_value(ValidateResponse::from(report.clone()))
                    .unwrap_or(serde_json::Value::Null);
        }
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Build the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/info", get(model_info))
        .route("/api/features", get(features))
        .route("/api/validate", post(validate_record))
        .route("/api/preprocess", post(preprocess_record))
        .route("/api/predict/single", post(predict_single))
        .route("/api/predict/batch", post(predict_batch))
        .route("/api/explain", post(explain))
        .route("/api/models", get(list_models))
        .route("/api/models/:model_id/deploy", post(deploy_model))
        .route("/api/models/:model_id/retire", post(retire_model))
        .route("/api/metrics", get(metrics))
        .route("/api/history", get(history))
        .route("/api/history/:prediction_id/outcome", post(record_outcome))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let model_ready = state.registry.get_active().is_ok();
    Json(HealthResponse {
        status: if model_ready { "ok" } else { "degraded" },
        model_status: if model_ready { "ready" } else { "unavailable" },
        timestamp: Utc::now(),
    })
}

async fn model_info(State(state): State<AppState>) -> ApiResult<ModelInfoResponse> {
    let active = state.registry.get_active()?;
    Ok(Json(ModelInfoResponse {
        model_name: active.version.model_id,
        version: active.version.version,
        algorithm: active.version.algorithm,
        training_date: active.version.training_date,
        target: state.schema.target().map(str::to_string),
        description: active.version.description,
        performance_metrics: active.version.metrics,
    }))
}

async fn features(State(state): State<AppState>) -> Json<FeaturesResponse> {
    Json(FeaturesResponse::from_schema(&state.schema))
}

async fn validate_record(
    State(state): State<AppState>,
    Json(record): Json<Record>,
) -> Json<ValidateResponse> {
    let report = crate::schema::validate(&record, &state.schema);
    Json(ValidateResponse::from(report))
}

async fn preprocess_record(
    State(state): State<AppState>,
    Json(record): Json<Record>,
) -> ApiResult<PreprocessResponse> {
    let report = crate::schema::validate(&record, &state.schema);
    if !report.is_valid {
        return Err(ServingError::Validation { report }.into());
    }
    let vector =
        crate::schema::preprocess(&record, &state.schema, state.config.impute_missing)?;
    Ok(Json(PreprocessResponse::from_vector(&state.schema, &vector)))
}

async fn predict_single(
    State(state): State<AppState>,
    Json(record): Json<Record>,
) -> ApiResult<PredictionDto> {
    let prediction = state.engine.predict_record(&record)?;
    Ok(Json(PredictionDto::from(&prediction)))
}

async fn predict_batch(
    State(state): State<AppState>,
    Query(query): Query<BatchQuery>,
    Json(records): Json<Vec<Record>>,
) -> Json<BatchResponse> {
    let deadline = query
        .timeout_ms
        .map(|ms| Instant::now() + Duration::from_millis(ms));
    let outcome = state.engine.predict_batch(&records, deadline);
    Json(BatchResponse::from(&outcome))
}

async fn explain(
    State(state): State<AppState>,
    Json(record): Json<Record>,
) -> ApiResult<ExplainResponse> {
    let report = state.engine.explain_record(&record)?;
    Ok(Json(ExplainResponse::from(&report)))
}

async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: state.registry.list().iter().map(ModelDto::from).collect(),
    })
}

async fn deploy_model(
    State(state): State<AppState>,
    Path(model_id): Path<String>,
) -> ApiResult<DeployResponse> {
    let outcome = state.registry.deploy(&model_id)?;
    Ok(Json(DeployResponse {
        deployment_id: outcome.deployment_id,
        previous_model: outcome.previous_model,
        new_model: outcome.new_model,
        status: outcome.status,
        deployment_time: outcome.deployment_time,
        message: outcome.message,
    }))
}

async fn retire_model(
    State(state): State<AppState>,
    Path(model_id): Path<String>,
) -> ApiResult<ModelDto> {
    let version = state.registry.retire(&model_id)?;
    Ok(Json(ModelDto::from(&version)))
}

async fn metrics(
    State(state): State<AppState>,
    Query(query): Query<MetricsQuery>,
) -> Json<MetricsResponse> {
    let snapshot = state.history.snapshot_metrics(&MetricsWindow {
        last_n: query.last_n,
        model_id: query.model_id,
    });
    Json(MetricsResponse::from(snapshot))
}

async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<HistoryResponse> {
    let filter = HistoryFilter {
        class_label: query
            .prediction
            .as_deref()
            .and_then(ClassLabel::from_display_name),
        model_id: query.model_id,
        ..Default::default()
    };
    let page = state.history.query(
        query.page.unwrap_or(1),
        query.size.unwrap_or(state.config.default_page_size),
        &filter,
    );
    Json(HistoryResponse::from(page))
}

async fn record_outcome(
    State(state): State<AppState>,
    Path(prediction_id): Path<String>,
    Json(body): Json<OutcomeRequest>,
) -> ApiResult<serde_json::Value> {
    let actual = ClassLabel::from_display_name(&body.actual).ok_or_else(|| {
        ServingError::UnknownLabel {
            label: body.actual.clone(),
        }
    })?;
    state.history.record_outcome(&prediction_id, actual)?;
    Ok(Json(json!({
        "prediction_id": prediction_id,
        "actual": actual.display_name(),
        "message": "Outcome recorded",
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> AppState {
        AppState::initialize(ServingConfig::default()).unwrap()
    }

    #[test]
    fn test_initialize_seeds_one_deployed_model() {
        let state = test_state();
        assert_eq!(state.registry.deployed_count(), 1);
        assert!(state.history.is_empty());
    }

    #[tokio::test]
    async fn test_health_reports_ready_then_degraded() {
        let state = test_state();
        let response = health(State(state.clone())).await;
        assert_eq!(response.0.status, "ok");
        assert_eq!(response.0.model_status, "ready");

        state.registry.retire("model_v1").unwrap();
        let response = health(State(state)).await;
        assert_eq!(response.0.status, "degraded");
        assert_eq!(response.0.model_status, "unavailable");
    }

    #[tokio::test]
    async fn test_history_endpoint_empty_store() {
        let state = test_state();
        let response = history(State(state), Query(HistoryQuery::default())).await;
        assert!(response.0.predictions.is_empty());
        assert_eq!(response.0.total_predictions, 0);
    }

    #[tokio::test]
    async fn test_deploy_endpoint_shape() {
        let state = test_state();
        let response = deploy_model(State(state.clone()), Path("model_v2".to_string()))
            .await
            .unwrap();
        assert_eq!(response.0.previous_model.as_deref(), Some("model_v1"));
        assert_eq!(response.0.new_model, "model_v2");
        assert_eq!(
            state.registry.get_active().unwrap().version.model_id,
            "model_v2"
        );
    }

    #[tokio::test]
    async fn test_outcome_rejects_unknown_label_as_client_error() {
        let state = test_state();
        let err = record_outcome(
            State(state),
            Path("pred-00000001".to_string()),
            Json(OutcomeRequest {
                actual: "Great Subject".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0.kind(), "unknown_label");
        assert!(err.0.is_client_error());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_unavailable_without_ground_truth() {
        let state = test_state();
        let response = metrics(State(state), Query(MetricsQuery::default())).await;
        assert_eq!(response.0.status, "unavailable");
        assert!(response.0.accuracy.is_none());
    }
}
