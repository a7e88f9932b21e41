use std::sync::Arc;

use tracing::info;

use adherence_serving::api::{create_router, AppState};
use adherence_serving::{FeatureSchema, ModelCatalog, ServingConfig};

/// Assemble application state from the embedded assets, honoring the
/// `SERVING_SCHEMA_PATH` / `SERVING_CATALOG_PATH` overrides.
fn load_state(config: ServingConfig) -> anyhow::Result<AppState> {
    let schema = match std::env::var("SERVING_SCHEMA_PATH") {
        Ok(path) => {
            info!(path = %path, "loading feature schema override");
            Arc::new(FeatureSchema::from_yaml_str(&std::fs::read_to_string(path)?)?)
        }
        Err(_) => Arc::new(FeatureSchema::builtin()?),
    };
    let catalog = match std::env::var("SERVING_CATALOG_PATH") {
        Ok(path) => {
            info!(path = %path, "loading model catalog override");
            ModelCatalog::from_yaml_str(&std::fs::read_to_string(path)?)?
        }
        Err(_) => ModelCatalog::builtin()?,
    };
    Ok(AppState::with_catalog(config, schema, &catalog)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "adherence_serving=info,tower_http=debug".to_string()),
        )
        .init();

    let config = ServingConfig::from_env();
    let addr = format!("{}:{}", config.host, config.port);

    let state = load_state(config)?;
    info!(
        models = state.registry.list().len(),
        features = state.schema.len(),
        "serving backend initialized"
    );

    let app = create_router(state);

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
