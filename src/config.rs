//! Serving configuration
//!
//! Policy knobs that the mock frontend treated as incidental behavior are
//! explicit configuration here: decision threshold, confidence-band cut
//! points, top-k explanation size, pagination bounds, and the status a
//! displaced model is demoted to on deployment.

use serde::{Deserialize, Serialize};

/// Status the previously deployed model is moved to when a new model is
/// deployed. Retirement stays an explicit operator action under the default
/// policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DemotionPolicy {
    #[default]
    Validated,
    Retired,
}

/// Runtime configuration for the serving backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServingConfig {
    /// Bind host for the HTTP server.
    pub host: String,
    /// Bind port for the HTTP server.
    pub port: u16,
    /// Probability at or above which a record is classified Positive.
    pub decision_threshold: f64,
    /// Distance from the threshold at or beyond which confidence is "high".
    pub band_high: f64,
    /// Distance from the threshold at or beyond which confidence is "medium".
    pub band_medium: f64,
    /// Number of features returned in each top-contribution view (capped at 5).
    pub top_k: usize,
    /// Hard cap on history page size.
    pub max_page_size: usize,
    /// Page size used when the caller does not supply one.
    pub default_page_size: usize,
    /// Impute missing optional fields with schema defaults; when false a NaN
    /// sentinel is passed through for the model to handle.
    pub impute_missing: bool,
    /// Demotion target for a displaced deployed model.
    pub demotion: DemotionPolicy,
}

impl Default for ServingConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            decision_threshold: 0.5,
            band_high: 0.30,
            band_medium: 0.15,
            top_k: 3,
            max_page_size: 200,
            default_page_size: 10,
            impute_missing: true,
            demotion: DemotionPolicy::Validated,
        }
    }
}

impl ServingConfig {
    /// Overlay `HOST`/`PORT` environment variables onto the defaults,
    /// falling back silently when unset or unparseable.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(host) = std::env::var("HOST") {
            config.host = host;
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(port) = port.parse::<u16>() {
                config.port = port;
            }
        }
        config
    }

    /// Top-k clamped to the 1..=5 range the frontend renders.
    pub fn effective_top_k(&self) -> usize {
        self.top_k.clamp(1, 5)
    }
}
