use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::ml::PredictionService;
use crate::types::{FeatureVector, PredictionResult};

/// Shared, read-only handler state built once at startup
#[derive(Clone)]
pub struct AppState {
    pub predictor: Arc<PredictionService>,
    /// Configured service version tag
    pub service_version: String,
}

impl AppState {
    pub fn new(predictor: PredictionService, service_version: impl Into<String>) -> Self {
        Self {
            predictor: Arc::new(predictor),
            service_version: service_version.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub providers: Vec<FeatureVector>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub predictions: Vec<PredictionResult>,
    pub model_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Liveness only; readiness is `model_loaded`
    pub status: String,
    pub version: String,
    pub model_loaded: bool,
    pub model_version: Option<String>,
    pub confidence_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
