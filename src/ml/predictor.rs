use thiserror::Error;
use tracing::debug;

use super::loader::ModelState;
use crate::types::{round_probability, FeatureVector, PredictionBatch, PredictionResult};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredictionError {
    #[error("Model is not loaded: {reason}")]
    ModelNotLoaded { reason: String },

    #[error("Invalid feature vector at index {index}: {field}: {reason}")]
    InvalidFeatureVector {
        index: usize,
        field: &'static str,
        reason: String,
    },

    #[error("Inference failed: {0}")]
    Inference(String),
}

/// Serves success probabilities from the artifact loaded at startup
#[derive(Debug, Clone)]
pub struct PredictionService {
    state: ModelState,
    confidence_threshold: f64,
}

impl PredictionService {
    pub fn new(state: ModelState, confidence_threshold: f64) -> Self {
        Self { state, confidence_threshold }
    }

    pub fn state(&self) -> &ModelState {
        &self.state
    }

    /// Reported to callers; predictions are never filtered by it here
    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    /// One result per input, same order. A single bad vector rejects the whole batch.
    pub fn predict(&self, batch: &[FeatureVector]) -> Result<PredictionBatch, PredictionError> {
        let artifact = match &self.state {
            ModelState::Loaded(artifact) => artifact,
            ModelState::Absent { reason } => {
                return Err(PredictionError::ModelNotLoaded { reason: reason.clone() });
            }
        };

        for (index, features) in batch.iter().enumerate() {
            features.validate().map_err(|v| PredictionError::InvalidFeatureVector {
                index,
                field: v.field,
                reason: v.reason,
            })?;
        }

        if batch.is_empty() {
            return Ok(PredictionBatch {
                predictions: Vec::new(),
                model_version: artifact.version.clone(),
            });
        }

        let unknown = batch
            .iter()
            .filter(|f| !artifact.encoder.knows_provider(&f.provider))
            .count();
        if unknown > 0 {
            debug!("{} of {} providers unseen at training time", unknown, batch.len());
        }

        let x = artifact.encoder.transform(batch);
        let probabilities = artifact
            .classifier
            .predict_proba(&x)
            .map_err(|e| PredictionError::Inference(e.to_string()))?;

        if probabilities.len() != batch.len() {
            return Err(PredictionError::Inference(format!(
                "Classifier returned {} probabilities for {} inputs",
                probabilities.len(),
                batch.len()
            )));
        }

        let predictions = batch
            .iter()
            .zip(probabilities)
            .map(|(features, p)| PredictionResult {
                provider: features.provider.clone(),
                success_probability: round_probability(p),
            })
            .collect();

        Ok(PredictionBatch {
            predictions,
            model_version: artifact.version.clone(),
        })
    }
}
