use std::sync::Arc;
use tracing::{error, info, warn};

use super::persistence::{ArtifactStore, ModelArtifact, PersistenceError};

/// Outcome of the one-time startup load
#[derive(Debug, Clone)]
pub enum ModelState {
    Loaded(Arc<ModelArtifact>),
    Absent { reason: String },
}

impl ModelState {
    pub fn is_loaded(&self) -> bool {
        matches!(self, ModelState::Loaded(_))
    }

    pub fn artifact(&self) -> Option<&ModelArtifact> {
        match self {
            ModelState::Loaded(artifact) => Some(artifact.as_ref()),
            ModelState::Absent { .. } => None,
        }
    }

    pub fn version(&self) -> Option<&str> {
        self.artifact().map(|a| a.version.as_str())
    }
}

/// Load the artifact once. Never fails: any problem yields `Absent` and the
/// service starts without a model.
pub fn load_model(store: &ArtifactStore) -> ModelState {
    let path = store.path();
    info!("Loading model from {}...", path.display());

    let artifact = match store.load() {
        Ok(artifact) => artifact,
        Err(e @ PersistenceError::NotFound { .. }) => {
            warn!("{}. Service will start but inference will fail until a model is present.", e);
            return ModelState::Absent { reason: e.to_string() };
        }
        Err(e) => {
            error!("Failed to load model: {}", e);
            return ModelState::Absent { reason: e.to_string() };
        }
    };

    if let Err(reason) = validate_artifact(&artifact) {
        error!("Rejecting model artifact: {}", reason);
        return ModelState::Absent { reason };
    }

    if let Some(modified) = store.modified_at() {
        info!("Model file last modified: {}", modified.to_rfc3339());
    }
    info!(
        "Model v{} loaded: trained {} on {} data, {} trees, held-out accuracy {:.4}",
        artifact.version,
        artifact.trained_at.to_rfc3339(),
        artifact.data_origin,
        artifact.classifier.n_trees(),
        artifact.metrics.accuracy
    );

    ModelState::Loaded(Arc::new(artifact))
}

/// A decoded artifact is only served if every request it could see would
/// encode and score without panicking.
pub fn validate_artifact(artifact: &ModelArtifact) -> Result<(), String> {
    if artifact.encoder.n_columns() != artifact.classifier.n_features() {
        return Err(format!(
            "Encoder produces {} columns but classifier expects {}",
            artifact.encoder.n_columns(),
            artifact.classifier.n_features()
        ));
    }
    artifact
        .encoder
        .validate()
        .map_err(|e| format!("Invalid encoder: {}", e))?;
    artifact
        .classifier
        .check_structure()
        .map_err(|e| format!("Invalid classifier: {}", e))
}
