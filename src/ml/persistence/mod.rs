use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::ml::features::EncoderState;
use crate::ml::forest::RandomForest;
use crate::types::DataOrigin;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Model artifact not found at {path}")]
    NotFound { path: PathBuf },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed model artifact {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode model artifact: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Precision/recall/f1 for one class on the held-out split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassReport {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Held-out evaluation recorded alongside the model; never used as a gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub accuracy: f64,
    pub classes: Vec<ClassReport>,
    pub train_samples: usize,
    pub test_samples: usize,
    pub n_trees: usize,
}

/// Classifier bundled with the encoder it was fit alongside.
///
/// Both halves live in one file so a serving process can never pair a
/// classifier with a foreign encoder.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: String,
    pub trained_at: DateTime<Utc>,
    pub data_origin: DataOrigin,
    pub encoder: EncoderState,
    pub classifier: RandomForest,
    pub metrics: ModelMetrics,
}

/// Reads and writes the single active artifact file
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    path: PathBuf,
}

impl ArtifactStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling file the artifact is staged in before the rename
    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Replace the artifact wholesale: write a staging file, fsync, rename.
    /// On any error the previous artifact is left as it was.
    pub fn save(&self, artifact: &ModelArtifact) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| PersistenceError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let staging = self.staging_path();
        if let Err(e) = self.write_staging(&staging, artifact) {
            if staging.exists() {
                if let Err(cleanup) = fs::remove_file(&staging) {
                    warn!("Could not remove staging file {}: {}", staging.display(), cleanup);
                }
            }
            return Err(e);
        }

        fs::rename(&staging, &self.path).map_err(|source| PersistenceError::Io {
            path: self.path.clone(),
            source,
        })?;

        info!(
            "Saved model v{} ({} trees) to {}",
            artifact.version,
            artifact.classifier.n_trees(),
            self.path.display()
        );
        Ok(())
    }

    fn write_staging(&self, staging: &Path, artifact: &ModelArtifact) -> Result<(), PersistenceError> {
        let io_err = |source: std::io::Error| PersistenceError::Io { path: staging.to_path_buf(), source };

        let file = File::create(staging).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, artifact).map_err(PersistenceError::Encode)?;
        writer.flush().map_err(io_err)?;
        let file = writer.into_inner().map_err(|e| io_err(e.into_error()))?;
        file.sync_all().map_err(io_err)?;
        Ok(())
    }

    pub fn load(&self) -> Result<ModelArtifact, PersistenceError> {
        if !self.path.exists() {
            return Err(PersistenceError::NotFound { path: self.path.clone() });
        }

        let file = File::open(&self.path).map_err(|source| PersistenceError::Io {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| PersistenceError::Decode {
            path: self.path.clone(),
            source,
        })
    }

    /// Last modification time of the artifact file, if it can be read
    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from)
    }
}
