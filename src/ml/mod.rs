pub mod features;
pub mod forest;
pub mod loader;
pub mod persistence;
pub mod predictor;
pub mod synthetic;
pub mod trainer;

pub use features::{EncoderState, FeaturePipeline};
pub use forest::{ForestParams, RandomForest};
pub use loader::{load_model, ModelState};
pub use persistence::{ArtifactStore, ModelArtifact};
pub use predictor::{PredictionError, PredictionService};
pub use trainer::{run_training, Trainer, TrainerConfig, TrainingPlan};
