use chrono::Utc;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::features::FeaturePipeline;
use super::forest::{ForestParams, RandomForest};
use super::persistence::{ArtifactStore, ClassReport, ModelArtifact, ModelMetrics, PersistenceError};
use super::synthetic::{generate_synthetic, DEFAULT_SEED, DEFAULT_SYNTHETIC_SAMPLES};
use crate::database::TrainingDataSource;
use crate::types::{Dataset, FeatureVector};

pub const DEFAULT_TEST_FRACTION: f64 = 0.2;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("Need at least 2 examples to split train/test, got {0}")]
    TooSmall(usize),

    #[error("Synthetic data generation failed: {0}")]
    Synthetic(#[source] anyhow::Error),

    #[error("Model fitting failed: {0}")]
    Fit(#[source] anyhow::Error),

    #[error("Training task aborted: {0}")]
    Aborted(String),

    #[error(transparent)]
    Persist(#[from] PersistenceError),
}

#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub forest: ForestParams,
    pub test_fraction: f64,
    /// Version tag stamped on the artifact
    pub version: String,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            forest: ForestParams::default(),
            test_fraction: DEFAULT_TEST_FRACTION,
            version: "1.0.0-dev".to_string(),
        }
    }
}

/// Shuffled train/test index split; the test side gets ceil(n * test_fraction) rows
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let n_test = ((n as f64 * test_fraction).ceil() as usize).clamp(1, n.saturating_sub(1).max(1));
    let train = indices.split_off(n_test);
    (train, indices)
}

/// Accuracy plus per-class precision/recall/f1 (class order: failure, success)
pub fn evaluate(y_true: &[bool], y_pred: &[bool]) -> (f64, Vec<ClassReport>) {
    let n = y_true.len();
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    let accuracy = if n == 0 { 0.0 } else { correct as f64 / n as f64 };

    let classes = [(false, "failure"), (true, "success")]
        .iter()
        .map(|&(class, label)| {
            let tp = y_true.iter().zip(y_pred).filter(|(t, p)| **t == class && **p == class).count();
            let predicted = y_pred.iter().filter(|p| **p == class).count();
            let support = y_true.iter().filter(|t| **t == class).count();

            let precision = if predicted == 0 { 0.0 } else { tp as f64 / predicted as f64 };
            let recall = if support == 0 { 0.0 } else { tp as f64 / support as f64 };
            let f1_score = if precision + recall == 0.0 {
                0.0
            } else {
                2.0 * precision * recall / (precision + recall)
            };

            ClassReport { label: label.to_string(), precision, recall, f1_score, support }
        })
        .collect();

    (accuracy, classes)
}

fn log_metrics(metrics: &ModelMetrics) {
    info!("Accuracy: {:.4}", metrics.accuracy);
    info!("{:>10} {:>10} {:>10} {:>10} {:>10}", "", "precision", "recall", "f1-score", "support");
    for c in &metrics.classes {
        info!(
            "{:>10} {:>10.2} {:>10.2} {:>10.2} {:>10}",
            c.label, c.precision, c.recall, c.f1_score, c.support
        );
    }
}

/// Fits the encoder and the forest, evaluates on a held-out split
#[derive(Debug, Clone)]
pub struct Trainer {
    config: TrainerConfig,
}

impl Trainer {
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    pub fn train(&self, dataset: &Dataset) -> Result<ModelArtifact, TrainingError> {
        let n = dataset.len();
        if n < 2 {
            return Err(TrainingError::TooSmall(n));
        }

        let (train_idx, test_idx) =
            train_test_split(n, self.config.test_fraction, self.config.forest.seed);
        let examples = dataset.examples();

        let split = |idx: &[usize]| -> (Vec<FeatureVector>, Vec<bool>) {
            idx.iter()
                .map(|&i| (examples[i].features.clone(), examples[i].success))
                .unzip()
        };
        let (x_train_raw, y_train) = split(&train_idx[..]);
        let (x_test_raw, y_test) = split(&test_idx[..]);

        // Encoder sees the training split only
        let encoder = FeaturePipeline::fit(&x_train_raw).map_err(TrainingError::Fit)?;
        let x_train = encoder.transform(&x_train_raw);
        let x_test = encoder.transform(&x_test_raw);

        debug!("Encoded columns: {}", encoder.column_names().join(", "));
        info!(
            "Training model: {} train / {} test rows, {} features, {} trees",
            y_train.len(),
            y_test.len(),
            encoder.n_columns(),
            self.config.forest.n_trees
        );

        let classifier = RandomForest::fit(&x_train, &y_train, self.config.forest.clone())
            .map_err(TrainingError::Fit)?;

        info!("Evaluating model...");
        let y_pred = classifier.predict(&x_test).map_err(TrainingError::Fit)?;
        let (accuracy, classes) = evaluate(&y_test, &y_pred);
        let metrics = ModelMetrics {
            accuracy,
            classes,
            train_samples: y_train.len(),
            test_samples: y_test.len(),
            n_trees: classifier.n_trees(),
        };
        log_metrics(&metrics);

        Ok(ModelArtifact {
            version: self.config.version.clone(),
            trained_at: Utc::now(),
            data_origin: dataset.origin(),
            encoder,
            classifier,
            metrics,
        })
    }
}

/// How a training run acquires its data
#[derive(Debug, Clone)]
pub struct TrainingPlan {
    /// Examples to generate when real data is unavailable
    pub synthetic_samples: usize,
    pub seed: u64,
}

impl Default for TrainingPlan {
    fn default() -> Self {
        Self {
            synthetic_samples: DEFAULT_SYNTHETIC_SAMPLES,
            seed: DEFAULT_SEED,
        }
    }
}

/// Real data when the source can provide it, synthetic otherwise
pub async fn acquire_dataset(
    source: Option<&dyn TrainingDataSource>,
    plan: &TrainingPlan,
) -> Result<Dataset, TrainingError> {
    if let Some(source) = source {
        info!("Attempting to load real training data...");
        match source.fetch_training_data().await {
            Ok(dataset) => {
                info!("Using {} rows of real data for training", dataset.len());
                return Ok(dataset);
            }
            Err(e) => warn!("Real training data unavailable: {}", e),
        }
    }

    info!("Falling back to synthetic data generation ({} samples)", plan.synthetic_samples);
    generate_synthetic(plan.synthetic_samples, plan.seed).map_err(TrainingError::Synthetic)
}

/// Full offline run: acquire data, fit, evaluate, persist atomically
pub async fn run_training(
    source: Option<&dyn TrainingDataSource>,
    plan: &TrainingPlan,
    trainer: &Trainer,
    store: &ArtifactStore,
) -> Result<ModelArtifact, TrainingError> {
    let dataset = acquire_dataset(source, plan).await?;

    let worker = trainer.clone();
    let artifact = tokio::task::spawn_blocking(move || worker.train(&dataset))
        .await
        .map_err(|e| TrainingError::Aborted(e.to_string()))??;

    store.save(&artifact)?;
    info!("Training complete.");
    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{DataSourceError, MockTrainingDataSource};
    use crate::ml::synthetic::success_probability;
    use crate::types::{DataOrigin, TrainingExample};
    use tempfile::tempdir;

    fn quick_config(seed: u64) -> TrainerConfig {
        TrainerConfig {
            forest: ForestParams { n_trees: 10, max_depth: 6, min_samples_split: 5, max_features: None, seed },
            test_fraction: DEFAULT_TEST_FRACTION,
            version: "test-1".to_string(),
        }
    }

    #[test]
    fn test_split_sizes_and_disjoint() {
        let (train, test) = train_test_split(101, 0.2, 42);
        assert_eq!(test.len(), 21);
        assert_eq!(train.len(), 80);
        let mut all: Vec<usize> = train.iter().chain(test.iter()).copied().collect();
        all.sort();
        assert_eq!(all, (0..101).collect::<Vec<_>>());

        assert_eq!(train_test_split(101, 0.2, 42), (train, test));
    }

    #[test]
    fn test_split_keeps_both_sides_non_empty() {
        let (train, test) = train_test_split(2, 0.2, 1);
        assert_eq!((train.len(), test.len()), (1, 1));
    }

    #[test]
    fn test_evaluate_report() {
        let y_true = [true, true, false, false];
        let y_pred = [true, false, false, false];
        let (acc, classes) = evaluate(&y_true, &y_pred);
        assert_eq!(acc, 0.75);
        let success = &classes[1];
        assert_eq!(success.label, "success");
        assert_eq!(success.precision, 1.0);
        assert_eq!(success.recall, 0.5);
        assert_eq!(success.support, 2);
        let failure = &classes[0];
        assert!((failure.precision - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(failure.recall, 1.0);
    }

    #[test]
    fn test_train_produces_artifact() {
        let dataset = generate_synthetic(1000, 5).unwrap();
        let artifact = Trainer::new(quick_config(42)).train(&dataset).unwrap();

        assert_eq!(artifact.version, "test-1");
        assert_eq!(artifact.data_origin, DataOrigin::Synthetic);
        assert_eq!(artifact.metrics.train_samples, 800);
        assert_eq!(artifact.metrics.test_samples, 200);
        assert_eq!(artifact.metrics.n_trees, 10);
        assert_eq!(artifact.classifier.n_features(), artifact.encoder.n_columns());
        assert_eq!(artifact.metrics.classes.len(), 2);
    }

    #[test]
    fn test_accuracy_tracks_ideal_predictor() {
        // Labels are noisy draws, so compare against thresholding the true
        // success probability on the same held-out rows
        let dataset = generate_synthetic(5000, 5).unwrap();
        let config = TrainerConfig {
            forest: ForestParams { n_trees: 20, max_depth: 8, min_samples_split: 5, max_features: None, seed: 42 },
            ..quick_config(42)
        };
        let (_, test_idx) = train_test_split(dataset.len(), config.test_fraction, config.forest.seed);
        let artifact = Trainer::new(config).train(&dataset).unwrap();

        let examples = dataset.examples();
        let y_true: Vec<bool> = test_idx.iter().map(|&i| examples[i].success).collect();
        let y_ideal: Vec<bool> = test_idx
            .iter()
            .map(|&i| success_probability(&examples[i].features) > 0.5)
            .collect();
        let (ideal_accuracy, _) = evaluate(&y_true, &y_ideal);

        assert_eq!(artifact.metrics.test_samples, 1000);
        assert!(
            artifact.metrics.accuracy >= ideal_accuracy - 0.05,
            "accuracy {:.4} vs ideal {:.4}",
            artifact.metrics.accuracy,
            ideal_accuracy
        );
    }

    #[test]
    fn test_encoder_fit_on_training_split_only() {
        // Exactly one example uses a provider; whichever split it lands in decides the vocabulary
        let mut examples: Vec<TrainingExample> = generate_synthetic(200, 9).unwrap().examples().to_vec();
        examples[0].features.provider = "SOLO".to_string();
        let dataset = Dataset::new(examples, DataOrigin::Synthetic).unwrap();

        let config = quick_config(42);
        let (train_idx, _) = train_test_split(dataset.len(), config.test_fraction, config.forest.seed);
        let artifact = Trainer::new(config).train(&dataset).unwrap();

        assert_eq!(artifact.encoder.knows_provider("SOLO"), train_idx.contains(&0));
    }

    #[test]
    fn test_training_is_deterministic() {
        let dataset = generate_synthetic(800, 11).unwrap();
        let trainer = Trainer::new(quick_config(7));
        let a = trainer.train(&dataset).unwrap();
        let b = trainer.train(&dataset).unwrap();
        assert_eq!(a.metrics.accuracy, b.metrics.accuracy);
        assert_eq!(a.classifier, b.classifier);
        assert_eq!(a.metrics.classes, b.metrics.classes);
    }

    #[test]
    fn test_too_small_dataset() {
        let one = Dataset::new(
            generate_synthetic(1, 1).unwrap().examples().to_vec(),
            DataOrigin::Synthetic,
        )
        .unwrap();
        assert!(matches!(Trainer::new(quick_config(1)).train(&one), Err(TrainingError::TooSmall(1))));
    }

    #[test]
    fn test_default_plan_uses_twenty_thousand_samples() {
        let plan = TrainingPlan::default();
        assert_eq!(plan.synthetic_samples, 20_000);
        assert_eq!(plan.seed, 42);
    }

    #[tokio::test]
    async fn test_insufficient_rows_fall_back_to_synthetic() {
        let mut source = MockTrainingDataSource::new();
        source
            .expect_fetch_training_data()
            .times(1)
            .returning(|| Err(DataSourceError::InsufficientRows { found: 42, required: 100 }));

        let dataset = acquire_dataset(Some(&source as &dyn TrainingDataSource), &TrainingPlan::default()).await.unwrap();
        assert_eq!(dataset.origin(), DataOrigin::Synthetic);
        assert_eq!(dataset.len(), DEFAULT_SYNTHETIC_SAMPLES);
    }

    #[tokio::test]
    async fn test_real_data_used_when_available() {
        let real = Dataset::new(
            generate_synthetic(150, 3).unwrap().examples().to_vec(),
            DataOrigin::Database,
        )
        .unwrap();
        let mut source = MockTrainingDataSource::new();
        source
            .expect_fetch_training_data()
            .times(1)
            .returning(move || Ok(real.clone()));

        let dataset = acquire_dataset(Some(&source as &dyn TrainingDataSource), &TrainingPlan::default()).await.unwrap();
        assert_eq!(dataset.origin(), DataOrigin::Database);
        assert_eq!(dataset.len(), 150);
    }

    #[tokio::test]
    async fn test_run_training_persists_artifact() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("model.json"));
        let mut source = MockTrainingDataSource::new();
        source
            .expect_fetch_training_data()
            .returning(|| Err(DataSourceError::Timeout(std::time::Duration::from_secs(10))));

        let plan = TrainingPlan { synthetic_samples: 500, seed: 42 };
        let artifact = run_training(Some(&source as &dyn TrainingDataSource), &plan, &Trainer::new(quick_config(42)), &store)
            .await
            .unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, artifact);
        assert_eq!(loaded.data_origin, DataOrigin::Synthetic);
    }

    #[tokio::test]
    async fn test_fit_failure_leaves_previous_artifact() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("model.json"));
        let plan = TrainingPlan { synthetic_samples: 300, seed: 42 };
        run_training(None, &plan, &Trainer::new(quick_config(42)), &store).await.unwrap();

        let mut broken = quick_config(42);
        broken.forest.n_trees = 0;
        broken.version = "broken".to_string();
        let result = run_training(None, &plan, &Trainer::new(broken), &store).await;

        assert!(matches!(result, Err(TrainingError::Fit(_))));
        assert_eq!(store.load().unwrap().version, "test-1");
    }
}
