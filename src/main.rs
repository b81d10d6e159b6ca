mod types;
mod config;
mod database;
mod ml;
mod web;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use config::Settings;
use database::{OutcomeDatabase, TrainingDataSource};
use ml::{load_model, run_training, ArtifactStore, ForestParams, PredictionService, Trainer, TrainerConfig, TrainingPlan};
use web::{start_prediction_server, AppState};

#[derive(Parser)]
#[command(name = "assignment-predictor")]
#[command(version = "0.1.0")]
#[command(about = "Provider assignment success predictor: offline trainer and inference service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model and persist the artifact
    Train {
        /// Number of trees in the forest
        #[arg(long, default_value = "100")]
        trees: usize,
        /// Maximum tree depth
        #[arg(long, default_value = "10")]
        max_depth: usize,
        /// Minimum samples required to split a node
        #[arg(long, default_value = "5")]
        min_samples_split: usize,
        /// Seed for synthetic data, split and forest
        #[arg(long, default_value = "42")]
        seed: u64,
        /// Synthetic examples generated when real data is unavailable
        #[arg(long, default_value = "20000")]
        synthetic_samples: usize,
        /// Skip the database and train on synthetic data only
        #[arg(long)]
        synthetic_only: bool,
    },
    /// Load the artifact once and serve predictions over HTTP
    Serve {
        /// Listen port (default: SERVER_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let settings = Settings::load()?;

    match cli.command {
        Commands::Train { trees, max_depth, min_samples_split, seed, synthetic_samples, synthetic_only } => {
            let forest = ForestParams {
                n_trees: trees,
                max_depth,
                min_samples_split,
                max_features: None,
                seed,
            };
            let plan = TrainingPlan { synthetic_samples, seed };
            run_train(&settings, forest, plan, synthetic_only).await?;
        }
        Commands::Serve { port } => {
            run_serve(&settings, port.unwrap_or(settings.server_port)).await?;
        }
    }

    Ok(())
}

async fn run_train(settings: &Settings, forest: ForestParams, plan: TrainingPlan, synthetic_only: bool) -> Result<()> {
    info!("=== Assignment Model Training ===");
    info!("Model version: {}", settings.model_version);
    info!("Artifact path: {}", settings.model_path.display());

    let trainer = Trainer::new(TrainerConfig {
        forest,
        version: settings.model_version.clone(),
        ..TrainerConfig::default()
    });
    let store = ArtifactStore::new(settings.model_path.clone());

    let database = if synthetic_only {
        warn!("Database disabled by --synthetic-only");
        None
    } else {
        Some(OutcomeDatabase::new(settings.database_url(), settings.db_timeout()))
    };
    let source = database.as_ref().map(|db| db as &dyn TrainingDataSource);

    match run_training(source, &plan, &trainer, &store).await {
        Ok(artifact) => {
            info!(
                "Saved model v{} ({} data, accuracy {:.4}) to {}",
                artifact.version,
                artifact.data_origin,
                artifact.metrics.accuracy,
                store.path().display()
            );
            Ok(())
        }
        Err(e) => {
            error!("Training failed: {}", e);
            Err(anyhow!(e))
        }
    }
}

async fn run_serve(settings: &Settings, port: u16) -> Result<()> {
    let store = ArtifactStore::new(settings.model_path.clone());
    let state = load_model(&store);
    if !state.is_loaded() {
        warn!("Serving without a model; prediction requests will return 503");
    }

    let predictor = PredictionService::new(state, settings.confidence_threshold);
    let app_state = AppState::new(predictor, settings.model_version.clone());

    let addr: SocketAddr = format!("{}:{}", settings.server_host, port)
        .parse()
        .map_err(|e| anyhow!("Invalid listen address {}:{}: {}", settings.server_host, port, e))?;

    start_prediction_server(app_state, addr).await
}
