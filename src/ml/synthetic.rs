use anyhow::{anyhow, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::types::{DataOrigin, Dataset, FeatureVector, TrainingExample};

pub const SYNTHETIC_PROVIDERS: [&str; 5] = ["UBER", "LYFT", "RAPIDO", "SHADOWFAX", "DUNZO"];

/// Sample size used when real data is unavailable
pub const DEFAULT_SYNTHETIC_SAMPLES: usize = 20_000;
pub const DEFAULT_SEED: u64 = 42;

const MEAN_DISTANCE_KM: f64 = 5.0;
const PEAK_HOUR_PROB: f64 = 0.3;

/// Ground-truth success probability of the synthetic causal model.
///
/// Longer distance, heavier traffic, peak hours and a loaded provider all
/// lower the chance of a successful assignment.
pub fn success_probability(features: &FeatureVector) -> f64 {
    let peak = if features.is_peak_hour { 1.0 } else { 0.0 };
    let p = 0.8
        - (features.distance_km / 20.0) * 0.3
        - (features.traffic_level as f64 / 5.0) * 0.2
        - peak * 0.15
        - (features.provider_load as f64 / 3.0) * 0.1;
    p.clamp(0.1, 0.95)
}

/// Generate `n` labelled examples, fully determined by `(n, seed)`
pub fn generate_synthetic(n: usize, seed: u64) -> Result<Dataset> {
    if n == 0 {
        return Err(anyhow!("Synthetic sample size must be > 0"));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut examples = Vec::with_capacity(n);

    for _ in 0..n {
        let provider = SYNTHETIC_PROVIDERS[rng.random_range(0..SYNTHETIC_PROVIDERS.len())];
        // Inverse CDF; 1 - u keeps the argument of ln in (0, 1]
        let u: f64 = rng.random();
        let distance_km = -MEAN_DISTANCE_KM * (1.0 - u).ln();
        let traffic_level = rng.random_range(1..=5i64);
        let is_peak_hour = rng.random_bool(PEAK_HOUR_PROB);
        let provider_load = rng.random_range(1..=3i64);

        let features = FeatureVector::new(
            provider,
            distance_km,
            traffic_level,
            is_peak_hour,
            provider_load,
        );
        let success = rng.random_bool(success_probability(&features));

        examples.push(TrainingExample { features, success });
    }

    let dataset = Dataset::new(examples, DataOrigin::Synthetic)
        .ok_or_else(|| anyhow!("Synthetic generator produced no examples"))?;

    info!(
        "Generated {} synthetic examples (seed={}, success rate {:.1}%)",
        dataset.len(),
        seed,
        dataset.success_count() as f64 / dataset.len() as f64 * 100.0
    );

    Ok(dataset)
}
