use anyhow::{anyhow, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::types::FeatureVector;

/// Numeric columns that get z-score scaling, in column order
pub const SCALED_FEATURES: [&str; 3] = ["distance_km", "traffic_level", "provider_load"];

/// Fitted encoding parameters.
///
/// Column layout of the encoded matrix:
/// `[one-hot provider (vocabulary order)] ++ [scaled numerics] ++ [is_peak_hour]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderState {
    /// Providers seen at fit time, sorted
    pub vocabulary: Vec<String>,
    pub means: [f64; 3],
    pub stds: [f64; 3],
}

impl EncoderState {
    pub fn n_columns(&self) -> usize {
        self.vocabulary.len() + SCALED_FEATURES.len() + 1
    }

    /// Human-readable column names, matching `transform` output
    pub fn column_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .vocabulary
            .iter()
            .map(|p| format!("provider={}", p))
            .collect();
        names.extend(SCALED_FEATURES.iter().map(|s| s.to_string()));
        names.push("is_peak_hour".to_string());
        names
    }

    /// Reject state `transform` would mis-encode: an unsorted or duplicated
    /// vocabulary breaks the binary search, a bad std breaks scaling.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(pair) = self.vocabulary.windows(2).find(|w| w[0] >= w[1]) {
            return Err(format!(
                "vocabulary must be sorted and unique, found {:?} before {:?}",
                pair[0], pair[1]
            ));
        }
        for (j, name) in SCALED_FEATURES.iter().enumerate() {
            if !self.means[j].is_finite() {
                return Err(format!("mean of {} is not finite", name));
            }
            if !self.stds[j].is_finite() || self.stds[j] <= 0.0 {
                return Err(format!("std of {} must be finite and > 0, got {}", name, self.stds[j]));
            }
        }
        Ok(())
    }

    pub fn knows_provider(&self, provider: &str) -> bool {
        self.vocabulary.binary_search_by(|p| p.as_str().cmp(provider)).is_ok()
    }

    /// Encode a batch. Providers outside the vocabulary get an all-zero block.
    pub fn transform(&self, rows: &[FeatureVector]) -> Array2<f64> {
        let n_vocab = self.vocabulary.len();
        let mut out = Array2::<f64>::zeros((rows.len(), self.n_columns()));

        for (i, row) in rows.iter().enumerate() {
            if let Ok(idx) = self.vocabulary.binary_search_by(|p| p.as_str().cmp(&row.provider)) {
                out[[i, idx]] = 1.0;
            }
            for (j, raw) in numeric_values(row).iter().enumerate() {
                out[[i, n_vocab + j]] = (raw - self.means[j]) / self.stds[j];
            }
            out[[i, n_vocab + SCALED_FEATURES.len()]] = if row.is_peak_hour { 1.0 } else { 0.0 };
        }

        out
    }
}

fn numeric_values(row: &FeatureVector) -> [f64; 3] {
    [
        row.distance_km,
        row.traffic_level as f64,
        row.provider_load as f64,
    ]
}

/// Fits encoder state from training rows
pub struct FeaturePipeline;

impl FeaturePipeline {
    pub fn fit(rows: &[FeatureVector]) -> Result<EncoderState> {
        if rows.is_empty() {
            return Err(anyhow!("Cannot fit feature pipeline on zero rows"));
        }

        let vocabulary: Vec<String> = rows
            .iter()
            .map(|r| r.provider.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let n = rows.len() as f64;
        let mut means = [0.0; 3];
        for row in rows {
            for (j, v) in numeric_values(row).iter().enumerate() {
                means[j] += v;
            }
        }
        for m in means.iter_mut() {
            *m /= n;
        }

        // Population std; a constant column keeps unit scale so it maps to 0
        let mut stds = [0.0; 3];
        for row in rows {
            for (j, v) in numeric_values(row).iter().enumerate() {
                stds[j] += (v - means[j]).powi(2);
            }
        }
        for s in stds.iter_mut() {
            *s = (*s / n).sqrt();
            if *s < 1e-12 {
                *s = 1.0;
            }
        }

        Ok(EncoderState { vocabulary, means, stds })
    }
}
