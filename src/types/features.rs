use serde::{Deserialize, Serialize};
use std::fmt;

pub const TRAFFIC_LEVEL_RANGE: std::ops::RangeInclusive<i64> = 1..=5;
pub const PROVIDER_LOAD_RANGE: std::ops::RangeInclusive<i64> = 1..=3;

/// Minimum number of rows a real (database) dataset needs to be used for training
pub const MIN_REAL_SAMPLES: usize = 100;

/// Context features for assigning one order to one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Provider code (e.g. "UBER", "SHADOWFAX")
    pub provider: String,
    pub distance_km: f64,
    /// Traffic on a 1 (light) to 5 (gridlock) scale
    pub traffic_level: i64,
    pub is_peak_hour: bool,
    /// Provider load: 1 = low, 2 = medium, 3 = high
    pub provider_load: i64,
}

/// Which field of a feature vector failed validation and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: &'static str,
    pub reason: String,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

impl FeatureVector {
    pub fn new(
        provider: impl Into<String>,
        distance_km: f64,
        traffic_level: i64,
        is_peak_hour: bool,
        provider_load: i64,
    ) -> Self {
        Self {
            provider: provider.into(),
            distance_km,
            traffic_level,
            is_peak_hour,
            provider_load,
        }
    }

    /// Range-check every field
    pub fn validate(&self) -> Result<(), FieldViolation> {
        if self.provider.trim().is_empty() {
            return Err(FieldViolation {
                field: "provider",
                reason: "must not be empty".to_string(),
            });
        }
        if !self.distance_km.is_finite() || self.distance_km < 0.0 {
            return Err(FieldViolation {
                field: "distance_km",
                reason: format!("must be a finite number >= 0, got {}", self.distance_km),
            });
        }
        if !TRAFFIC_LEVEL_RANGE.contains(&self.traffic_level) {
            return Err(FieldViolation {
                field: "traffic_level",
                reason: format!("must be in [1, 5], got {}", self.traffic_level),
            });
        }
        if !PROVIDER_LOAD_RANGE.contains(&self.provider_load) {
            return Err(FieldViolation {
                field: "provider_load",
                reason: format!("must be in [1, 3], got {}", self.provider_load),
            });
        }
        Ok(())
    }
}

/// A feature vector with its observed outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub features: FeatureVector,
    pub success: bool,
}

/// Where a dataset came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataOrigin {
    Database,
    Synthetic,
}

impl DataOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataOrigin::Database => "database",
            DataOrigin::Synthetic => "synthetic",
        }
    }
}

impl fmt::Display for DataOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered, non-empty collection of training examples
#[derive(Debug, Clone)]
pub struct Dataset {
    examples: Vec<TrainingExample>,
    origin: DataOrigin,
}

impl Dataset {
    /// Returns `None` for an empty example list
    pub fn new(examples: Vec<TrainingExample>, origin: DataOrigin) -> Option<Self> {
        if examples.is_empty() {
            return None;
        }
        Some(Self { examples, origin })
    }

    pub fn examples(&self) -> &[TrainingExample] {
        &self.examples
    }

    pub fn origin(&self) -> DataOrigin {
        self.origin
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn success_count(&self) -> usize {
        self.examples.iter().filter(|e| e.success).count()
    }
}
