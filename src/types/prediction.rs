use serde::{Deserialize, Serialize};

/// Success probability for one candidate provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub provider: String,
    /// In [0, 1], rounded to 4 decimal places
    pub success_probability: f64,
}

/// Predictions for a whole request, tagged with the model that produced them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionBatch {
    pub predictions: Vec<PredictionResult>,
    pub model_version: String,
}

/// Round a probability to 4 decimals and keep it inside [0, 1]
pub fn round_probability(p: f64) -> f64 {
    ((p * 10_000.0).round() / 10_000.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_probability() {
        assert_eq!(round_probability(0.123456), 0.1235);
        assert_eq!(round_probability(0.99999), 1.0);
        assert_eq!(round_probability(0.0), 0.0);
        assert_eq!(round_probability(1.2), 1.0);
        assert_eq!(round_probability(-0.01), 0.0);
    }
}
