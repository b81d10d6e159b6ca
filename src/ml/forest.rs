use anyhow::{anyhow, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use tracing::debug;

type ForestModel = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Random forest hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    /// Number of trees in the ensemble
    pub n_trees: usize,
    /// Maximum depth of each tree
    pub max_depth: usize,
    /// Minimum samples required to split an internal node
    pub min_samples_split: usize,
    /// Features considered per split; `None` means sqrt(n_features)
    pub max_features: Option<usize>,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 10,
            min_samples_split: 5,
            max_features: None,
            seed: 42,
        }
    }
}

fn to_dense(x: &Array2<f64>) -> Result<DenseMatrix<f64>> {
    let rows: Vec<Vec<f64>> = x.rows().into_iter().map(|r| r.to_vec()).collect();
    DenseMatrix::from_2d_vec(&rows).map_err(|e| anyhow!("Matrix error: {}", e))
}

/// Bagged regression trees fit on 0/1 outcomes.
///
/// Each leaf holds the mean outcome of its samples, so the ensemble mean is
/// the success probability.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    n_features: usize,
    model: ForestModel,
}

impl RandomForest {
    pub fn fit(x: &Array2<f64>, y: &[bool], params: ForestParams) -> Result<Self> {
        let (n_samples, n_features) = x.dim();
        if n_samples == 0 || n_features == 0 {
            return Err(anyhow!("Cannot fit forest on an empty matrix ({}x{})", n_samples, n_features));
        }
        if y.len() != n_samples {
            return Err(anyhow!("Label count {} does not match row count {}", y.len(), n_samples));
        }
        if params.n_trees == 0 {
            return Err(anyhow!("n_trees must be > 0"));
        }
        let max_depth = u16::try_from(params.max_depth)
            .ok()
            .filter(|d| *d > 0)
            .ok_or_else(|| anyhow!("max_depth must be in 1..={}, got {}", u16::MAX, params.max_depth))?;
        if x.iter().any(|v| !v.is_finite()) {
            return Err(anyhow!("Feature matrix contains non-finite values"));
        }

        let m = params
            .max_features
            .unwrap_or_else(|| (n_features as f64).sqrt().round() as usize)
            .clamp(1, n_features);

        let x_matrix = to_dense(x)?;
        let targets: Vec<f64> = y.iter().map(|&s| if s { 1.0 } else { 0.0 }).collect();
        let parameters = RandomForestRegressorParameters::default()
            .with_n_trees(params.n_trees)
            .with_max_depth(max_depth)
            .with_min_samples_split(params.min_samples_split)
            .with_m(m)
            .with_seed(params.seed);

        let model = RandomForestRegressor::fit(&x_matrix, &targets, parameters)
            .map_err(|e| anyhow!("Training error: {}", e))?;

        debug!(
            "Fitted {} trees on {}x{} (m={}, max_depth={})",
            params.n_trees, n_samples, n_features, m, max_depth
        );

        Ok(Self { params, n_features, model })
    }

    /// Positive-class (success) probability per row
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Vec<f64>> {
        if x.ncols() != self.n_features {
            return Err(anyhow!(
                "Expected {} feature columns, got {}",
                self.n_features,
                x.ncols()
            ));
        }
        if x.nrows() == 0 {
            return Ok(Vec::new());
        }

        let predictions = self
            .model
            .predict(&to_dense(x)?)
            .map_err(|e| anyhow!("Predict error: {}", e))?;
        Ok(predictions.into_iter().map(|p| p.clamp(0.0, 1.0)).collect())
    }

    /// Class labels: success when the positive probability exceeds 0.5
    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<bool>> {
        Ok(self.predict_proba(x)?.into_iter().map(|p| p > 0.5).collect())
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.params.n_trees
    }

    /// Walk the serialized trees and reject anything `predict` could not
    /// traverse safely: missing trees, child links that are out of range or
    /// point backwards, split features beyond `n_features`, non-finite
    /// thresholds and outputs outside [0, 1].
    pub fn check_structure(&self) -> Result<(), String> {
        if self.n_features == 0 {
            return Err("forest has zero input features".to_string());
        }
        let value = serde_json::to_value(&self.model).map_err(|e| e.to_string())?;
        let trees = value
            .get("trees")
            .and_then(Value::as_array)
            .ok_or("forest has no trees")?;
        if trees.is_empty() {
            return Err("forest has no trees".to_string());
        }
        if trees.len() != self.params.n_trees {
            return Err(format!(
                "forest holds {} trees but records n_trees={}",
                trees.len(),
                self.params.n_trees
            ));
        }

        for (t, tree) in trees.iter().enumerate() {
            let nodes = tree
                .get("nodes")
                .and_then(Value::as_array)
                .ok_or_else(|| format!("tree {} has no node list", t))?;
            if nodes.is_empty() {
                return Err(format!("tree {} is empty", t));
            }

            for (i, node) in nodes.iter().enumerate() {
                let output = node.get("output").and_then(Value::as_f64);
                if !output.map_or(false, |o| o.is_finite() && (0.0..=1.0).contains(&o)) {
                    return Err(format!("tree {} node {}: output must be a finite value in [0, 1]", t, i));
                }

                match (child(node, "true_child")?, child(node, "false_child")?) {
                    (None, None) => {}
                    (Some(left), Some(right)) => {
                        for c in [left, right] {
                            if c <= i || c >= nodes.len() {
                                return Err(format!(
                                    "tree {} node {}: child {} outside {}..{}",
                                    t,
                                    i,
                                    c,
                                    i + 1,
                                    nodes.len()
                                ));
                            }
                        }
                        let feature = node
                            .get("split_feature")
                            .and_then(Value::as_u64)
                            .ok_or_else(|| format!("tree {} node {}: missing split feature", t, i))?;
                        if feature as usize >= self.n_features {
                            return Err(format!(
                                "tree {} node {}: split feature {} >= {}",
                                t, i, feature, self.n_features
                            ));
                        }
                        let threshold = node.get("split_value").and_then(Value::as_f64);
                        if !threshold.map_or(false, f64::is_finite) {
                            return Err(format!("tree {} node {}: split threshold is not finite", t, i));
                        }
                    }
                    _ => return Err(format!("tree {} node {}: split has only one child", t, i)),
                }
            }
        }

        Ok(())
    }
}

fn child(node: &Value, key: &str) -> Result<Option<usize>, String> {
    match node.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(|c| Some(c as usize))
            .ok_or_else(|| format!("{} is not a node index", key)),
    }
}
