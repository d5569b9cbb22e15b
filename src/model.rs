//! Model seams and their random forest implementations.
//!
//! The pipeline only relies on the `Classifier` and `Regressor` contracts;
//! the forests below are the collaborators shipped in the artifact.

use log::info;
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::{RandomForestRegressor, RandomForestRegressorParameters};
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::config::ForestParams;
use crate::error::{PipelineError, Result};

/// Probability at or above which a row is labelled high risk.
pub const DECISION_THRESHOLD: f64 = 0.5;

pub trait Classifier {
    /// `[p(normal), p(high_risk)]` per row.
    fn predict_proba(&self, x: &[Vec<f64>]) -> Result<Vec<[f64; 2]>>;

    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<u8>> {
        Ok(self
            .predict_proba(x)?
            .iter()
            .map(|p| u8::from(p[1] >= DECISION_THRESHOLD))
            .collect())
    }
}

pub trait Regressor {
    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>>;
}

type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Row-major rows into the matrix type smartcore expects.
pub fn to_matrix(rows: &[Vec<f64>]) -> Result<DenseMatrix<f64>> {
    let nrows = rows.len();
    let ncols = rows.first().map(Vec::len).unwrap_or(0);
    if nrows == 0 || ncols == 0 {
        return Err(PipelineError::EmptyPartition {
            partition: "feature matrix".to_string(),
        });
    }
    let mut values = Vec::with_capacity(nrows * ncols);
    for row in rows {
        if row.len() != ncols {
            return Err(PipelineError::WidthMismatch {
                expected: ncols,
                got: row.len(),
            });
        }
        values.extend_from_slice(row);
    }
    Ok(DenseMatrix::new(nrows, ncols, values, false))
}

fn forest_parameters(params: &ForestParams, n_features: usize) -> Result<RandomForestRegressorParameters> {
    let n_trees = params.n_trees.try_into().map_err(|_| PipelineError::Config {
        reason: format!("n_trees {} out of range", params.n_trees),
    })?;
    let mut parameters = RandomForestRegressorParameters::default()
        .with_n_trees(n_trees)
        .with_min_samples_split(params.min_samples_split)
        .with_min_samples_leaf(params.min_samples_leaf)
        .with_m((n_features + 2) / 3)
        .with_seed(params.seed);
    if let Some(depth) = params.max_depth {
        parameters = parameters.with_max_depth(depth);
    }
    Ok(parameters)
}

fn fit_forest(x: &[Vec<f64>], y: Vec<f64>, params: &ForestParams) -> Result<Forest> {
    if x.len() != y.len() {
        return Err(PipelineError::WidthMismatch {
            expected: x.len(),
            got: y.len(),
        });
    }
    let matrix = to_matrix(x)?;
    let parameters = forest_parameters(params, x[0].len())?;
    Ok(RandomForestRegressor::fit(&matrix, &y, parameters)?)
}

/// Binary classifier: a regression forest on 0/1 labels, so each prediction
/// is the share of high-risk training rows in the matching leaves.
#[derive(Debug, Serialize, Deserialize)]
pub struct ForestClassifier {
    forest: Forest,
}

impl ForestClassifier {
    pub fn fit(x: &[Vec<f64>], y: &[u8], params: &ForestParams) -> Result<Self> {
        info!("training classifier on {} rows", x.len());
        let labels = y.iter().map(|&v| f64::from(v)).collect();
        Ok(Self {
            forest: fit_forest(x, labels, params)?,
        })
    }
}

impl Classifier for ForestClassifier {
    fn predict_proba(&self, x: &[Vec<f64>]) -> Result<Vec<[f64; 2]>> {
        let scores = self.forest.predict(&to_matrix(x)?)?;
        Ok(scores
            .into_iter()
            .map(|s| {
                let p = s.clamp(0.0, 1.0);
                [1.0 - p, p]
            })
            .collect())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ForestRegressor {
    forest: Forest,
}

impl ForestRegressor {
    pub fn fit(x: &[Vec<f64>], y: &[f64], params: &ForestParams) -> Result<Self> {
        info!("training regressor on {} rows", x.len());
        Ok(Self {
            forest: fit_forest(x, y.to_vec(), params)?,
        })
    }
}

impl Regressor for ForestRegressor {
    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>> {
        Ok(self.forest.predict(&to_matrix(x)?)?)
    }
}
