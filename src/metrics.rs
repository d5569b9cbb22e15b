use serde::{Deserialize, Serialize};
use smartcore::metrics::{accuracy, mean_absolute_error, mean_squared_error, precision, r2, recall, roc_auc_score};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    /// Undefined when the partition holds a single class.
    pub auroc: Option<f64>,
    pub recall: Option<f64>,
    pub precision: Option<f64>,
}

impl ClassificationMetrics {
    pub fn compute(y_true: &[u8], y_pred: &[u8], p_high_risk: &[f64]) -> Self {
        let truth: Vec<f64> = y_true.iter().map(|&v| f64::from(v)).collect();
        let pred: Vec<f64> = y_pred.iter().map(|&v| f64::from(v)).collect();
        let scores: Vec<f64> = p_high_risk.to_vec();

        let positives = y_true.iter().filter(|&&v| v == 1).count();
        let both_classes = positives > 0 && positives < y_true.len();
        let any_predicted = y_pred.iter().any(|&v| v == 1);

        Self {
            accuracy: accuracy(&y_true.to_vec(), &y_pred.to_vec()),
            auroc: both_classes.then(|| roc_auc_score(&truth, &scores)),
            recall: (positives > 0).then(|| recall(&truth, &pred)),
            precision: any_predicted.then(|| precision(&truth, &pred)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub r2: f64,
    pub mae: f64,
    pub rmse: f64,
}

impl RegressionMetrics {
    pub fn compute(y_true: &[f64], y_pred: &[f64]) -> Self {
        let truth = y_true.to_vec();
        let pred = y_pred.to_vec();
        Self {
            r2: r2(&truth, &pred),
            mae: mean_absolute_error(&truth, &pred),
            rmse: mean_squared_error(&truth, &pred).sqrt(),
        }
    }
}
