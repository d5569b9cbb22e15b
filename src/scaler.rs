use num::Float;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::schema::FeatureVector;

/// Per-column standardisation, fitted once on the training partition and
/// frozen afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Option<Vec<f64>>,
    scale: Option<Vec<f64>>,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_fit(&self) -> bool {
        self.mean.is_some() && self.scale.is_some()
    }

    /// Population mean and standard deviation per column. Constant columns
    /// get a scale of 1 so they map to 0.
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self> {
        let Some(first) = rows.first() else {
            return Err(PipelineError::EmptyPartition {
                partition: "scaler fit".to_string(),
            });
        };
        let width = first.len();
        for row in rows {
            check_width(width, row.len())?;
        }

        let (mean, scale): (Vec<f64>, Vec<f64>) = (0..width)
            .map(|j| {
                let column: Vec<f64> = rows.iter().map(|row| row[j]).collect();
                let (mean, sd) = population_stats(&column).unwrap_or((0.0, 0.0));
                (mean, if sd > f64::EPSILON { sd } else { 1.0 })
            })
            .unzip();

        Ok(Self {
            mean: Some(mean),
            scale: Some(scale),
        })
    }

    pub fn width(&self) -> Option<usize> {
        self.mean.as_ref().map(Vec::len)
    }

    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        let (Some(mean), Some(scale)) = (&self.mean, &self.scale) else {
            return Err(PipelineError::ScalerNotFit);
        };
        check_width(mean.len(), row.len())?;
        Ok(row
            .iter()
            .zip(mean.iter().zip(scale))
            .map(|(v, (m, s))| (v - m) / s)
            .collect())
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        rows.iter().map(|row| self.transform_row(row)).collect()
    }

    pub fn transform_vector(&self, vector: &FeatureVector) -> Result<Vec<f64>> {
        self.transform_row(vector.values())
    }
}

/// Population mean and standard deviation, `None` for no values.
pub fn population_stats<T: Float>(values: &[T]) -> Option<(T, T)> {
    let n = T::from(values.len())?;
    if values.is_empty() {
        return None;
    }
    let mean = values.iter().fold(T::zero(), |acc, &v| acc + v) / n;
    let var = values.iter().fold(T::zero(), |acc, &v| acc + (v - mean).powi(2)) / n;
    Some((mean, var.sqrt()))
}

fn check_width(expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(PipelineError::WidthMismatch { expected, got });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(rows: &[Vec<f64>], j: usize) -> Vec<f64> {
        rows.iter().map(|r| r[j]).collect()
    }

    #[test]
    fn training_partition_is_standardised() {
        let rows: Vec<Vec<f64>> = (0..50)
            .map(|i| {
                let x = i as f64;
                vec![x, 3.0 * x + 10.0, (x * 0.7).sin() * 4.0]
            })
            .collect();
        let scaler = StandardScaler::fit(&rows).unwrap();
        let scaled = scaler.transform(&rows).unwrap();

        for j in 0..3 {
            let col = column(&scaled, j);
            let mean = col.iter().sum::<f64>() / col.len() as f64;
            let sd = (col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / col.len() as f64).sqrt();
            assert!(mean.abs() < 1e-9, "column {} mean {}", j, mean);
            assert!((sd - 1.0).abs() < 1e-9, "column {} sd {}", j, sd);
        }
    }

    #[test]
    fn population_stats_divide_by_n() {
        assert_eq!(population_stats(&[2.0_f64, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), Some((5.0, 2.0)));
        assert_eq!(population_stats(&[1.5_f32]), Some((1.5, 0.0)));
        assert_eq!(population_stats::<f64>(&[]), None);
    }

    #[test]
    fn constant_column_maps_to_zero() {
        let rows = vec![vec![5.0, 1.0], vec![5.0, 3.0]];
        let scaler = StandardScaler::fit(&rows).unwrap();
        assert_eq!(scaler.transform_row(&[5.0, 2.0]).unwrap(), vec![0.0, 0.0]);
    }

    #[test]
    fn unfit_scaler_is_rejected() {
        let scaler = StandardScaler::new();
        assert!(!scaler.is_fit());
        assert!(matches!(scaler.transform_row(&[1.0]), Err(PipelineError::ScalerNotFit)));
    }

    #[test]
    fn frozen_statistics_apply_to_new_rows() {
        let scaler = StandardScaler::fit(&[vec![0.0], vec![2.0]]).unwrap();
        // mean 1, sd 1
        assert_eq!(scaler.transform_row(&[11.0]).unwrap(), vec![10.0]);
        assert!(matches!(
            scaler.transform_row(&[1.0, 2.0]),
            Err(PipelineError::WidthMismatch { expected: 1, got: 2 })
        ));
    }
}
