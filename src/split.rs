//! Year-based partitioning and target labelling.

use log::{info, warn};
use polars::prelude::*;

use crate::config::{SplitConfig, TargetConfig};
use crate::error::{PipelineError, Result};
use crate::preprocess::{year_filter, TOTAL_HOSPITALIZATION, YEAR};
use crate::scaler::StandardScaler;
use crate::schema::SchemaRegistry;

pub const HIGH_RISK: &str = "High_Risk";

fn in_years(frame: &DataFrame, years: &[i32]) -> Result<DataFrame> {
    Ok(frame.clone().lazy().filter(year_filter(years)).collect()?)
}

/// Linear-interpolated percentile of the target over the training rows.
pub fn high_risk_threshold(train: &DataFrame, percentile: f64) -> Result<f64> {
    let totals = train.column(TOTAL_HOSPITALIZATION)?.cast(&DataType::Float64)?;
    totals
        .f64()?
        .quantile(percentile / 100.0, QuantileInterpolOptions::Linear)?
        .ok_or_else(|| PipelineError::EmptyPartition {
            partition: "train".to_string(),
        })
}

fn label_high_risk(frame: DataFrame, threshold: f64) -> Result<DataFrame> {
    let labelled = frame
        .lazy()
        .with_column(
            col(TOTAL_HOSPITALIZATION)
                .gt_eq(lit(threshold))
                .cast(DataType::Float64)
                .alias(HIGH_RISK),
        )
        .collect()?;
    Ok(labelled)
}

/// Rows of one partition, features already scaled.
#[derive(Debug, Clone, Default)]
pub struct Partition {
    pub x: Vec<Vec<f64>>,
    pub y_class: Vec<u8>,
    pub y_reg: Vec<f64>,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Unscaled partition out of a labelled table.
    fn from_frame(frame: &DataFrame, schema: &SchemaRegistry) -> Result<Self> {
        let x = schema.matrix(frame)?;
        let y_class = frame
            .column(HIGH_RISK)?
            .f64()?
            .into_iter()
            .map(|v| u8::from(v == Some(1.0)))
            .collect();
        let y_reg = frame
            .column(TOTAL_HOSPITALIZATION)?
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect();
        Ok(Self { x, y_class, y_reg })
    }
}

#[derive(Debug)]
pub struct PreparedSplits {
    pub train: Partition,
    pub val: Partition,
    pub test: Partition,
    pub schema: SchemaRegistry,
    pub scaler: StandardScaler,
    pub threshold: f64,
    /// Featured table restricted to the configured years, with `High_Risk`.
    pub labelled: DataFrame,
}

/// Builds the schema, splits by year, fixes the `High_Risk` threshold on the
/// training years alone, labels every partition with it and fits the scaler
/// on the training partition.
pub fn prepare_splits(frame: &DataFrame, split: &SplitConfig, target: &TargetConfig) -> Result<PreparedSplits> {
    let schema = SchemaRegistry::from_frame(frame)?;

    let train_frame = in_years(frame, &split.train_years)?;
    let threshold = high_risk_threshold(&train_frame, target.threshold_percentile)?;

    let mut all_years = split.train_years.clone();
    all_years.extend([split.val_year, split.test_year]);
    let labelled = label_high_risk(in_years(frame, &all_years)?, threshold)?;

    let mut train = Partition::from_frame(&label_high_risk(train_frame, threshold)?, &schema)?;
    let mut val = Partition::from_frame(&in_years(&labelled, &[split.val_year])?, &schema)?;
    let mut test = Partition::from_frame(&in_years(&labelled, &[split.test_year])?, &schema)?;

    let scaler = StandardScaler::fit(&train.x)?;
    train.x = scaler.transform(&train.x)?;
    val.x = scaler.transform(&val.x)?;
    test.x = scaler.transform(&test.x)?;

    let positives = train.y_class.iter().filter(|&&c| c == 1).count();
    info!(
        "High_Risk threshold {:.0} at the {}th percentile of {:?}; {} of {} training rows positive",
        threshold,
        target.threshold_percentile,
        split.train_years,
        positives,
        train.len()
    );
    info!("train: {} rows ({:?})", train.len(), split.train_years);
    info!("val: {} rows ({})", val.len(), split.val_year);
    info!("test: {} rows ({})", test.len(), split.test_year);
    if val.is_empty() || test.is_empty() {
        warn!("validation or test partition is empty");
    }

    Ok(PreparedSplits {
        train,
        val,
        test,
        schema,
        scaler,
        threshold,
        labelled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_over_years() -> DataFrame {
        // train years are low, test year is high: a per-partition threshold
        // would label half of the test rows as high risk
        let mut dates = Vec::new();
        let mut years = Vec::new();
        let mut totals = Vec::new();
        for (year, base) in [(2019, 0.0), (2020, 10.0), (2021, 100.0), (2022, 1000.0), (2023, 5.0)] {
            for d in 1..=4 {
                dates.push(format!("{}-01-0{}", year, d));
                years.push(year);
                totals.push(base + d as f64);
            }
        }
        let n = dates.len();
        df!(
            "Date" => dates,
            "borough" => vec!["queens"; n],
            YEAR => years,
            TOTAL_HOSPITALIZATION => totals,
            "month" => (0..n).map(|i| i as f64).collect::<Vec<_>>(),
            "year_index" => vec![1.0; n]
        )
        .unwrap()
    }

    fn split_config() -> SplitConfig {
        SplitConfig {
            train_years: vec![2019, 2020],
            val_year: 2021,
            test_year: 2022,
        }
    }

    #[test]
    fn threshold_interpolates_linearly() {
        let frame = df!(TOTAL_HOSPITALIZATION => [1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(high_risk_threshold(&frame, 50.0).unwrap(), 2.5);
        assert_eq!(high_risk_threshold(&frame, 75.0).unwrap(), 3.25);
        assert_eq!(high_risk_threshold(&frame, 100.0).unwrap(), 4.0);
    }

    #[test]
    fn threshold_comes_from_training_years_only() {
        let prepared = prepare_splits(&frame_over_years(), &split_config(), &TargetConfig::default()).unwrap();
        // training totals 1..4 and 11..14; 75th percentile
        assert_eq!(prepared.threshold, 12.25);
        assert_eq!(prepared.train.len(), 8);
        assert_eq!(prepared.train.y_class.iter().filter(|&&c| c == 1).count(), 2);
        assert!(prepared.val.y_class.iter().all(|&c| c == 1));
        assert!(prepared.test.y_class.iter().all(|&c| c == 1));
        assert_eq!(prepared.test.y_reg, vec![1001.0, 1002.0, 1003.0, 1004.0]);
    }

    #[test]
    fn years_outside_the_split_are_excluded() {
        let prepared = prepare_splits(&frame_over_years(), &split_config(), &TargetConfig::default()).unwrap();
        assert_eq!(prepared.labelled.height(), 16);
        assert_eq!(prepared.val.len() + prepared.test.len(), 8);
        assert!(prepared.labelled.column(HIGH_RISK).is_ok());
    }

    #[test]
    fn schema_excludes_targets_and_year_columns() {
        let prepared = prepare_splits(&frame_over_years(), &split_config(), &TargetConfig::default()).unwrap();
        assert_eq!(prepared.schema.columns(), &["month".to_string()]);
        assert!(prepared.scaler.is_fit());
    }

    #[test]
    fn empty_training_partition_fails() {
        let split = SplitConfig {
            train_years: vec![1999],
            val_year: 2021,
            test_year: 2022,
        };
        let err = prepare_splits(&frame_over_years(), &split, &TargetConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyPartition { .. }));
    }
}
