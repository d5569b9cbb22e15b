//! Training-time feature engineering.
//!
//! Turns the imputed (date, borough) table into the full feature table:
//! calendar fields, the borough one-hot block, per-borough lag and shifted
//! rolling means, and the daily temperature range.

use chrono::NaiveDate;
use log::info;
use polars::prelude::*;

use crate::borough::Borough;
use crate::config::FeatureConfig;
use crate::error::Result;
use crate::preprocess::{BOROUGH, DATE, DATE_FORMAT, TOTAL_HOSPITALIZATION};
use crate::temporal::{TemporalFeatures, TEMPORAL_COLUMNS};

pub const TEMP_RANGE: &str = "Temp_Range";

pub fn lag_column(column: &str, k: usize) -> String {
    format!("{}_lag{}", column, k)
}

pub fn rolling_column(column: &str, window: usize) -> String {
    format!("{}_roll{}", column, window)
}

/// One calendar field (by `TEMPORAL_COLUMNS` position) for every ISO date.
fn temporal_series(dates: &Series, idx: usize) -> PolarsResult<Series> {
    let values: Vec<Option<f64>> = dates
        .utf8()?
        .into_iter()
        .map(|raw| {
            raw.and_then(|d| NaiveDate::parse_from_str(d, DATE_FORMAT).ok())
                .map(|d| TemporalFeatures::from_date(d).columns()[idx].1)
        })
        .collect();
    Ok(Series::new(dates.name(), values))
}

/// `column` shifted `k` rows down inside each borough. Rows must be in date
/// order within a borough.
pub fn lag_expr(column: &str, k: usize) -> Expr {
    col(column)
        .shift(k as i64)
        .over([col(BOROUGH)])
        .alias(&lag_column(column, k))
}

/// Mean of the trailing `window` values (at least one present), ending
/// `shift` rows before the current one, inside each borough.
pub fn shifted_rolling_expr(column: &str, window: usize, shift: usize) -> Expr {
    let options = RollingOptions {
        window_size: Duration::new(window as i64),
        min_periods: 1,
        ..Default::default()
    };
    col(column)
        .shift(shift as i64)
        .rolling_mean(options)
        .over([col(BOROUGH)])
        .alias(&rolling_column(column, window))
}

fn with_columns_if_any(df: LazyFrame, exprs: Vec<Expr>) -> LazyFrame {
    if exprs.is_empty() {
        df
    } else {
        df.with_columns(exprs)
    }
}

pub struct FeatureEngineer {
    config: FeatureConfig,
}

impl FeatureEngineer {
    pub fn with_config(config: FeatureConfig) -> Self {
        Self { config }
    }

    /// Columns whose history must exist for a row to stay in the training set.
    fn history_columns(&self) -> Vec<String> {
        let mut names = Vec::new();
        if self.config.lag_columns.iter().any(|c| c == TOTAL_HOSPITALIZATION) {
            names.extend(self.config.lag_days.iter().map(|&k| lag_column(TOTAL_HOSPITALIZATION, k)));
        }
        if self.config.rolling_columns.iter().any(|c| c == TOTAL_HOSPITALIZATION) {
            names.push(rolling_column(TOTAL_HOSPITALIZATION, self.config.rolling_window));
        }
        names
    }

    pub fn build(&self, input: &DataFrame) -> Result<DataFrame> {
        let sorted = input.sort([BOROUGH, DATE], vec![false, false])?;
        let present: Vec<String> = sorted.get_column_names().iter().map(|s| s.to_string()).collect();
        let has = |name: &str| present.iter().any(|c| c == name);
        let mut df = sorted.lazy();

        let temporal: Vec<Expr> = TEMPORAL_COLUMNS
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                col(DATE)
                    .apply(
                        move |dates| temporal_series(&dates, idx).map(Some),
                        GetOutput::from_type(DataType::Float64),
                    )
                    .alias(name)
            })
            .collect();
        df = df.with_columns(temporal);

        let one_hot: Vec<Expr> = Borough::ALL
            .iter()
            .map(|b| {
                col(BOROUGH)
                    .eq(lit(b.as_str()))
                    .cast(DataType::Float64)
                    .alias(&b.column_name())
            })
            .collect();
        df = df.with_columns(one_hot);

        let lags: Vec<Expr> = self
            .config
            .lag_columns
            .iter()
            .filter(|c| has(c))
            .flat_map(|c| self.config.lag_days.iter().map(move |&k| lag_expr(c, k)))
            .collect();
        df = with_columns_if_any(df, lags);

        let (window, shift) = (self.config.rolling_window, self.config.rolling_shift);
        let rolling: Vec<Expr> = self
            .config
            .rolling_columns
            .iter()
            .filter(|c| has(c))
            .map(|c| shifted_rolling_expr(c, window, shift))
            .collect();
        df = with_columns_if_any(df, rolling);

        if has("Temp_Max_C") && has("Temp_Min_C") {
            df = df.with_column((col("Temp_Max_C") - col("Temp_Min_C")).alias(TEMP_RANGE));
        }

        let mut required = vec![TOTAL_HOSPITALIZATION.to_string()];
        if self.config.drop_incomplete_history {
            required.extend(self.history_columns());
        }
        let complete = required
            .iter()
            .fold(lit(true), |acc, name| acc.and(col(name).is_not_null()));
        let featured = df.filter(complete).collect()?;

        info!("temporal features and borough one-hot created");
        info!(
            "lag features {:?}, rolling window {} shifted by {}",
            self.config.lag_days, window, shift
        );
        info!(
            "final feature set: {} rows x {} columns ({} rows without history dropped)",
            featured.height(),
            featured.width(),
            input.height() - featured.height()
        );
        Ok(featured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::YEAR;

    fn floats(frame: &DataFrame, name: &str) -> Vec<Option<f64>> {
        frame.column(name).unwrap().f64().unwrap().into_iter().collect()
    }

    /// `days` consecutive days for queens (targets 0..) then bronx (100..).
    fn series_frame(days: usize) -> DataFrame {
        let start = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
        let mut dates = Vec::new();
        let mut boroughs = Vec::new();
        let mut years = Vec::new();
        let mut target = Vec::new();
        let mut tmax = Vec::new();
        for (borough, base) in [("queens", 0.0), ("bronx", 100.0)] {
            for d in 0..days {
                let date = start + chrono::Duration::days(d as i64);
                dates.push(date.format(DATE_FORMAT).to_string());
                boroughs.push(borough);
                years.push(2021);
                target.push(base + d as f64);
                tmax.push(d as f64 / 2.0);
            }
        }
        let tmin: Vec<f64> = tmax.iter().map(|v| v - 3.0).collect();
        df!(
            DATE => dates,
            BOROUGH => boroughs,
            YEAR => years,
            TOTAL_HOSPITALIZATION => target,
            "Temp_Max_C" => tmax,
            "Temp_Min_C" => tmin
        )
        .unwrap()
    }

    fn keep_all() -> FeatureConfig {
        FeatureConfig {
            drop_incomplete_history: false,
            ..FeatureConfig::default()
        }
    }

    #[test]
    fn lag7_matches_value_seven_rows_back_per_borough() {
        let built = FeatureEngineer::with_config(keep_all()).build(&series_frame(10)).unwrap();
        assert_eq!(built.height(), 20);

        let target = floats(&built, TOTAL_HOSPITALIZATION);
        let lagged = floats(&built, "Total_Hospitalization_lag7");
        // bronx rows come first after sorting, then queens
        for part in [0..10, 10..20] {
            for (j, row) in part.clone().enumerate() {
                if j < 7 {
                    assert_eq!(lagged[row], None);
                } else {
                    assert_eq!(lagged[row], target[row - 7]);
                }
            }
        }
    }

    #[test]
    fn rolling_mean_never_sees_current_row() {
        let frame = df!(
            DATE => ["2021-01-01", "2021-01-02", "2021-01-03", "2021-01-04", "2021-01-05"],
            BOROUGH => ["queens"; 5],
            "x" => [1.0, 2.0, 3.0, 4.0, 100.0]
        )
        .unwrap();
        let rolled = frame
            .lazy()
            .select([shifted_rolling_expr("x", 3, 1)])
            .collect()
            .unwrap();
        assert_eq!(
            floats(&rolled, "x_roll3"),
            vec![None, Some(1.0), Some(1.5), Some(2.0), Some(3.0)]
        );
    }

    #[test]
    fn windows_restart_at_each_borough() {
        let frame = df!(
            DATE => ["2021-01-01", "2021-01-02", "2021-01-01", "2021-01-02"],
            BOROUGH => ["bronx", "bronx", "queens", "queens"],
            "x" => [1.0, 2.0, 10.0, 20.0]
        )
        .unwrap();
        let out = frame
            .lazy()
            .select([lag_expr("x", 1), shifted_rolling_expr("x", 7, 1)])
            .collect()
            .unwrap();
        assert_eq!(floats(&out, "x_lag1"), vec![None, Some(1.0), None, Some(10.0)]);
        assert_eq!(floats(&out, "x_roll7"), vec![None, Some(1.0), None, Some(10.0)]);
    }

    #[test]
    fn build_emits_all_families_and_drops_short_history() {
        let built = FeatureEngineer::with_config(FeatureConfig::default())
            .build(&series_frame(10))
            .unwrap();

        // first 7 days of each borough have no lag7 for the target
        assert_eq!(built.height(), 2 * 3);
        let names = built.get_column_names();
        for name in [
            "month",
            "season",
            "is_weekend",
            "borough_bronx",
            "borough_staten_island",
            "Total_Hospitalization_lag7",
            "Temp_Max_C_lag7",
            "Total_Hospitalization_roll7",
            "Temp_Max_C_roll7",
            TEMP_RANGE,
        ] {
            assert!(names.contains(&name), "missing {}", name);
        }
        assert!(!names.contains(&"Humidity_Avg_lag7"));

        let target = floats(&built, TOTAL_HOSPITALIZATION);
        let lagged = floats(&built, "Total_Hospitalization_lag7");
        for (t, l) in target.iter().zip(&lagged) {
            assert_eq!(l.unwrap(), t.unwrap() - 7.0);
        }
        assert!(floats(&built, TEMP_RANGE).iter().all(|v| *v == Some(3.0)));
        assert_eq!(floats(&built, "borough_bronx"), vec![Some(1.0), Some(1.0), Some(1.0), Some(0.0), Some(0.0), Some(0.0)]);
        // 2021-01-08 is a Friday, 2021-01-09 a Saturday
        assert_eq!(floats(&built, "is_weekend")[..3], [Some(0.0), Some(1.0), Some(1.0)]);
    }

    #[test]
    fn build_keeps_rows_when_history_not_required() {
        let built = FeatureEngineer::with_config(keep_all()).build(&series_frame(10)).unwrap();
        assert_eq!(built.height(), 20);
    }
}
