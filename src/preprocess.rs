//! Cleaning, aggregation, merge and imputation of the raw tables.
//!
//! Raw records are turned into long polars frames keyed by (`Date`,
//! `borough`) and everything after that runs as lazy polars queries.

use std::collections::{BTreeSet, HashMap};

use chrono::Datelike;
use lazy_static::lazy_static;
use log::{debug, info};
use polars::prelude::*;

use crate::borough::Borough;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::records::{parse_date, parse_number, AdmissionRecord, AirQualityRecord, RawTables, WeatherRecord};

pub const DATE: &str = "Date";
pub const BOROUGH: &str = "borough";
pub const YEAR: &str = "year";
/// `Date` is stored as ISO text so that it sorts and joins as-is.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub const RESPIRATORY_COUNT: &str = "Respiratory_Count";
pub const ASTHMA_COUNT: &str = "Asthma_Count";
pub const TOTAL_HOSPITALIZATION: &str = "Total_Hospitalization";

const POLLUTANT: &str = "pollutant";
const VALUE: &str = "value";

/// Weather columns in output order, keyed by raw station code.
pub const WEATHER_COLUMNS: [(&str, &str); 7] = [
    ("TMAX", "Temp_Max_C"),
    ("TMIN", "Temp_Min_C"),
    ("PRCP", "Precip_mm"),
    ("AWND", "WindSpeed_mps"),
    ("RHAV", "Humidity_Avg"),
    ("RHMX", "Humidity_Max"),
    ("RHMN", "Humidity_Min"),
];

lazy_static! {
    /// Indicator names of the air quality feed mapped to the serving keys.
    static ref POLLUTANT_COLUMNS: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("fine particles (pm 2.5)", "AQ_PM2_5");
        m.insert("fine particulate matter (pm2.5)", "AQ_PM2_5");
        m.insert("pm2.5", "AQ_PM2_5");
        m.insert("pm 2.5", "AQ_PM2_5");
        m.insert("ozone (o3)", "AQ_Ozone");
        m.insert("ozone", "AQ_Ozone");
        m.insert("nitrogen dioxide (no2)", "AQ_NO2");
        m.insert("no2", "AQ_NO2");
        m
    };
}

fn normalize_borough(raw: &Option<String>) -> String {
    raw.as_deref().unwrap_or_default().trim().to_lowercase()
}

pub fn key_columns() -> [Expr; 2] {
    [col(DATE), col(BOROUGH)]
}

/// Rows whose `year` is one of `years`.
pub fn year_filter(years: &[i32]) -> Expr {
    years
        .iter()
        .fold(lit(false), |acc, &year| acc.or(col(YEAR).eq(lit(year))))
}

fn left_join_on_keys(left: LazyFrame, right: LazyFrame) -> LazyFrame {
    left.join_builder()
        .with(right)
        .left_on(key_columns())
        .right_on(key_columns())
        .how(JoinType::Left)
        .finish()
}

fn numeric_columns(frame: &DataFrame) -> Vec<String> {
    frame
        .get_columns()
        .iter()
        .filter(|s| s.dtype() == &DataType::Float64)
        .map(|s| s.name().to_string())
        .collect()
}

/// Per (date, borough) weather measurements, renamed and averaged.
/// Measurements the feed never reports are not carried as empty columns.
pub fn prepare_weather(records: &[WeatherRecord]) -> Result<DataFrame> {
    let mut dates = Vec::with_capacity(records.len());
    let mut boroughs = Vec::with_capacity(records.len());
    let mut values: Vec<Vec<Option<f64>>> = vec![Vec::with_capacity(records.len()); WEATHER_COLUMNS.len()];
    let mut skipped = 0usize;

    for record in records {
        let Some(date) = parse_date(&record.date) else {
            skipped += 1;
            continue;
        };
        dates.push(date.format(DATE_FORMAT).to_string());
        boroughs.push(normalize_borough(&record.borough));
        for (column, (_, raw)) in values.iter_mut().zip(record.measurements()) {
            column.push(parse_number(raw));
        }
    }

    let mut series = vec![Series::new(DATE, dates), Series::new(BOROUGH, boroughs)];
    let mut aggs = Vec::with_capacity(WEATHER_COLUMNS.len());
    for ((_, name), column) in WEATHER_COLUMNS.iter().zip(values) {
        series.push(Series::new(name, column));
        aggs.push(col(name).mean());
    }

    let grouped = DataFrame::new(series)?
        .lazy()
        .groupby_stable(key_columns())
        .agg(aggs)
        .collect()?;
    let empty: Vec<String> = grouped
        .get_columns()
        .iter()
        .filter(|s| s.dtype() == &DataType::Float64 && s.null_count() == s.len())
        .map(|s| s.name().to_string())
        .collect();
    let table = grouped.drop_many(&empty);

    info!(
        "weather data: {} rows x {} columns ({} rows without a date)",
        table.height(),
        table.width() - 2,
        skipped
    );
    Ok(table)
}

/// Respiratory and asthma counts summed per (date, borough). A key reported
/// by only one of the tables gets 0 for the other; only `years` are kept.
pub fn prepare_health(respiratory: &[AdmissionRecord], asthma: &[AdmissionRecord], years: &[i32]) -> Result<DataFrame> {
    let capacity = respiratory.len() + asthma.len();
    let mut dates = Vec::with_capacity(capacity);
    let mut boroughs = Vec::with_capacity(capacity);
    let mut year = Vec::with_capacity(capacity);
    let mut resp = Vec::with_capacity(capacity);
    let mut asth = Vec::with_capacity(capacity);

    for (records, is_respiratory) in [(respiratory, true), (asthma, false)] {
        for record in records {
            let Some(date) = parse_date(&record.date) else {
                continue;
            };
            let count = parse_number(&record.count).unwrap_or(0.0);
            dates.push(date.format(DATE_FORMAT).to_string());
            boroughs.push(normalize_borough(&record.borough));
            year.push(date.year());
            resp.push(if is_respiratory { count } else { 0.0 });
            asth.push(if is_respiratory { 0.0 } else { count });
        }
    }

    let health = DataFrame::new(vec![
        Series::new(DATE, dates),
        Series::new(BOROUGH, boroughs),
        Series::new(YEAR, year),
        Series::new(RESPIRATORY_COUNT, resp),
        Series::new(ASTHMA_COUNT, asth),
    ])?
    .lazy()
    .filter(year_filter(years))
    .groupby_stable(key_columns())
    .agg([
        col(YEAR).first(),
        col(RESPIRATORY_COUNT).sum(),
        col(ASTHMA_COUNT).sum(),
    ])
    .with_column((col(RESPIRATORY_COUNT) + col(ASTHMA_COUNT)).alias(TOTAL_HOSPITALIZATION))
    .collect()?;

    info!("health data: {} rows", health.height());
    Ok(health)
}

pub fn pollutant_column(indicator: &str) -> String {
    let lowered = indicator.trim().to_lowercase();
    match POLLUTANT_COLUMNS.get(lowered.as_str()) {
        Some(name) => name.to_string(),
        None => {
            let cleaned: String = indicator
                .trim()
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .collect();
            format!("AQ_{}", cleaned)
        }
    }
}

/// Long-format pollutant readings pivoted to one mean column per indicator,
/// columns in name order.
pub fn prepare_air_quality(records: &[AirQualityRecord]) -> Result<DataFrame> {
    let mut dates = Vec::with_capacity(records.len());
    let mut boroughs = Vec::with_capacity(records.len());
    let mut pollutants = Vec::with_capacity(records.len());
    let mut values = Vec::with_capacity(records.len());

    for record in records {
        let (Some(date), Some(name)) = (parse_date(&record.date), record.name.as_deref()) else {
            continue;
        };
        dates.push(date.format(DATE_FORMAT).to_string());
        boroughs.push(normalize_borough(&record.borough));
        pollutants.push(pollutant_column(name));
        values.push(parse_number(&record.value));
    }
    let names: BTreeSet<String> = pollutants.iter().cloned().collect();

    let long = DataFrame::new(vec![
        Series::new(DATE, dates),
        Series::new(BOROUGH, boroughs),
        Series::new(POLLUTANT, pollutants),
        Series::new(VALUE, values),
    ])?;

    let mut wide = long
        .clone()
        .lazy()
        .select(key_columns())
        .unique_stable(None, UniqueKeepStrategy::First);
    for name in &names {
        let column = long
            .clone()
            .lazy()
            .filter(col(POLLUTANT).eq(lit(name.as_str())))
            .groupby_stable(key_columns())
            .agg([col(VALUE).mean().alias(name)]);
        wide = left_join_on_keys(wide, column);
    }
    let wide = wide.collect()?;

    info!("air quality data: {} rows x {} pollutants", wide.height(), names.len());
    Ok(wide)
}

/// Left-joins weather and air quality onto the health rows and drops rows
/// whose borough is outside `valid`.
pub fn merge_all(
    health: DataFrame,
    weather: DataFrame,
    air_quality: DataFrame,
    valid: &[Borough],
) -> Result<DataFrame> {
    let before = health.height();
    let in_vocabulary = valid
        .iter()
        .fold(lit(false), |acc, b| acc.or(col(BOROUGH).eq(lit(b.as_str()))));

    let health = health.lazy().filter(in_vocabulary);
    let merged = left_join_on_keys(left_join_on_keys(health, weather.lazy()), air_quality.lazy()).collect()?;

    if merged.height() < before {
        debug!("dropped {} rows outside the borough vocabulary", before - merged.height());
    }
    info!("merged data: {} rows x {} columns", merged.height(), merged.width());
    Ok(merged)
}

/// One tier of the missing-value fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillStep {
    /// Last seen value earlier in the same borough.
    ForwardFill,
    /// Next seen value later in the same borough.
    BackwardFill,
    /// Mean of the whole column.
    ColumnMean,
}

impl FillStep {
    fn expr(&self, name: &str) -> Expr {
        match self {
            FillStep::ForwardFill => col(name).forward_fill(None).over([col(BOROUGH)]),
            FillStep::BackwardFill => col(name).backward_fill(None).over([col(BOROUGH)]),
            FillStep::ColumnMean => col(name).fill_null(col(name).mean()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImputationChain {
    steps: Vec<FillStep>,
}

impl Default for ImputationChain {
    fn default() -> Self {
        Self {
            steps: vec![FillStep::ForwardFill, FillStep::BackwardFill, FillStep::ColumnMean],
        }
    }
}

impl ImputationChain {
    pub fn new(steps: Vec<FillStep>) -> Self {
        Self { steps }
    }

    /// Sorts by (borough, date) and fills every float column tier by tier.
    /// A column with no values at all stays missing.
    pub fn apply(&self, frame: &DataFrame) -> Result<DataFrame> {
        let sorted = frame.sort([BOROUGH, DATE], vec![false, false])?;
        let columns = numeric_columns(&sorted);

        let mut lazy = sorted.lazy();
        for step in &self.steps {
            let exprs: Vec<Expr> = columns.iter().map(|name| step.expr(name)).collect();
            lazy = lazy.with_columns(exprs);
        }
        let filled = lazy.collect()?;
        info!("missing values imputed");
        Ok(filled)
    }
}

/// Full preprocessing: per-table cleaning, merge, imputation.
pub fn preprocess(raw: &RawTables, config: &PipelineConfig) -> Result<DataFrame> {
    let weather = prepare_weather(&raw.weather)?;
    let health = prepare_health(&raw.respiratory, &raw.asthma, &config.split.all_years())?;
    let air_quality = prepare_air_quality(&raw.air_quality)?;
    let merged = merge_all(health, weather, air_quality, &config.valid_boroughs()?)?;
    ImputationChain::default().apply(&merged)
}
