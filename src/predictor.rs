//! Serving path: typed requests, feature reconstruction and the joint
//! classification + regression prediction.
//!
//! A request can only carry what a caller knows about a single day. Calendar
//! fields and the borough block are derived here exactly as in training; lag
//! and rolling columns are taken only when the caller supplies them and are
//! otherwise left to the aligner default.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::borough::Borough;
use crate::error::{PipelineError, Result};
use crate::features::TEMP_RANGE;
use crate::model::{Classifier, Regressor};
use crate::scaler::StandardScaler;
use crate::schema::{FeatureAligner, FeatureVector, SchemaRegistry};
use crate::temporal::{self, TemporalFeatures};

/// Every option a prediction request recognises. Absent options stay absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    /// Source for all calendar fields; explicit fields below override it.
    pub date: Option<NaiveDate>,

    #[serde(rename = "Temp_Max_C")]
    pub temp_max_c: Option<f64>,
    #[serde(rename = "Temp_Min_C")]
    pub temp_min_c: Option<f64>,
    #[serde(rename = "Humidity_Avg")]
    pub humidity_avg: Option<f64>,
    #[serde(rename = "Precip_mm")]
    pub precip_mm: Option<f64>,
    #[serde(rename = "WindSpeed_mps")]
    pub wind_speed_mps: Option<f64>,

    #[serde(rename = "AQ_PM2_5")]
    pub aq_pm2_5: Option<f64>,
    #[serde(rename = "AQ_Ozone")]
    pub aq_ozone: Option<f64>,
    #[serde(rename = "AQ_NO2")]
    pub aq_no2: Option<f64>,

    pub month: Option<u32>,
    pub day: Option<u32>,
    pub day_of_week: Option<u32>,
    pub quarter: Option<u32>,
    pub season: Option<u32>,

    pub borough: Option<String>,

    /// Precomputed `<column>_lag<k>` / `<column>_roll<w>` values.
    #[serde(flatten)]
    pub history: BTreeMap<String, f64>,
}

fn is_history_column(name: &str) -> bool {
    ["_lag", "_roll"].iter().any(|marker| {
        name.rsplit_once(marker)
            .map(|(head, k)| !head.is_empty() && !k.is_empty() && k.chars().all(|c| c.is_ascii_digit()))
            .unwrap_or(false)
    })
}

fn check_range(field: &str, value: u32, range: std::ops::RangeInclusive<u32>) -> Result<f64> {
    if range.contains(&value) {
        Ok(value as f64)
    } else {
        Err(PipelineError::InvalidField {
            field: field.to_string(),
            value: value as f64,
        })
    }
}

impl PredictionRequest {
    /// Partial feature mapping for the aligner. Fails on an unknown borough
    /// or an out-of-range calendar field.
    pub fn to_partial(&self) -> Result<HashMap<String, f64>> {
        let mut partial = HashMap::new();

        if let Some(date) = self.date {
            for (name, value) in TemporalFeatures::from_date(date).columns() {
                partial.insert(name.to_string(), value);
            }
        }
        let overrides = [
            ("month", self.month, 1..=12),
            ("day", self.day, 1..=31),
            ("day_of_week", self.day_of_week, 0..=6),
            ("quarter", self.quarter, 1..=4),
            ("season", self.season, 1..=4),
        ];
        for (name, value, range) in overrides {
            if let Some(v) = value {
                partial.insert(name.to_string(), check_range(name, v, range)?);
            }
        }
        // quarter and season follow an overridden month unless given too
        if let Some(month) = self.month {
            if self.quarter.is_none() {
                partial.insert("quarter".to_string(), temporal::quarter_of(month) as f64);
            }
            if self.season.is_none() {
                partial.insert("season".to_string(), temporal::season_of(month) as f64);
            }
        }
        if let Some(dow) = self.day_of_week {
            partial.insert("is_weekend".to_string(), temporal::is_weekend(dow) as f64);
        }

        let measurements = [
            ("Temp_Max_C", self.temp_max_c),
            ("Temp_Min_C", self.temp_min_c),
            ("Humidity_Avg", self.humidity_avg),
            ("Precip_mm", self.precip_mm),
            ("WindSpeed_mps", self.wind_speed_mps),
            ("AQ_PM2_5", self.aq_pm2_5),
            ("AQ_Ozone", self.aq_ozone),
            ("AQ_NO2", self.aq_no2),
        ];
        for (name, value) in measurements {
            if let Some(v) = value {
                partial.insert(name.to_string(), v);
            }
        }
        if let (Some(max), Some(min)) = (self.temp_max_c, self.temp_min_c) {
            partial.insert(TEMP_RANGE.to_string(), max - min);
        }

        if let Some(raw) = &self.borough {
            for (name, value) in Borough::parse(raw)?.one_hot() {
                partial.insert(name, value);
            }
        }

        for (name, value) in &self.history {
            if is_history_column(name) {
                partial.insert(name.clone(), *value);
            }
        }
        Ok(partial)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassProbabilities {
    pub normal: f64,
    pub high_risk: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub is_high_risk: bool,
    /// Probability of the high-risk class.
    pub probability: f64,
    pub probabilities: ClassProbabilities,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionResult {
    pub predicted_admissions: f64,
    pub predicted_admissions_rounded: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub classification: ClassificationResult,
    pub regression: RegressionResult,
}

/// Classifier and regressor over one shared, frozen feature space.
#[derive(Debug, Clone, Copy)]
pub struct DualPredictor<'a, C, R> {
    schema: &'a SchemaRegistry,
    scaler: &'a StandardScaler,
    classifier: &'a C,
    regressor: &'a R,
}

impl<'a, C: Classifier, R: Regressor> DualPredictor<'a, C, R> {
    pub fn new(schema: &'a SchemaRegistry, scaler: &'a StandardScaler, classifier: &'a C, regressor: &'a R) -> Self {
        Self {
            schema,
            scaler,
            classifier,
            regressor,
        }
    }

    pub fn schema(&self) -> &SchemaRegistry {
        self.schema
    }

    pub fn align(&self, partial: &HashMap<String, f64>) -> Result<FeatureVector> {
        FeatureAligner::new(self.schema).align(partial)
    }

    fn scaled(&self, vector: &FeatureVector) -> Result<Vec<Vec<f64>>> {
        if vector.len() != self.schema.len() {
            return Err(PipelineError::WidthMismatch {
                expected: self.schema.len(),
                got: vector.len(),
            });
        }
        Ok(vec![self.scaler.transform_vector(vector)?])
    }

    pub fn predict_classification(&self, vector: &FeatureVector) -> Result<ClassificationResult> {
        let x = self.scaled(vector)?;
        let proba = self
            .classifier
            .predict_proba(&x)?
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::Model("classifier returned no rows".to_string()))?;
        let label = self
            .classifier
            .predict(&x)?
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::Model("classifier returned no rows".to_string()))?;
        Ok(ClassificationResult {
            is_high_risk: label == 1,
            probability: proba[1],
            probabilities: ClassProbabilities {
                normal: proba[0],
                high_risk: proba[1],
            },
        })
    }

    pub fn predict_regression(&self, vector: &FeatureVector) -> Result<RegressionResult> {
        let x = self.scaled(vector)?;
        let predicted = self
            .regressor
            .predict(&x)?
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::Model("regressor returned no rows".to_string()))?;
        Ok(RegressionResult {
            predicted_admissions: predicted,
            predicted_admissions_rounded: predicted.round().max(0.0) as u64,
        })
    }

    pub fn predict(&self, vector: &FeatureVector) -> Result<PredictionResponse> {
        Ok(PredictionResponse {
            classification: self.predict_classification(vector)?,
            regression: self.predict_regression(vector)?,
        })
    }

    /// Request → partial mapping → aligned vector → both predictions.
    pub fn predict_request(&self, request: &PredictionRequest) -> Result<PredictionResponse> {
        let vector = self.align(&request.to_partial()?)?;
        self.predict(&vector)
    }
}
