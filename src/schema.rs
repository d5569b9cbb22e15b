//! The ordered feature schema fixed at training time, and the aligner that
//! forces every input into that exact shape.

use std::collections::{HashMap, HashSet};

use polars::prelude::{DataFrame, DataType};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::preprocess::{ASTHMA_COUNT, RESPIRATORY_COUNT, TOTAL_HOSPITALIZATION};
use crate::split::HIGH_RISK;

/// Value used for every schema column the input does not supply.
pub const MISSING_FEATURE_DEFAULT: f64 = 0.0;

/// Ordered, immutable list of feature column names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct SchemaRegistry {
    columns: Vec<String>,
}

impl SchemaRegistry {
    /// Fails with `SchemaUnavailable` on an empty list or duplicate names.
    pub fn new(columns: Vec<String>) -> Result<Self> {
        if columns.is_empty() {
            return Err(PipelineError::SchemaUnavailable {
                reason: "no feature columns".to_string(),
            });
        }
        let duplicate = {
            let mut seen = HashSet::new();
            columns.iter().find(|c| !seen.insert(c.as_str())).cloned()
        };
        if let Some(dup) = duplicate {
            return Err(PipelineError::SchemaUnavailable {
                reason: format!("duplicate column {}", dup),
            });
        }
        Ok(Self { columns })
    }

    /// Every numeric column of the featured table except targets and
    /// anything year-like.
    pub fn from_frame(frame: &DataFrame) -> Result<Self> {
        let excluded = [TOTAL_HOSPITALIZATION, RESPIRATORY_COUNT, ASTHMA_COUNT, HIGH_RISK];
        let columns = frame
            .get_columns()
            .iter()
            .filter(|s| s.dtype().is_numeric())
            .map(|s| s.name().to_string())
            .filter(|name| !excluded.contains(&name.as_str()))
            .filter(|name| !name.to_lowercase().contains("year"))
            .collect();
        Self::new(columns)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Row-major feature matrix of a featured table in schema order. Nulls,
    /// non-finite values and columns the table lacks take the default.
    pub fn matrix(&self, frame: &DataFrame) -> Result<Vec<Vec<f64>>> {
        let mut rows = vec![Vec::with_capacity(self.len()); frame.height()];
        for name in &self.columns {
            match frame.column(name) {
                Ok(series) => {
                    let values = series.cast(&DataType::Float64)?;
                    for (row, value) in rows.iter_mut().zip(values.f64()?.into_iter()) {
                        row.push(value.filter(|v| v.is_finite()).unwrap_or(MISSING_FEATURE_DEFAULT));
                    }
                }
                Err(_) => rows.iter_mut().for_each(|row| row.push(MISSING_FEATURE_DEFAULT)),
            }
        }
        Ok(rows)
    }
}

impl TryFrom<Vec<String>> for SchemaRegistry {
    type Error = PipelineError;

    fn try_from(columns: Vec<String>) -> Result<Self> {
        SchemaRegistry::new(columns)
    }
}

impl From<SchemaRegistry> for Vec<String> {
    fn from(schema: SchemaRegistry) -> Vec<String> {
        schema.columns
    }
}

/// Dense vector whose positions follow a `SchemaRegistry`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: Vec<f64>,
}

impl FeatureVector {
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Back to a name → value mapping.
    pub fn to_map(&self, schema: &SchemaRegistry) -> HashMap<String, f64> {
        schema.columns().iter().cloned().zip(self.values.iter().copied()).collect()
    }
}

/// Builds complete, ordered vectors out of partial mappings.
#[derive(Debug, Clone, Copy)]
pub struct FeatureAligner<'a> {
    schema: Option<&'a SchemaRegistry>,
}

impl<'a> FeatureAligner<'a> {
    pub fn new(schema: &'a SchemaRegistry) -> Self {
        Self { schema: Some(schema) }
    }

    /// Aligner without a registry, as seen before any model is loaded.
    pub fn unavailable() -> Self {
        Self { schema: None }
    }

    /// Supplied value for each registry column, the default otherwise. Keys
    /// the registry does not know are discarded; non-finite values count as
    /// absent.
    pub fn align(&self, partial: &HashMap<String, f64>) -> Result<FeatureVector> {
        let schema = self.schema.ok_or_else(|| PipelineError::SchemaUnavailable {
            reason: "no registry loaded".to_string(),
        })?;
        let values = schema
            .columns()
            .iter()
            .map(|name| {
                partial
                    .get(name)
                    .copied()
                    .filter(|v| v.is_finite())
                    .unwrap_or(MISSING_FEATURE_DEFAULT)
            })
            .collect();
        Ok(FeatureVector { values })
    }
}
