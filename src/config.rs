use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::borough::Borough;
use crate::error::{PipelineError, Result};

/// Settings for the whole training run. Every section has defaults so that a
/// config file only needs to name what it changes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data: DataConfig,
    pub features: FeatureConfig,
    pub target: TargetConfig,
    pub split: SplitConfig,
    pub preprocessing: PreprocessingConfig,
    pub classification: ForestParams,
    pub regression: ForestParams,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub local_path: PathBuf,
    pub files: DataFiles,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            local_path: PathBuf::from("data"),
            files: DataFiles::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataFiles {
    pub weather: String,
    pub respiratory: String,
    pub asthma: String,
    pub air_quality: String,
}

impl Default for DataFiles {
    fn default() -> Self {
        Self {
            weather: "weather.csv".to_string(),
            respiratory: "respiratory.csv".to_string(),
            asthma: "asthma.csv".to_string(),
            air_quality: "air_quality.csv".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub lag_days: Vec<usize>,
    pub lag_columns: Vec<String>,
    pub rolling_window: usize,
    pub rolling_shift: usize,
    pub rolling_columns: Vec<String>,
    /// Drop rows whose target lags are still undefined (not enough history).
    pub drop_incomplete_history: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            lag_days: vec![7],
            lag_columns: vec![
                "Total_Hospitalization".to_string(),
                "Temp_Max_C".to_string(),
                "Humidity_Avg".to_string(),
            ],
            rolling_window: 7,
            rolling_shift: 1,
            rolling_columns: vec![
                "Total_Hospitalization".to_string(),
                "Temp_Max_C".to_string(),
            ],
            drop_incomplete_history: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub threshold_percentile: f64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            threshold_percentile: 75.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub train_years: Vec<i32>,
    pub val_year: i32,
    pub test_year: i32,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            train_years: vec![2017, 2018, 2019, 2020, 2021],
            val_year: 2022,
            test_year: 2023,
        }
    }
}

impl SplitConfig {
    /// Every year that takes part in training, validation or test.
    pub fn all_years(&self) -> Vec<i32> {
        let mut years = self.train_years.clone();
        years.push(self.val_year);
        years.push(self.test_year);
        years
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingConfig {
    pub valid_boroughs: Vec<String>,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            valid_boroughs: Borough::ALL.iter().map(|b| b.as_str().to_string()).collect(),
        }
    }
}

/// Random forest hyperparameters shared by both models.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: Option<u16>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: Some(5),
            min_samples_split: 2,
            min_samples_leaf: 1,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub model_dir: PathBuf,
    pub layer_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            layer_dir: PathBuf::from("data/output"),
        }
    }
}

impl PipelineConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let config: PipelineConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let split = &self.split;
        if split.train_years.is_empty() {
            return Err(config_error("split.train_years is empty"));
        }
        if split.val_year == split.test_year {
            return Err(config_error("split.val_year equals split.test_year"));
        }
        if split.train_years.contains(&split.val_year) || split.train_years.contains(&split.test_year) {
            return Err(config_error("split years overlap"));
        }
        let pct = self.target.threshold_percentile;
        if !(0.0..=100.0).contains(&pct) {
            return Err(config_error("target.threshold_percentile outside 0..=100"));
        }
        if self.features.lag_days.iter().any(|&k| k == 0) {
            return Err(config_error("features.lag_days must be positive"));
        }
        if self.features.rolling_window == 0 {
            return Err(config_error("features.rolling_window must be positive"));
        }
        // a zero shift would average in the same-day target
        if self.features.rolling_shift == 0 {
            return Err(config_error("features.rolling_shift must be positive"));
        }
        let mut seen = HashSet::new();
        for name in &self.preprocessing.valid_boroughs {
            let borough = Borough::parse(name)?;
            if !seen.insert(borough) {
                return Err(config_error("preprocessing.valid_boroughs has duplicates"));
            }
        }
        Ok(())
    }

    /// Boroughs kept by the merge step.
    pub fn valid_boroughs(&self) -> Result<Vec<Borough>> {
        self.preprocessing
            .valid_boroughs
            .iter()
            .map(|name| Borough::parse(name))
            .collect()
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.output.model_dir.join(crate::artifact::ARTIFACT_FILE_NAME)
    }
}

fn config_error(reason: &str) -> PipelineError {
    PipelineError::Config {
        reason: reason.to_string(),
    }
}
