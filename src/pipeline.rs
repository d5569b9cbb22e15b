//! Training run: raw tables in, one model artifact out.

use std::time::Instant;

use log::{debug, info};
use serde::Serialize;
use sysinfo::{ProcessExt, System, SystemExt};

use crate::artifact::ModelArtifact;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::features::FeatureEngineer;
use crate::metrics::{ClassificationMetrics, RegressionMetrics};
use crate::model::{Classifier, ForestClassifier, ForestRegressor, Regressor};
use crate::preprocess::preprocess;
use crate::records::RawTables;
use crate::split::{prepare_splits, Partition};
use crate::storage::{read_parquet, write_layer, GOLD_LAYER, SILVER_LAYER};

fn resident_memory() -> Option<u64> {
    let pid = sysinfo::get_current_pid().ok()?;
    let mut system = System::new();
    system.refresh_process(pid);
    system.process(pid).map(|p| p.memory())
}

/// Wall time and resident memory of one stage, logged at debug level.
struct StageMonitor {
    stage: &'static str,
    start: Instant,
    start_memory: Option<u64>,
}

impl StageMonitor {
    fn start(stage: &'static str) -> Self {
        Self {
            stage,
            start: Instant::now(),
            start_memory: resident_memory(),
        }
    }

    fn finish(self) {
        let end_memory = resident_memory();
        debug!(
            "{} took {:?}, resident memory {:?} -> {:?} bytes",
            self.stage,
            self.start.elapsed(),
            self.start_memory,
            end_memory
        );
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PartitionReport {
    pub rows: usize,
    pub classification: ClassificationMetrics,
    pub regression: RegressionMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub train_rows: usize,
    pub feature_count: usize,
    pub threshold: f64,
    pub validation: Option<PartitionReport>,
    pub test: Option<PartitionReport>,
}

fn evaluate<C: Classifier, R: Regressor>(
    name: &str,
    partition: &Partition,
    classifier: &C,
    regressor: &R,
) -> Result<Option<PartitionReport>> {
    if partition.is_empty() {
        return Ok(None);
    }
    let proba: Vec<f64> = classifier.predict_proba(&partition.x)?.iter().map(|p| p[1]).collect();
    let labels = classifier.predict(&partition.x)?;
    let counts = regressor.predict(&partition.x)?;

    let classification = ClassificationMetrics::compute(&partition.y_class, &labels, &proba);
    let regression = RegressionMetrics::compute(&partition.y_reg, &counts);
    info!(
        "{}: accuracy {:.4}, auroc {:?}, recall {:?}, precision {:?}",
        name, classification.accuracy, classification.auroc, classification.recall, classification.precision
    );
    info!(
        "{}: r2 {:.4}, mae {:.2}, rmse {:.2}",
        name, regression.r2, regression.mae, regression.rmse
    );
    Ok(Some(PartitionReport {
        rows: partition.len(),
        classification,
        regression,
    }))
}

/// Preprocess, engineer features, split, fit and evaluate. Intermediate
/// layers are written under `config.output.layer_dir`.
pub async fn train_from_tables(raw: &RawTables, config: &PipelineConfig) -> Result<(ModelArtifact, TrainingReport)> {
    config.validate()?;
    let layer_dir = &config.output.layer_dir;

    let monitor = StageMonitor::start("preprocessing");
    let merged = preprocess(raw, config)?;
    let silver_path = write_layer(layer_dir, SILVER_LAYER, &merged).await?;
    monitor.finish();

    let monitor = StageMonitor::start("feature engineering");
    let silver = read_parquet(&silver_path).await?;
    let featured = FeatureEngineer::with_config(config.features.clone()).build(&silver)?;
    let prepared = prepare_splits(&featured, &config.split, &config.target)?;
    write_layer(layer_dir, GOLD_LAYER, &prepared.labelled).await?;
    monitor.finish();

    let monitor = StageMonitor::start("training");
    let train = &prepared.train;
    let classifier = ForestClassifier::fit(&train.x, &train.y_class, &config.classification)?;
    let regressor = ForestRegressor::fit(&train.x, &train.y_reg, &config.regression)?;
    monitor.finish();

    let report = TrainingReport {
        train_rows: train.len(),
        feature_count: prepared.schema.len(),
        threshold: prepared.threshold,
        validation: evaluate("validation", &prepared.val, &classifier, &regressor)?,
        test: evaluate("test", &prepared.test, &classifier, &regressor)?,
    };

    let artifact = ModelArtifact::new(classifier, regressor, prepared.scaler, prepared.schema)?;
    Ok((artifact, report))
}

/// Reads the raw tables named by the config, trains and saves the artifact.
pub async fn run_pipeline(config: &PipelineConfig) -> Result<TrainingReport> {
    info!("loading raw tables from {:?}", config.data.local_path);
    let raw = RawTables::read(&config.data.local_path, &config.data.files)?;
    info!(
        "weather {} rows, respiratory {} rows, asthma {} rows, air quality {} rows",
        raw.weather.len(),
        raw.respiratory.len(),
        raw.asthma.len(),
        raw.air_quality.len()
    );

    let (artifact, report) = train_from_tables(&raw, config).await?;
    artifact.save(config.artifact_path())?;
    info!("pipeline complete");
    Ok(report)
}
