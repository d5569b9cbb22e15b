//! The persisted bundle of everything one training run produced.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::model::{ForestClassifier, ForestRegressor};
use crate::predictor::DualPredictor;
use crate::scaler::StandardScaler;
use crate::schema::SchemaRegistry;

pub const ARTIFACT_FILE_NAME: &str = "models.json";

/// Classifier, regressor, scaler and schema of a single training run. Only
/// ever built or loaded whole, and never mutated afterwards.
#[derive(Debug, Serialize)]
pub struct ModelArtifact {
    classifier: ForestClassifier,
    regressor: ForestRegressor,
    scaler: StandardScaler,
    feature_cols: SchemaRegistry,
}

/// On-disk shape; every member optional so a missing one can be named.
#[derive(Deserialize)]
struct StoredArtifact {
    classifier: Option<ForestClassifier>,
    regressor: Option<ForestRegressor>,
    scaler: Option<StandardScaler>,
    feature_cols: Option<Vec<String>>,
}

fn missing(member: &str) -> PipelineError {
    PipelineError::ArtifactCorrupt {
        reason: format!("member {:?} missing", member),
    }
}

impl ModelArtifact {
    pub fn new(
        classifier: ForestClassifier,
        regressor: ForestRegressor,
        scaler: StandardScaler,
        feature_cols: SchemaRegistry,
    ) -> Result<Self> {
        if !scaler.is_fit() {
            return Err(PipelineError::ScalerNotFit);
        }
        if scaler.width() != Some(feature_cols.len()) {
            return Err(PipelineError::ArtifactCorrupt {
                reason: format!(
                    "scaler width {:?} does not match {} feature columns",
                    scaler.width(),
                    feature_cols.len()
                ),
            });
        }
        Ok(Self {
            classifier,
            regressor,
            scaler,
            feature_cols,
        })
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.feature_cols
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    pub fn predictor(&self) -> DualPredictor<'_, ForestClassifier, ForestRegressor> {
        DualPredictor::new(&self.feature_cols, &self.scaler, &self.classifier, &self.regressor)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        info!("models saved to {:?}", path);
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(PipelineError::ModelArtifactNotFound {
                path: path.to_path_buf(),
            });
        }
        let reader = BufReader::new(File::open(path)?);
        let stored: StoredArtifact = serde_json::from_reader(reader).map_err(|e| PipelineError::ArtifactCorrupt {
            reason: e.to_string(),
        })?;

        let classifier = stored.classifier.ok_or_else(|| missing("classifier"))?;
        let regressor = stored.regressor.ok_or_else(|| missing("regressor"))?;
        let scaler = stored.scaler.ok_or_else(|| missing("scaler"))?;
        let feature_cols = SchemaRegistry::new(stored.feature_cols.ok_or_else(|| missing("feature_cols"))?)?;

        let artifact = Self::new(classifier, regressor, scaler, feature_cols)?;
        info!(
            "models loaded from {:?} ({} feature columns)",
            path,
            artifact.feature_cols.len()
        );
        Ok(artifact)
    }
}
