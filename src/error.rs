use std::path::PathBuf;

use polars::prelude::PolarsError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid borough {value:?}")]
    InvalidCategory { value: String },
    #[error("invalid value {value} for field {field:?}")]
    InvalidField { field: String, value: f64 },
    #[error("feature schema unavailable: {reason}")]
    SchemaUnavailable { reason: String },
    #[error("model artifact not found at {path:?}")]
    ModelArtifactNotFound { path: PathBuf },
    #[error("model artifact corrupt: {reason}")]
    ArtifactCorrupt { reason: String },
    #[error("scaler used before fit")]
    ScalerNotFit,
    #[error("width mismatch: expected {expected} columns, got {got}")]
    WidthMismatch { expected: usize, got: usize },
    #[error("invalid configuration: {reason}")]
    Config { reason: String },
    #[error("empty partition {partition:?}")]
    EmptyPartition { partition: String },
    #[error("model failure: {0}")]
    Model(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Polars(#[from] PolarsError),
}

impl From<smartcore::error::Failed> for PipelineError {
    fn from(e: smartcore::error::Failed) -> Self {
        PipelineError::Model(e.to_string())
    }
}

impl PipelineError {
    /// Errors that must stop a service from accepting requests.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::SchemaUnavailable { .. }
                | PipelineError::ModelArtifactNotFound { .. }
                | PipelineError::ArtifactCorrupt { .. }
                | PipelineError::ScalerNotFit
        )
    }
}
