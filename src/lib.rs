//! Daily hospital-admission risk and volume forecasting for NYC boroughs.
//!
//! Training turns weather, air quality and admission tables into a fixed,
//! ordered feature table and fits a classifier and a regressor on it. Serving
//! rebuilds the same feature vector from a single partial request, so both
//! paths always feed the model identically shaped input.
//!
//! # Modules
//!
//! - [`records`], [`preprocess`], [`storage`] - raw tables, cleaning, merge, imputation and layers
//! - [`temporal`], [`borough`], [`features`] - feature derivation
//! - [`schema`], [`scaler`] - the frozen feature space shared by training and serving
//! - [`split`], [`model`], [`metrics`], [`pipeline`] - training orchestration
//! - [`artifact`], [`predictor`], [`serve`] - persisted models and the serving path

pub mod artifact;
pub mod borough;
pub mod config;
pub mod error;
pub mod features;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod predictor;
pub mod preprocess;
pub mod records;
pub mod scaler;
pub mod schema;
pub mod serve;
pub mod split;
pub mod storage;
pub mod temporal;

pub use artifact::ModelArtifact;
pub use borough::Borough;
pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use predictor::{DualPredictor, PredictionRequest, PredictionResponse};
pub use schema::{FeatureAligner, FeatureVector, SchemaRegistry};
