use std::fs;
use std::path::{Path, PathBuf};

use admissions_forecast::artifact::ARTIFACT_FILE_NAME;
use admissions_forecast::config::{ForestParams, PipelineConfig};
use admissions_forecast::pipeline::train_from_tables;
use admissions_forecast::records::{AdmissionRecord, AirQualityRecord, RawTables, WeatherRecord};
use admissions_forecast::{ModelArtifact, PipelineError, PredictionRequest};
use chrono::{Datelike, Duration, NaiveDate};

const BOROUGHS: [&str; 3] = ["Bronx", "Brooklyn", "Staten Island"];

fn scratch_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("admissions-forecast-{}-{}", name, std::process::id()))
}

/// Daily rows for 2020 to 2023 where admissions rise with temperature.
fn synthetic_tables() -> RawTables {
    let mut raw = RawTables::default();
    let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    let end = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();

    let mut date = start;
    while date <= end {
        let iso = date.format("%Y-%m-%d").to_string();
        let phase = date.ordinal() as f64 / 365.0 * std::f64::consts::TAU;
        let temp = 15.0 - 12.0 * phase.cos();
        for (b, borough) in BOROUGHS.iter().enumerate() {
            let respiratory = 20.0 + 1.5 * temp + 5.0 * b as f64 + (date.day() % 4) as f64;
            let asthma = 5.0 + (date.weekday().num_days_from_monday() % 3) as f64;

            raw.weather.push(WeatherRecord {
                date: Some(iso.clone()),
                borough: Some(borough.to_string()),
                tmax: Some(format!("{:.1}", temp + 4.0)),
                tmin: Some(format!("{:.1}", temp - 4.0)),
                prcp: Some(if date.day() % 5 == 0 { "3.2".to_string() } else { "0".to_string() }),
                rhav: Some(format!("{:.0}", 60.0 + 10.0 * phase.sin())),
                ..Default::default()
            });
            raw.respiratory.push(AdmissionRecord {
                date: Some(iso.clone()),
                borough: Some(borough.to_string()),
                count: Some(format!("{:.0}", respiratory)),
            });
            raw.asthma.push(AdmissionRecord {
                date: Some(iso.clone()),
                borough: Some(borough.to_string()),
                count: Some(format!("{:.0}", asthma)),
            });
            if date.day() == 1 {
                raw.air_quality.push(AirQualityRecord {
                    date: Some(iso.clone()),
                    borough: Some(borough.to_string()),
                    name: Some("Fine particles (PM 2.5)".to_string()),
                    value: Some(format!("{:.1}", 8.0 + b as f64)),
                });
            }
        }
        date += Duration::days(1);
    }
    raw
}

fn small_forest() -> ForestParams {
    ForestParams {
        n_trees: 10,
        max_depth: Some(4),
        ..Default::default()
    }
}

fn config(root: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.split.train_years = vec![2020, 2021];
    config.split.val_year = 2022;
    config.split.test_year = 2023;
    config.classification = small_forest();
    config.regression = small_forest();
    config.output.layer_dir = root.join("layers");
    config.output.model_dir = root.join("models");
    config
}

fn reference_request() -> PredictionRequest {
    serde_json::from_str(
        r#"{"month": 6, "day": 15, "day_of_week": 5, "quarter": 2, "season": 3,
            "borough": "brooklyn", "Temp_Max_C": 25.0, "Humidity_Avg": 70.0}"#,
    )
    .unwrap()
}

#[tokio::test]
async fn trains_saves_loads_and_serves() {
    let root = scratch_dir("e2e");
    let config = config(&root);

    let (artifact, report) = train_from_tables(&synthetic_tables(), &config).await.unwrap();
    assert!(report.train_rows > 0);
    assert!(report.validation.is_some());
    assert!(report.test.is_some());
    assert_eq!(report.feature_count, artifact.schema().len());

    let columns = artifact.schema().columns();
    for borough in ["borough_bronx", "borough_brooklyn", "borough_manhattan", "borough_queens", "borough_staten_island"] {
        assert!(columns.iter().any(|c| c == borough), "{} missing", borough);
    }
    assert!(columns.iter().any(|c| c == "Total_Hospitalization_lag7"));
    assert!(!columns.iter().any(|c| c == "Total_Hospitalization" || c == "High_Risk"));

    assert!(root.join("layers/silver/admissions.parquet").is_file());
    assert!(root.join("layers/gold/admissions.csv").is_file());

    let path = config.artifact_path();
    assert!(path.ends_with(ARTIFACT_FILE_NAME));
    artifact.save(&path).unwrap();
    let loaded = ModelArtifact::load(&path).unwrap();
    assert_eq!(loaded.schema(), artifact.schema());

    let request = reference_request();
    let response = loaded.predictor().predict_request(&request).unwrap();
    let probability = response.classification.probability;
    assert!((0.0..=1.0).contains(&probability));
    assert!((response.classification.probabilities.normal + probability - 1.0).abs() < 1e-9);
    assert_eq!(response.classification.is_high_risk, probability >= 0.5);
    assert!(response.regression.predicted_admissions.is_finite());

    let before = artifact.predictor().predict_request(&request).unwrap();
    assert_eq!(before, response);

    let concurrent: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| s.spawn(|| loaded.predictor().predict_request(&request).unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert!(concurrent.iter().all(|r| *r == response));

    let mut bad = reference_request();
    bad.borough = Some("Atlantis".to_string());
    assert!(matches!(
        loaded.predictor().predict_request(&bad),
        Err(PipelineError::InvalidCategory { .. })
    ));

    fs::remove_dir_all(root).ok();
}

#[test]
fn missing_artifact_is_fatal() {
    let err = ModelArtifact::load(scratch_dir("absent").join(ARTIFACT_FILE_NAME)).unwrap_err();
    assert!(matches!(err, PipelineError::ModelArtifactNotFound { .. }));
    assert!(err.is_fatal());
}

#[test]
fn unknown_text_field_rejects_the_request() {
    let parsed = serde_json::from_str::<PredictionRequest>(r#"{"month": 6, "note": "hello"}"#);
    assert!(parsed.is_err());
}
