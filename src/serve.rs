//! Line-oriented serving: one JSON request per line in, one JSON result per
//! line out.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use log::{error, info};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;

use crate::artifact::ModelArtifact;
use crate::error::{PipelineError, Result};
use crate::predictor::PredictionRequest;

/// Requests in flight at once while serving.
pub const MAX_PENDING: usize = 64;

/// Result object for one request line. Never fails: a bad line becomes a
/// `success: false` object.
pub fn answer(artifact: &ModelArtifact, line: &str) -> Value {
    let result = serde_json::from_str::<PredictionRequest>(line)
        .map_err(PipelineError::from)
        .and_then(|request| artifact.predictor().predict_request(&request));
    match result {
        Ok(predictions) => json!({ "success": true, "predictions": predictions }),
        Err(e) => json!({ "success": false, "error": format!("Prediction error: {}", e) }),
    }
}

async fn flush_one<W: AsyncWrite + Unpin>(pending: &mut VecDeque<JoinHandle<Value>>, output: &mut W) -> Result<()> {
    if let Some(handle) = pending.pop_front() {
        let value = match handle.await {
            Ok(value) => value,
            Err(e) => json!({ "success": false, "error": e.to_string() }),
        };
        output.write_all(format!("{}\n", value).as_bytes()).await?;
    }
    Ok(())
}

/// Answers every non-blank line of `input` on `output`, in input order.
/// Returns the number of lines answered.
pub async fn serve_lines<R, W>(artifact: Arc<ModelArtifact>, input: R, output: &mut W) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut pending: VecDeque<JoinHandle<Value>> = VecDeque::new();
    let mut answered = 0;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let artifact = Arc::clone(&artifact);
        pending.push_back(tokio::task::spawn_blocking(move || answer(&artifact, &line)));
        answered += 1;
        if pending.len() >= MAX_PENDING {
            flush_one(&mut pending, output).await?;
        }
    }
    while !pending.is_empty() {
        flush_one(&mut pending, output).await?;
    }
    output.flush().await?;
    Ok(answered)
}

/// Loads the artifact, then serves. Nothing is read or written when the
/// artifact cannot be loaded.
pub async fn run_server<P, R, W>(model_path: P, input: R, output: &mut W) -> Result<usize>
where
    P: AsRef<Path>,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let artifact = match ModelArtifact::load(model_path) {
        Ok(artifact) => Arc::new(artifact),
        Err(e) => {
            error!("model loading failed: {}", e);
            return Err(e);
        }
    };
    info!("model loaded, reading requests");
    serve_lines(artifact, input, output).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ForestParams;
    use crate::model::{ForestClassifier, ForestRegressor};
    use crate::scaler::StandardScaler;
    use crate::schema::SchemaRegistry;

    fn tiny_artifact() -> ModelArtifact {
        let x: Vec<Vec<f64>> = (0..24)
            .map(|i| vec![(i % 12 + 1) as f64, (i % 2) as f64, i as f64])
            .collect();
        let labels: Vec<u8> = (0..24).map(|i| u8::from(i > 12)).collect();
        let counts: Vec<f64> = (0..24).map(|i| 10.0 + i as f64).collect();
        let params = ForestParams {
            n_trees: 3,
            max_depth: Some(3),
            ..ForestParams::default()
        };
        let scaler = StandardScaler::fit(&x).unwrap();
        let scaled = scaler.transform(&x).unwrap();
        ModelArtifact::new(
            ForestClassifier::fit(&scaled, &labels, &params).unwrap(),
            ForestRegressor::fit(&scaled, &counts, &params).unwrap(),
            scaler,
            SchemaRegistry::new(vec!["month".into(), "borough_brooklyn".into(), "Temp_Max_C".into()]).unwrap(),
        )
        .unwrap()
    }

    fn results(output: &[u8]) -> Vec<Value> {
        String::from_utf8(output.to_vec())
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn bad_lines_fail_alone_and_order_is_kept() {
        let artifact = Arc::new(tiny_artifact());
        let input: &[u8] = b"{\"month\": 6, \"borough\": \"brooklyn\", \"Temp_Max_C\": 25.0}\n\
            {\"month\": 6, \"borough\": \"Atlantis\"}\n\
            \n\
            not json\n\
            {\"month\": 1, \"Temp_Max_C\": 2.0}\n";
        let mut output = Vec::new();

        let answered = serve_lines(Arc::clone(&artifact), input, &mut output).await.unwrap();
        assert_eq!(answered, 4);

        let results = results(&output);
        let success: Vec<bool> = results.iter().map(|r| r["success"].as_bool().unwrap()).collect();
        assert_eq!(success, vec![true, false, false, true]);
        assert!(results[1]["error"].as_str().unwrap().contains("Atlantis"));
        assert!(results[2]["error"].as_str().unwrap().starts_with("Prediction error"));

        // each answer matches the one computed for its own line, so the
        // writer kept input order
        let first = answer(&artifact, r#"{"month": 6, "borough": "brooklyn", "Temp_Max_C": 25.0}"#);
        let last = answer(&artifact, r#"{"month": 1, "Temp_Max_C": 2.0}"#);
        assert_eq!(results[0], first);
        assert_eq!(results[3], last);
        let probability = results[0]["predictions"]["classification"]["probability"].as_f64().unwrap();
        assert!((0.0..=1.0).contains(&probability));
    }

    #[tokio::test]
    async fn missing_model_fails_before_any_output() {
        let path = std::env::temp_dir()
            .join(format!("admissions-forecast-serve-{}", std::process::id()))
            .join("models.json");
        let input: &[u8] = b"{\"month\": 6}\n";
        let mut output = Vec::new();

        let err = run_server(&path, input, &mut output).await.unwrap_err();
        assert!(matches!(err, PipelineError::ModelArtifactNotFound { .. }));
        assert!(err.is_fatal());
        assert!(output.is_empty());
    }
}
