use std::path::PathBuf;
use std::time::Instant;

use admissions_forecast::pipeline::run_pipeline;
use admissions_forecast::serve::run_server;
use admissions_forecast::{ModelArtifact, PipelineConfig, PipelineError, PredictionRequest};
use clap::{Parser, Subcommand};
use env_logger::{Builder, Env};
use log::{debug, info, LevelFilter};
use tokio::io::BufReader;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
pub struct Cli {
    #[clap(short, long, action = clap::ArgAction::Count, help = "Verbose level")]
    verbose: u8,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the training pipeline and save the model artifact
    Train {
        #[clap(short, long, value_parser, help = "JSON config file; defaults are used when omitted")]
        config: Option<PathBuf>,
    },
    /// Predict a single request
    Predict {
        #[clap(short, long, value_parser, help = "Model artifact path")]
        model: PathBuf,
        #[clap(short, long, help = "Request as a JSON object")]
        request: String,
    },
    /// Answer JSON line requests from stdin until it closes
    Serve {
        #[clap(short, long, value_parser, help = "Model artifact path")]
        model: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let env = Env::new().filter("ADMISSIONS_LOG");
    Builder::new()
        .filter(Some("admissions_forecast"), log_level)
        .parse_env(env)
        .init();

    debug!("Arguments {:#?}", cli);

    let start_time = Instant::now();
    match cli.command {
        Command::Train { config } => {
            let config = match config {
                Some(path) => PipelineConfig::from_file(path)?,
                None => PipelineConfig::default(),
            };
            let report = run_pipeline(&config).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Predict { model, request } => {
            let artifact = ModelArtifact::load(model)?;
            let request: PredictionRequest = serde_json::from_str(&request)?;
            let response = artifact.predictor().predict_request(&request)?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Serve { model } => {
            let mut stdout = tokio::io::stdout();
            let answered = run_server(model, BufReader::new(tokio::io::stdin()), &mut stdout).await?;
            info!("{} requests answered", answered);
        }
    }
    info!("finished in {:?}", start_time.elapsed());

    Ok(())
}
