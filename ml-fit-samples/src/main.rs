//! Runner for the sample tasks

use anyhow::Result;
use clap::Parser;
use ml_fit_core::PipelineConfig;
use ml_fit_samples::cli::{Command, SamplesArgs};
use ml_fit_samples::tasks::{iris, issues, movies, sentiment, taxi};
use tracing::info;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("ml_fit=info".parse()?))
        .init();

    let args = SamplesArgs::parse();
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    info!(?config, "Starting sample task");

    match args.command {
        Command::Issues(task) => {
            println!("=============== Issue classification ===============");
            println!("{}", issues::run(&issues::IssuesTask::from(task), &config)?);
        }
        Command::Iris(task) => {
            println!("=============== Iris clustering and classification ===============");
            println!("{}", iris::run(&iris::IrisTask::from(task), &config)?);
        }
        Command::Movies(task) => {
            println!("=============== Movie recommendation ===============");
            println!("{}", movies::run(&movies::MoviesTask::from(task), &config)?);
        }
        Command::Sentiment(task) => {
            println!("=============== Sentiment analysis ===============");
            println!("{}", sentiment::run(&sentiment::SentimentTask::from(task), &config)?);
        }
        Command::Taxi(task) => {
            println!("=============== Taxi fare prediction ===============");
            println!("{}", taxi::run(&taxi::TaxiTask::from(task), &config)?);
        }
    }
    Ok(())
}
