//! Command line arguments for the samples binary

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::tasks::iris::IrisTask;
use crate::tasks::issues::IssuesTask;
use crate::tasks::movies::{MoviesTask, RecommendPolicy};
use crate::tasks::sentiment::SentimentTask;
use crate::tasks::taxi::TaxiTask;

/// Fit, evaluate, save, reload and score the sample models
#[derive(Parser, Debug, Clone)]
#[command(name = "ml-fit-samples")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct SamplesArgs {
    /// JSON pipeline configuration; missing keys take their defaults
    #[arg(short, long, value_name = "CONFIG_FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Override the configured seed
    #[arg(long, global = true)]
    pub seed: Option<u64>,

    /// Task to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available tasks
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Classify GitHub issues into areas
    Issues(IssuesArgs),

    /// Cluster and classify iris flowers
    Iris(IrisArgs),

    /// Predict movie ratings and recommend
    Movies(MoviesArgs),

    /// Classify review sentiment
    Sentiment(SentimentArgs),

    /// Predict taxi fares
    Taxi(TaxiArgs),
}

/// Arguments for the issue task
#[derive(Args, Debug, Clone)]
pub struct IssuesArgs {
    /// Training issues
    #[arg(long, default_value = "Data/issues_train.tsv")]
    pub train: PathBuf,

    /// Test issues
    #[arg(long, default_value = "Data/issues_test.tsv")]
    pub test: PathBuf,

    /// Model artifact path
    #[arg(long, default_value = "Models/issues.bin")]
    pub model: PathBuf,

    /// Title of an extra issue to classify
    #[arg(long, requires = "description")]
    pub title: Option<String>,

    /// Description of an extra issue to classify
    #[arg(long, requires = "title")]
    pub description: Option<String>,
}

impl From<IssuesArgs> for IssuesTask {
    fn from(args: IssuesArgs) -> Self {
        Self {
            train: args.train,
            test: args.test,
            model: args.model,
            issue: args.title.zip(args.description),
        }
    }
}

/// Arguments for the iris task
#[derive(Args, Debug, Clone)]
pub struct IrisArgs {
    /// Measurements file
    #[arg(long, default_value = "Data/iris.data")]
    pub data: PathBuf,

    /// Clustering model artifact path
    #[arg(long, default_value = "Data/IrisClusteringModel.bin")]
    pub clustering_model: PathBuf,

    /// Multiclass model artifact path
    #[arg(long, default_value = "Data/IrisMulticlassModel.bin")]
    pub multiclass_model: PathBuf,

    /// Fraction of rows held out for evaluation
    #[arg(long, default_value_t = 0.1)]
    pub test_fraction: f64,
}

impl From<IrisArgs> for IrisTask {
    fn from(args: IrisArgs) -> Self {
        Self {
            data: args.data,
            clustering_model: args.clustering_model,
            multiclass_model: args.multiclass_model,
            test_fraction: args.test_fraction,
        }
    }
}

/// Arguments for the movie task
#[derive(Args, Debug, Clone)]
pub struct MoviesArgs {
    /// Training ratings
    #[arg(long, default_value = "Data/recommendation-ratings-train.csv")]
    pub train: PathBuf,

    /// Test ratings
    #[arg(long, default_value = "Data/recommendation-ratings-test.csv")]
    pub test: PathBuf,

    /// Model artifact path
    #[arg(long, default_value = "Data/MovieRecommenderModel.bin")]
    pub model: PathBuf,

    /// User to recommend for
    #[arg(long, default_value_t = 6.0)]
    pub user_id: f32,

    /// Movie to score
    #[arg(long, default_value_t = 10.0)]
    pub movie_id: f32,

    /// Rounded ratings above this are recommended
    #[arg(long, default_value_t = 3.5)]
    pub threshold: f32,
}

impl From<MoviesArgs> for MoviesTask {
    fn from(args: MoviesArgs) -> Self {
        Self {
            train: args.train,
            test: args.test,
            model: args.model,
            user_id: args.user_id,
            movie_id: args.movie_id,
            policy: RecommendPolicy {
                threshold: args.threshold,
            },
        }
    }
}

/// Arguments for the sentiment task
#[derive(Args, Debug, Clone)]
pub struct SentimentArgs {
    /// Labelled reviews
    #[arg(long, default_value = "Data/yelp_labelled.txt")]
    pub data: PathBuf,

    /// Model artifact path
    #[arg(long, default_value = "Models/sentiment.bin")]
    pub model: PathBuf,

    /// Comment to classify
    #[arg(long, default_value = "This was a very bad steak")]
    pub comment: String,

    /// Fraction of rows held out for evaluation
    #[arg(long, default_value_t = 0.2)]
    pub test_fraction: f64,
}

impl From<SentimentArgs> for SentimentTask {
    fn from(args: SentimentArgs) -> Self {
        Self {
            data: args.data,
            model: args.model,
            comment: args.comment,
            test_fraction: args.test_fraction,
        }
    }
}

/// Arguments for the taxi task
#[derive(Args, Debug, Clone)]
pub struct TaxiArgs {
    /// Training trips
    #[arg(long, default_value = "Data/taxi-fare-train.csv")]
    pub train: PathBuf,

    /// Test trips
    #[arg(long, default_value = "Data/taxi-fare-test.csv")]
    pub test: PathBuf,

    /// Model artifact path
    #[arg(long, default_value = "Models/taxi.bin")]
    pub model: PathBuf,
}

impl From<TaxiArgs> for TaxiTask {
    fn from(args: TaxiArgs) -> Self {
        Self {
            train: args.train,
            test: args.test,
            model: args.model,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_movies_with_overrides() {
        let args = SamplesArgs::parse_from(["ml-fit-samples", "--seed", "3", "movies", "--threshold", "4"]);
        assert_eq!(args.seed, Some(3));
        match args.command {
            Command::Movies(movies) => {
                let task = MoviesTask::from(movies);
                assert_eq!(task.policy.threshold, 4.0);
                assert_eq!(task.user_id, 6.0);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_issue_title_requires_description() {
        let result = SamplesArgs::try_parse_from(["ml-fit-samples", "issues", "--title", "crash"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_verify_cli() {
        use clap::CommandFactory;
        SamplesArgs::command().debug_assert();
    }
}
