//! Movie rating prediction with matrix factorization

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use ml_fit_core::{DataType, Field, FromRow, Record, Result, Row, RowView, Schema, Value};
use ml_fit_model::{
    evaluate_regression, MapValueToKey, MatrixFactorization, Pipeline, PipelineConfig, PredictionEngine,
    RegressionMetrics, SCORE,
};
use ml_fit_readers::{CsvDataset, CsvReaderOptions};
use tracing::info;

use super::save_and_reload;

/// One rating: `userId,movieId,rating,timestamp`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovieRating {
    /// Rating user
    pub user_id: f32,

    /// Rated movie
    pub movie_id: f32,

    /// Rating, loaded as the label
    pub label: f32,
}

impl Record for MovieRating {
    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("userId", DataType::Float),
            Field::new("movieId", DataType::Float),
            Field::new("Label", DataType::Float),
        ])
    }

    fn to_row(&self) -> Row {
        Row::new(vec![
            Value::Float(self.user_id),
            Value::Float(self.movie_id),
            Value::Float(self.label),
        ])
    }
}

/// Predicted rating
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovieRatingPrediction {
    /// Predicted rating
    pub score: f32,
}

impl FromRow for MovieRatingPrediction {
    fn from_row(view: &RowView<'_>) -> Result<Self> {
        Ok(Self {
            score: view.float(SCORE)?,
        })
    }
}

/// Decides whether a predicted rating is worth recommending.
///
/// The score is rounded to one decimal before comparing, so a prediction of
/// 3.54 is not recommended with the default threshold and 3.56 is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecommendPolicy {
    /// Rounded scores strictly above this are recommended
    pub threshold: f32,
}

impl Default for RecommendPolicy {
    fn default() -> Self {
        Self { threshold: 3.5 }
    }
}

impl RecommendPolicy {
    /// Check a predicted rating
    pub fn recommends(&self, score: f32) -> bool {
        (score * 10.0).round() / 10.0 > self.threshold
    }
}

/// Files and inputs of the movie task
#[derive(Debug, Clone)]
pub struct MoviesTask {
    /// Training ratings with a header row
    pub train: PathBuf,

    /// Test ratings with a header row
    pub test: PathBuf,

    /// Where to save the model
    pub model: PathBuf,

    /// User to recommend for
    pub user_id: f32,

    /// Movie to score
    pub movie_id: f32,

    /// Recommendation threshold
    pub policy: RecommendPolicy,
}

/// Outcome of the movie task
#[derive(Debug, Clone)]
pub struct MoviesReport {
    /// Metrics on the test ratings
    pub metrics: RegressionMetrics,

    /// The scored pair
    pub input: MovieRating,

    /// Prediction for the pair
    pub prediction: MovieRatingPrediction,

    /// Whether the policy recommends the movie
    pub recommended: bool,
}

/// Load a ratings file; the timestamp column is skipped
pub fn load(path: &Path) -> Result<CsvDataset> {
    let options = CsvReaderOptions {
        columns: Some(vec![0, 1, 2]),
        ..CsvReaderOptions::default()
    };
    CsvDataset::load(path, options, MovieRating::schema())
}

/// Encoded ids into a factorization of the rating matrix
pub fn pipeline() -> Pipeline {
    Pipeline::new()
        .append(MapValueToKey::new("userIdEncoded", "userId"))
        .append(MapValueToKey::new("movieIdEncoded", "movieId"))
        .append_trainer(
            MatrixFactorization::new("movieIdEncoded", "userIdEncoded", "Label")
                .with_iterations(20)
                .with_rank(100),
        )
}

/// Run the whole task
pub fn run(task: &MoviesTask, config: &PipelineConfig) -> anyhow::Result<MoviesReport> {
    let train = load(&task.train).with_context(|| format!("loading {}", task.train.display()))?;
    let test = load(&task.test).with_context(|| format!("loading {}", task.test.display()))?;

    let model = pipeline().fit(&train, config)?;
    let metrics = evaluate_regression(&model, &test, "Label")?;
    info!(rmse = metrics.root_mean_squared_error, r_squared = metrics.r_squared, "Evaluated movie model");

    let model = save_and_reload(&model, &task.model, config)?;
    let engine = PredictionEngine::<MovieRating, MovieRatingPrediction>::new(Arc::clone(&model))?;
    let input = MovieRating {
        user_id: task.user_id,
        movie_id: task.movie_id,
        label: 0.0,
    };
    let prediction = engine.predict(&input)?;

    Ok(MoviesReport {
        metrics,
        input,
        prediction,
        recommended: task.policy.recommends(prediction.score),
    })
}

impl fmt::Display for MoviesReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Root Mean Squared Error : {}", self.metrics.root_mean_squared_error)?;
        writeln!(f, "RSquared: {}", self.metrics.r_squared)?;
        writeln!(f)?;
        writeln!(f, "=============== Making a prediction ===============")?;
        writeln!(f, "Predicted rating: {}", self.prediction.score)?;
        writeln!(
            f,
            "Movie {} is {}recommended for user {}",
            self.input.movie_id,
            if self.recommended { "" } else { "not " },
            self.input.user_id
        )
    }
}
