//! Binary sentiment classification of restaurant reviews

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use ml_fit_core::{DataType, Field, FromRow, Record, Result, Row, RowView, Schema, Value};
use ml_fit_model::{
    evaluate_binary, train_test_split, BinaryMetrics, FeaturizeText, LogisticRegression, Pipeline, PipelineConfig,
    PredictionEngine, PREDICTED_LABEL, PROBABILITY, SCORE,
};
use ml_fit_readers::{CsvDataset, CsvReaderOptions};
use tracing::info;

use super::save_and_reload;

/// One labelled review: `text<TAB>0|1`
#[derive(Debug, Clone, Default)]
pub struct SentimentData {
    /// Review text
    pub sentiment_text: String,

    /// Whether the review is positive
    pub sentiment: bool,
}

impl SentimentData {
    /// An unlabelled review
    pub fn new(text: &str) -> Self {
        Self {
            sentiment_text: text.to_string(),
            sentiment: false,
        }
    }
}

impl Record for SentimentData {
    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("SentimentText", DataType::String),
            Field::new("Label", DataType::Bool),
        ])
    }

    fn to_row(&self) -> Row {
        Row::new(vec![Value::from(self.sentiment_text.as_str()), Value::Bool(self.sentiment)])
    }
}

/// Prediction for one review
#[derive(Debug, Clone, PartialEq)]
pub struct SentimentPrediction {
    /// The scored text
    pub sentiment_text: String,

    /// Predicted positive
    pub prediction: bool,

    /// Probability of the positive class
    pub probability: f32,

    /// Raw margin
    pub score: f32,
}

impl FromRow for SentimentPrediction {
    fn from_row(view: &RowView<'_>) -> Result<Self> {
        Ok(Self {
            sentiment_text: view.string("SentimentText")?.to_string(),
            prediction: view.bool(PREDICTED_LABEL)?,
            probability: view.float(PROBABILITY)?,
            score: view.float(SCORE)?,
        })
    }
}

impl fmt::Display for SentimentPrediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Sentiment: {} | Prediction: {} | Probability: {}",
            self.sentiment_text,
            if self.prediction { "Positive" } else { "Negative" },
            self.probability
        )
    }
}

/// Files and inputs of the sentiment task
#[derive(Debug, Clone)]
pub struct SentimentTask {
    /// Tab-separated reviews without a header
    pub data: PathBuf,

    /// Where to save the model
    pub model: PathBuf,

    /// Review scored on its own after training
    pub comment: String,

    /// Fraction of rows held out for evaluation
    pub test_fraction: f64,
}

/// Outcome of the sentiment task
#[derive(Debug, Clone)]
pub struct SentimentReport {
    /// Metrics on the held-out rows
    pub metrics: BinaryMetrics,

    /// Prediction for the single comment
    pub single: SentimentPrediction,

    /// Predictions for the batch of sample comments
    pub batch: Vec<SentimentPrediction>,
}

/// Comments scored as a batch after reloading the model
pub const BATCH_COMMENTS: [&str; 2] = ["This was a horrible meal", "I love this spaghetti."];

/// Load the review file
pub fn load(path: &Path) -> Result<CsvDataset> {
    CsvDataset::load(path, CsvReaderOptions::tsv(false), SentimentData::schema())
}

/// Text features followed by logistic regression
pub fn pipeline() -> Pipeline {
    Pipeline::new()
        .append(FeaturizeText::new("Features", "SentimentText"))
        .append_trainer(LogisticRegression::new("Label", "Features"))
}

/// Run the whole task
pub fn run(task: &SentimentTask, config: &PipelineConfig) -> anyhow::Result<SentimentReport> {
    let data = load(&task.data).with_context(|| format!("loading {}", task.data.display()))?;
    let split = train_test_split(&data, task.test_fraction, config.seed)?;

    let model = pipeline().fit(&split.train, config)?;
    let metrics = evaluate_binary(&model, &split.test, "Label")?;
    info!(accuracy = metrics.accuracy, auc = metrics.area_under_roc_curve, "Evaluated sentiment model");

    let model = save_and_reload(&model, &task.model, config)?;
    let engine = PredictionEngine::<SentimentData, SentimentPrediction>::new(Arc::clone(&model))?;
    let single = engine.predict(&SentimentData::new(&task.comment))?;

    let comments: Vec<SentimentData> = BATCH_COMMENTS.iter().map(|text| SentimentData::new(text)).collect();
    let batch = engine.predict_batch(&comments)?;

    Ok(SentimentReport { metrics, single, batch })
}

impl fmt::Display for SentimentReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Model quality metrics evaluation")?;
        writeln!(f, "--------------------------------")?;
        writeln!(f, "Accuracy: {:.2}%", self.metrics.accuracy * 100.0)?;
        writeln!(f, "Auc: {:.2}%", self.metrics.area_under_roc_curve * 100.0)?;
        writeln!(f, "F1Score: {:.2}%", self.metrics.f1_score * 100.0)?;
        writeln!(f)?;
        writeln!(f, "=============== Single prediction ===============")?;
        writeln!(f, "{}", self.single)?;
        writeln!(f)?;
        writeln!(f, "=============== Batch predictions ===============")?;
        for prediction in &self.batch {
            writeln!(f, "{}", prediction)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_reviews(dir: &std::path::Path) -> PathBuf {
        let path = dir.join("yelp_labelled.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        let positive = ["great food", "lovely place", "I love this pasta", "friendly staff and great service"];
        let negative = ["horrible meal", "terrible service", "rude staff", "cold and bland food"];
        for i in 0..10 {
            writeln!(file, "{}\t1", positive[i % positive.len()]).unwrap();
            writeln!(file, "{}\t0", negative[i % negative.len()]).unwrap();
        }
        path
    }

    #[test]
    fn test_run_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let task = SentimentTask {
            data: write_reviews(dir.path()),
            model: dir.path().join("sentiment.bin"),
            comment: "great food".to_string(),
            test_fraction: 0.2,
        };
        let config = PipelineConfig {
            worker_threads: 2,
            ..PipelineConfig::with_seed(0)
        };

        let report = run(&task, &config).unwrap();
        assert!(task.model.exists());
        assert!(report.single.prediction);
        assert_eq!(report.batch.len(), 2);
        assert_eq!(report.batch[0].sentiment_text, BATCH_COMMENTS[0]);
        assert!(report.metrics.accuracy > 0.5);
        assert!(report.to_string().contains("Prediction: Positive"));
    }

    #[test]
    fn test_missing_data_file() {
        let dir = tempfile::tempdir().unwrap();
        let task = SentimentTask {
            data: dir.path().join("absent.txt"),
            model: dir.path().join("sentiment.bin"),
            comment: String::new(),
            test_fraction: 0.2,
        };
        let err = run(&task, &PipelineConfig::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ml_fit_core::Error>(),
            Some(ml_fit_core::Error::NotFound { .. })
        ));
    }
}
