//! GitHub issue triage: predict the area label of an issue from its text

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use ml_fit_core::{DataType, Field, FromRow, Record, Result, Row, RowView, Schema, Value};
use ml_fit_model::{
    evaluate_multiclass, CacheCheckpoint, Concatenate, FeaturizeText, MapKeyToValue, MapValueToKey, MaximumEntropy,
    MulticlassMetrics, Pipeline, PipelineConfig, PredictionEngine, PREDICTED_LABEL,
};
use ml_fit_readers::{CsvDataset, CsvReaderOptions};
use tracing::info;

use super::{save_and_reload, RULE};

/// One issue: `ID<TAB>Area<TAB>Title<TAB>Description`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GitHubIssue {
    /// Issue id
    pub id: String,

    /// Area label, empty when unknown
    pub area: String,

    /// Issue title
    pub title: String,

    /// Issue body
    pub description: String,
}

impl GitHubIssue {
    /// An unlabelled issue
    pub fn new(title: &str, description: &str) -> Self {
        Self {
            title: title.to_string(),
            description: description.to_string(),
            ..Self::default()
        }
    }
}

impl Record for GitHubIssue {
    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("ID", DataType::String),
            Field::new("Area", DataType::String),
            Field::new("Title", DataType::String),
            Field::new("Description", DataType::String),
        ])
    }

    fn to_row(&self) -> Row {
        Row::new(vec![
            Value::from(self.id.as_str()),
            Value::from(self.area.as_str()),
            Value::from(self.title.as_str()),
            Value::from(self.description.as_str()),
        ])
    }
}

/// Predicted area of an issue
#[derive(Debug, Clone, PartialEq)]
pub struct IssuePrediction {
    /// Predicted area label
    pub area: String,
}

impl FromRow for IssuePrediction {
    fn from_row(view: &RowView<'_>) -> Result<Self> {
        Ok(Self {
            area: view.string(PREDICTED_LABEL)?.to_string(),
        })
    }
}

/// Files and inputs of the issue task
#[derive(Debug, Clone)]
pub struct IssuesTask {
    /// Training issues, tab-separated with a header row
    pub train: PathBuf,

    /// Test issues, tab-separated with a header row
    pub test: PathBuf,

    /// Where to save the model
    pub model: PathBuf,

    /// Extra issue to classify with the reloaded model, as `(title, description)`
    pub issue: Option<(String, String)>,
}

/// Outcome of the issue task
#[derive(Debug, Clone)]
pub struct IssuesReport {
    /// Metrics on the test issues
    pub metrics: MulticlassMetrics,

    /// Issues classified with the trained and reloaded models
    pub predictions: Vec<(GitHubIssue, IssuePrediction)>,
}

/// Load an issues file
pub fn load(path: &Path) -> Result<CsvDataset> {
    CsvDataset::load(path, CsvReaderOptions::tsv(true), GitHubIssue::schema())
}

/// Area key and text features of title and description
pub fn process_data() -> Pipeline {
    Pipeline::new()
        .append(MapValueToKey::new("Label", "Area"))
        .append(FeaturizeText::new("TitleFeaturized", "Title"))
        .append(FeaturizeText::new("DescriptionFeaturized", "Description"))
        .append(Concatenate::new("Features", &["TitleFeaturized", "DescriptionFeaturized"]))
        .append(CacheCheckpoint)
}

/// Text features into a maximum entropy classifier, mapped back to area names
pub fn pipeline() -> Pipeline {
    process_data()
        .append_trainer(MaximumEntropy::new("Label", "Features"))
        .append(MapKeyToValue::new(PREDICTED_LABEL, PREDICTED_LABEL))
}

/// Run the whole task
pub fn run(task: &IssuesTask, config: &PipelineConfig) -> anyhow::Result<IssuesReport> {
    let train = load(&task.train).with_context(|| format!("loading {}", task.train.display()))?;
    let model = Arc::new(pipeline().fit(&train, config)?);

    let mut predictions = Vec::new();
    let first = GitHubIssue::new(
        "WebSockets communication is slow in my machine",
        "The WebSockets communication used under the covers by SignalR looks like is going slow in my development machine..",
    );
    let engine = PredictionEngine::<GitHubIssue, IssuePrediction>::new(Arc::clone(&model))?;
    predictions.push((first.clone(), engine.predict(&first)?));

    let test = load(&task.test).with_context(|| format!("loading {}", task.test.display()))?;
    let metrics = evaluate_multiclass(&model, &test, "Label")?;
    info!(micro_accuracy = metrics.micro_accuracy, macro_accuracy = metrics.macro_accuracy, "Evaluated issue model");

    let loaded = save_and_reload(&model, &task.model, config)?;
    let engine = PredictionEngine::<GitHubIssue, IssuePrediction>::new(loaded)?;
    let second = GitHubIssue::new("Entity Framework crashes", "When connecting to the database, EF is crashing");
    predictions.push((second.clone(), engine.predict(&second)?));

    if let Some((title, description)) = &task.issue {
        let issue = GitHubIssue::new(title, description);
        predictions.push((issue.clone(), engine.predict(&issue)?));
    }

    Ok(IssuesReport { metrics, predictions })
}

impl fmt::Display for IssuesReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", RULE)?;
        writeln!(f, "*       Metrics for Multi-class Classification model - Test Data")?;
        writeln!(f, "*       MicroAccuracy:    {:.3}", self.metrics.micro_accuracy)?;
        writeln!(f, "*       MacroAccuracy:    {:.3}", self.metrics.macro_accuracy)?;
        writeln!(f, "*       LogLoss:          {:.3}", self.metrics.log_loss)?;
        writeln!(f, "*       LogLossReduction: {:.3}", self.metrics.log_loss_reduction)?;
        writeln!(f, "{}", RULE)?;
        writeln!(f)?;
        writeln!(f, "=============== Single Predictions ===============")?;
        for (issue, prediction) in &self.predictions {
            writeln!(
                f,
                "Title: {} | Description: {} | Result: {}",
                issue.title, issue.description, prediction.area
            )?;
        }
        Ok(())
    }
}
