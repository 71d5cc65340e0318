//! Iris flowers: clustering and multiclass classification on one split

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use ml_fit_core::{DataType, Dataset, Field, FromRow, Record, Result, Row, RowView, Schema, Value};
use ml_fit_model::{
    evaluate_clustering, evaluate_multiclass, train_test_split, CacheCheckpoint, ClusteringMetrics, Concatenate,
    KMeans, MapKeyToValue, MapValueToKey, MaximumEntropy, Model, MulticlassMetrics, Pipeline, PipelineConfig,
    PredictionEngine, PREDICTED_LABEL, SCORE,
};
use ml_fit_readers::{CsvDataset, CsvReaderOptions};
use tracing::info;

use super::{save_and_reload, RULE};

/// One flower: four measurements and its species
#[derive(Debug, Clone, PartialEq)]
pub struct IrisData {
    /// Sepal length in cm
    pub sepal_length: f32,

    /// Sepal width in cm
    pub sepal_width: f32,

    /// Petal length in cm
    pub petal_length: f32,

    /// Petal width in cm
    pub petal_width: f32,

    /// Species, empty when unknown
    pub flower_type: String,
}

impl IrisData {
    /// A typical Iris setosa of unknown species
    pub fn setosa() -> Self {
        Self {
            sepal_length: 5.1,
            sepal_width: 3.5,
            petal_length: 1.4,
            petal_width: 0.2,
            flower_type: String::new(),
        }
    }
}

impl Record for IrisData {
    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("SepalLength", DataType::Float),
            Field::new("SepalWidth", DataType::Float),
            Field::new("PetalLength", DataType::Float),
            Field::new("PetalWidth", DataType::Float),
            Field::new("FlowerType", DataType::String),
        ])
    }

    fn to_row(&self) -> Row {
        Row::new(vec![
            Value::Float(self.sepal_length),
            Value::Float(self.sepal_width),
            Value::Float(self.petal_length),
            Value::Float(self.petal_width),
            Value::from(self.flower_type.as_str()),
        ])
    }
}

/// Cluster assignment for one flower
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterPrediction {
    /// One-based cluster id
    pub predicted_cluster_id: u32,

    /// Squared distance to every centroid
    pub distances: Vec<f32>,
}

impl FromRow for ClusterPrediction {
    fn from_row(view: &RowView<'_>) -> Result<Self> {
        Ok(Self {
            predicted_cluster_id: view.key(PREDICTED_LABEL)?,
            distances: view.vector(SCORE)?.to_vec(),
        })
    }
}

/// Species prediction for one flower
#[derive(Debug, Clone, PartialEq)]
pub struct MulticlassPrediction {
    /// Predicted species
    pub predicted_flower_type: String,

    /// Probability of every species
    pub scores: Vec<f32>,
}

impl FromRow for MulticlassPrediction {
    fn from_row(view: &RowView<'_>) -> Result<Self> {
        Ok(Self {
            predicted_flower_type: view.string("PredictedFlowerType")?.to_string(),
            scores: view.vector(SCORE)?.to_vec(),
        })
    }
}

/// Files of the iris task
#[derive(Debug, Clone)]
pub struct IrisTask {
    /// Comma-separated measurements without a header
    pub data: PathBuf,

    /// Where to save the clustering model
    pub clustering_model: PathBuf,

    /// Where to save the multiclass model
    pub multiclass_model: PathBuf,

    /// Fraction of rows held out for evaluation
    pub test_fraction: f64,
}

/// One held-out flower next to its cluster
#[derive(Debug, Clone, PartialEq)]
pub struct ClusteredFlower {
    /// Known species
    pub flower_type: String,

    /// Assigned cluster
    pub cluster: u32,
}

/// Outcome of the iris task
#[derive(Debug, Clone)]
pub struct IrisReport {
    /// Clustering metrics on the held-out rows
    pub clustering: ClusteringMetrics,

    /// First and last held-out flowers with their clusters
    pub clustered: Vec<ClusteredFlower>,

    /// Multiclass metrics on the held-out rows
    pub multiclass: MulticlassMetrics,

    /// Cluster of the sample setosa after reloading
    pub cluster_prediction: ClusterPrediction,

    /// Species of the sample setosa after reloading
    pub species_prediction: MulticlassPrediction,
}

/// Load the measurements file
pub fn load(path: &Path) -> Result<CsvDataset> {
    let options = CsvReaderOptions {
        has_header: false,
        ..CsvReaderOptions::default()
    };
    CsvDataset::load(path, options, IrisData::schema())
}

/// Species key and feature vector, shared by both models
pub fn features() -> Pipeline {
    Pipeline::new()
        .append(MapValueToKey::new("Label", "FlowerType"))
        .append(Concatenate::new(
            "Features",
            &["SepalLength", "SepalWidth", "PetalLength", "PetalWidth"],
        ))
        .append(CacheCheckpoint)
}

/// Three clusters over the measurements
pub fn clustering_pipeline() -> Pipeline {
    features()
        .append_trainer(KMeans::new("Features", 3))
        .append(MapKeyToValue::new("ExpectedFlowerType", "Label"))
}

/// Species classifier over the measurements
pub fn multiclass_pipeline() -> Pipeline {
    features()
        .append_trainer(MaximumEntropy::new("Label", "Features"))
        .append(MapKeyToValue::new("ExpectedFlowerType", "Label"))
        .append(MapKeyToValue::new("PredictedFlowerType", PREDICTED_LABEL))
}

fn clustered_flowers(model: &Model, test: &dyn Dataset) -> anyhow::Result<Vec<ClusteredFlower>> {
    let scored = model.transform(test)?;
    let schema = scored.schema();
    let rows = ml_fit_core::collect_rows(&scored, 256)?;

    let mut picked: Vec<&Row> = rows.iter().take(2).collect();
    picked.extend(rows.iter().skip(2).rev().take(3).rev());
    picked
        .into_iter()
        .map(|row| {
            let view = RowView::new(&schema, row);
            Ok(ClusteredFlower {
                flower_type: view.string("FlowerType")?.to_string(),
                cluster: view.key(PREDICTED_LABEL)?,
            })
        })
        .collect()
}

/// Run the whole task
pub fn run(task: &IrisTask, config: &PipelineConfig) -> anyhow::Result<IrisReport> {
    let data = load(&task.data).with_context(|| format!("loading {}", task.data.display()))?;
    let split = train_test_split(&data, task.test_fraction, config.seed)?;

    let clustering_model = clustering_pipeline().fit(&split.train, config)?;
    let clustering = evaluate_clustering(&clustering_model, &split.test, "Features", Some("Label"))?;
    let clustered = clustered_flowers(&clustering_model, &split.test)?;
    info!(
        average_distance = clustering.average_distance,
        davies_bouldin = clustering.davies_bouldin_index,
        "Evaluated clustering model"
    );
    let clustering_model = save_and_reload(&clustering_model, &task.clustering_model, config)?;

    let multiclass_model = multiclass_pipeline().fit(&split.train, config)?;
    let multiclass = evaluate_multiclass(&multiclass_model, &split.test, "Label")?;
    info!(micro_accuracy = multiclass.micro_accuracy, "Evaluated multiclass model");
    let multiclass_model = save_and_reload(&multiclass_model, &task.multiclass_model, config)?;

    let sample = IrisData::setosa();
    let cluster_prediction =
        PredictionEngine::<IrisData, ClusterPrediction>::new(Arc::clone(&clustering_model))?.predict(&sample)?;
    let species_prediction =
        PredictionEngine::<IrisData, MulticlassPrediction>::new(Arc::clone(&multiclass_model))?.predict(&sample)?;

    Ok(IrisReport {
        clustering,
        clustered,
        multiclass,
        cluster_prediction,
        species_prediction,
    })
}

fn join(values: &[f32]) -> String {
    values.iter().map(f32::to_string).collect::<Vec<_>>().join(" ")
}

impl fmt::Display for IrisReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for flower in &self.clustered {
            writeln!(f, "Expected flower type: {}, Predicted cluster: {}", flower.flower_type, flower.cluster)?;
        }
        writeln!(f)?;
        writeln!(f, "{}", RULE)?;
        writeln!(f, "*       Metrics for Clustering model - Test Data")?;
        writeln!(f, "Average distance: {:.2}", self.clustering.average_distance)?;
        writeln!(f, "Davies Bouldin index: {:.2}", self.clustering.davies_bouldin_index)?;
        if let Some(nmi) = self.clustering.normalized_mutual_information {
            writeln!(f, "Normalized mutual information: {:.2}", nmi)?;
        }
        writeln!(f, "{}", RULE)?;
        writeln!(f)?;
        writeln!(f, "{}", RULE)?;
        writeln!(f, "*       Metrics for Multi-class Classification model - Test Data")?;
        writeln!(f, "*       MicroAccuracy:    {:.3}", self.multiclass.micro_accuracy)?;
        writeln!(f, "*       MacroAccuracy:    {:.3}", self.multiclass.macro_accuracy)?;
        writeln!(f, "*       LogLoss:          {:.3}", self.multiclass.log_loss)?;
        writeln!(f, "*       LogLossReduction: {:.3}", self.multiclass.log_loss_reduction)?;
        writeln!(f, "{}", RULE)?;
        writeln!(f)?;
        writeln!(f, "=============== Single Prediction ===============")?;
        writeln!(f, "Predicted cluster: {}", self.cluster_prediction.predicted_cluster_id)?;
        writeln!(f, "Distances: {}", join(&self.cluster_prediction.distances))?;
        writeln!(f, "Predicted flower type: {}", self.species_prediction.predicted_flower_type)?;
        writeln!(f, "Scores: {}", join(&self.species_prediction.scores))
    }
}
