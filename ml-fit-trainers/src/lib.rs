//! Trainer variants for ML pipelines
//!
//! A trainer is the last learning step of a pipeline. Each variant reads its
//! label and feature columns, fits a small set of parameters and yields a
//! fitted model that appends prediction columns (`Score`, `PredictedLabel`,
//! `Probability`) to every row it scores.
//!
//! All trainers are deterministic: the same data in the same order with the
//! same [`PipelineConfig::seed`] yields identical parameters, whatever the
//! number of worker threads.

#![warn(missing_docs)]

pub mod binary;
pub mod clustering;
pub mod features;
pub mod multiclass;
pub mod recommendation;
pub mod regression;

use std::fmt;
use std::sync::Arc;

use ml_fit_core::{Dataset, PipelineConfig, Result, Row, RowTransform, Schema};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub use binary::{LogisticRegression, LogisticRegressionModel};
pub use clustering::{KMeans, KMeansModel};
pub use multiclass::{MaximumEntropy, MaximumEntropyModel};
pub use recommendation::{MatrixFactorization, MatrixFactorizationModel};
pub use regression::{FastTree, FastTreeModel, Stump};

/// Column receiving the raw score
pub const SCORE: &str = "Score";

/// Column receiving the predicted class or cluster
pub const PREDICTED_LABEL: &str = "PredictedLabel";

/// Column receiving the calibrated probability of a binary prediction
pub const PROBABILITY: &str = "Probability";

/// Summary of one trainer's optimization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitDiagnostics {
    /// Trainer name
    pub trainer: String,

    /// Iterations, epochs or boosting rounds performed
    pub iterations: usize,

    /// Whether the stopping tolerance was reached
    pub converged: bool,

    /// Training loss after the last iteration
    pub final_loss: f64,
}

impl FitDiagnostics {
    fn new(trainer: &str) -> Self {
        Self {
            trainer: trainer.to_string(),
            iterations: 0,
            converged: false,
            final_loss: f64::NAN,
        }
    }

    fn record(&mut self, iteration: usize, loss: f64) {
        self.iterations = iteration;
        self.final_loss = loss;
    }

    fn finish(&self) {
        if let Some(warning) = self.convergence_warning() {
            warn!(
                trainer = %warning.trainer,
                iterations = warning.iterations,
                final_loss = warning.final_loss,
                "Trainer stopped before reaching its tolerance"
            );
        }
    }

    /// Warning describing a fit that hit its iteration limit, if it did
    pub fn convergence_warning(&self) -> Option<ConvergenceWarning> {
        (!self.converged).then(|| ConvergenceWarning {
            trainer: self.trainer.clone(),
            iterations: self.iterations,
            final_loss: self.final_loss,
        })
    }
}

/// A trainer hit its iteration limit before converging.
///
/// The fitted model is still usable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceWarning {
    /// Trainer name
    pub trainer: String,

    /// Iterations performed
    pub iterations: usize,

    /// Training loss when fitting stopped
    pub final_loss: f64,
}

impl fmt::Display for ConvergenceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} did not converge after {} iterations (loss {:.6})",
            self.trainer, self.iterations, self.final_loss
        )
    }
}

/// Specification of a trainer, before fitting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrainerSpec {
    /// Multiclass maximum entropy classifier
    MaximumEntropy(MaximumEntropy),

    /// Binary logistic regression
    LogisticRegression(LogisticRegression),

    /// Boosted-stump regression
    FastTree(FastTree),

    /// Matrix factorization recommender
    MatrixFactorization(MatrixFactorization),

    /// K-means clustering
    KMeans(KMeans),
}

impl TrainerSpec {
    /// Short name used in logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            TrainerSpec::MaximumEntropy(_) => "MaximumEntropy",
            TrainerSpec::LogisticRegression(_) => "LogisticRegression",
            TrainerSpec::FastTree(_) => "FastTree",
            TrainerSpec::MatrixFactorization(_) => "MatrixFactorization",
            TrainerSpec::KMeans(_) => "KMeans",
        }
    }

    /// Fit the trainer against `data`
    pub fn fit(&self, data: &dyn Dataset, config: &PipelineConfig) -> Result<(FittedTrainer, FitDiagnostics)> {
        Ok(match self {
            TrainerSpec::MaximumEntropy(t) => {
                let (model, diagnostics) = t.fit(data, config)?;
                (FittedTrainer::MaximumEntropy(model), diagnostics)
            }
            TrainerSpec::LogisticRegression(t) => {
                let (model, diagnostics) = t.fit(data, config)?;
                (FittedTrainer::LogisticRegression(model), diagnostics)
            }
            TrainerSpec::FastTree(t) => {
                let (model, diagnostics) = t.fit(data, config)?;
                (FittedTrainer::FastTree(model), diagnostics)
            }
            TrainerSpec::MatrixFactorization(t) => {
                let (model, diagnostics) = t.fit(data, config)?;
                (FittedTrainer::MatrixFactorization(model), diagnostics)
            }
            TrainerSpec::KMeans(t) => {
                let (model, diagnostics) = t.fit(data, config)?;
                (FittedTrainer::KMeans(model), diagnostics)
            }
        })
    }

    /// Output schema without fitting
    pub fn plan_schema(&self, input_schema: &Schema) -> Result<Arc<Schema>> {
        match self {
            TrainerSpec::MaximumEntropy(t) => t.plan_schema(input_schema),
            TrainerSpec::LogisticRegression(t) => t.plan_schema(input_schema),
            TrainerSpec::FastTree(t) => t.plan_schema(input_schema),
            TrainerSpec::MatrixFactorization(t) => t.plan_schema(input_schema),
            TrainerSpec::KMeans(t) => t.plan_schema(input_schema),
        }
    }
}

impl From<MaximumEntropy> for TrainerSpec {
    fn from(t: MaximumEntropy) -> Self {
        TrainerSpec::MaximumEntropy(t)
    }
}

impl From<LogisticRegression> for TrainerSpec {
    fn from(t: LogisticRegression) -> Self {
        TrainerSpec::LogisticRegression(t)
    }
}

impl From<FastTree> for TrainerSpec {
    fn from(t: FastTree) -> Self {
        TrainerSpec::FastTree(t)
    }
}

impl From<MatrixFactorization> for TrainerSpec {
    fn from(t: MatrixFactorization) -> Self {
        TrainerSpec::MatrixFactorization(t)
    }
}

impl From<KMeans> for TrainerSpec {
    fn from(t: KMeans) -> Self {
        TrainerSpec::KMeans(t)
    }
}

/// A fitted trainer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FittedTrainer {
    /// Fitted maximum entropy classifier
    MaximumEntropy(MaximumEntropyModel),

    /// Fitted logistic regression
    LogisticRegression(LogisticRegressionModel),

    /// Fitted stump ensemble
    FastTree(FastTreeModel),

    /// Fitted matrix factorization
    MatrixFactorization(MatrixFactorizationModel),

    /// Fitted k-means centroids
    KMeans(KMeansModel),
}

impl FittedTrainer {
    fn inner(&self) -> &dyn RowTransform {
        match self {
            FittedTrainer::MaximumEntropy(m) => m,
            FittedTrainer::LogisticRegression(m) => m,
            FittedTrainer::FastTree(m) => m,
            FittedTrainer::MatrixFactorization(m) => m,
            FittedTrainer::KMeans(m) => m,
        }
    }
}

impl RowTransform for FittedTrainer {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn output_schema(&self, input_schema: &Schema) -> Result<Arc<Schema>> {
        self.inner().output_schema(input_schema)
    }

    fn transform_row(&self, input_schema: &Schema, row: Row) -> Result<Row> {
        self.inner().transform_row(input_schema, row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ml_fit_core::{DataType, Field, InMemoryDataset, Value};

    #[test]
    fn test_fitted_trainer_survives_bincode() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("Features", DataType::Vector(1)),
            Field::new("Label", DataType::Float),
        ]));
        let rows = (0..10)
            .map(|i| Row::new(vec![Value::Vector(vec![i as f32]), Value::Float(i as f32 * 2.0)]))
            .collect();
        let data = InMemoryDataset::new(schema, rows).unwrap();

        let spec: TrainerSpec = FastTree::default().with_number_of_trees(5).into();
        let (fitted, diagnostics) = spec.fit(&data, &PipelineConfig::default()).unwrap();
        assert_eq!(diagnostics.trainer, "FastTree");

        let bytes = bincode::serialize(&fitted).unwrap();
        let restored: FittedTrainer = bincode::deserialize(&bytes).unwrap();
        assert_eq!(restored, fitted);
    }

    #[test]
    fn test_convergence_warning_only_when_not_converged() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let mut diagnostics = FitDiagnostics::new("KMeans");
        diagnostics.record(100, 0.25);
        let warning = diagnostics.convergence_warning().unwrap();
        assert_eq!(warning.iterations, 100);
        assert!(warning.to_string().contains("KMeans"));

        diagnostics.converged = true;
        assert!(diagnostics.convergence_warning().is_none());
    }

    #[test]
    fn test_plan_schema_checks_label_type() {
        let schema = Schema::new(vec![
            Field::new("Features", DataType::Vector(4)),
            Field::new("Label", DataType::String),
        ]);
        let spec: TrainerSpec = LogisticRegression::default().into();
        assert!(spec.plan_schema(&schema).is_err());

        let spec: TrainerSpec = KMeans::new("Features", 3).into();
        let planned = spec.plan_schema(&schema).unwrap();
        assert_eq!(planned.field_by_name(SCORE).unwrap().data_type(), &DataType::Vector(3));
    }
}
