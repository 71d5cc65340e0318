//! Pipeline composition and fitting

use std::sync::Arc;

use ml_fit_core::{Dataset, Error, InMemoryDataset, PipelineConfig, Result, Schema};
use ml_fit_trainers::TrainerSpec;
use ml_fit_transforms::StageSpec;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::model::{FittedStep, Model, TransformedView};

/// One step of an unfitted pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Step {
    /// A transform stage
    Stage(StageSpec),

    /// A trainer
    Trainer(TrainerSpec),
}

impl Step {
    /// Short name used in logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            Step::Stage(stage) => stage.name(),
            Step::Trainer(trainer) => trainer.name(),
        }
    }
}

/// An ordered, immutable composition of stages and trainers.
///
/// Building a pipeline never touches data; [`Pipeline::fit`] reads the
/// training data and returns a new [`Model`], leaving the pipeline as it was
/// so it can be fit again.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    steps: Vec<Step>,
}

impl Pipeline {
    /// Create an empty pipeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a pipeline with `stage` appended
    #[must_use]
    pub fn append(mut self, stage: impl Into<StageSpec>) -> Self {
        self.steps.push(Step::Stage(stage.into()));
        self
    }

    /// Return a pipeline with `trainer` appended
    #[must_use]
    pub fn append_trainer(mut self, trainer: impl Into<TrainerSpec>) -> Self {
        self.steps.push(Step::Trainer(trainer.into()));
        self
    }

    /// Get the steps in order
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Number of steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check if the pipeline has no steps
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Check the composition against an input schema without fitting.
    ///
    /// Column widths that depend on fitted vocabularies are not known yet,
    /// so the returned schema may differ from the fitted model's in vector
    /// and key sizes, never in column names or kinds.
    pub fn output_schema(&self, input_schema: &Schema) -> Result<Arc<Schema>> {
        let mut schema = Arc::new(input_schema.clone());
        for (index, step) in self.steps.iter().enumerate() {
            let planned = match step {
                Step::Stage(stage) => stage.plan_schema(&schema),
                Step::Trainer(trainer) => trainer.plan_schema(&schema),
            };
            schema = planned.map_err(|e| e.in_stage(index, step.name()))?;
        }
        Ok(schema)
    }

    /// Fit every step in order against the training data.
    ///
    /// Each step sees the training rows through the steps fitted before it.
    /// The first failing step aborts the fit with [`Error::Stage`].
    pub fn fit(&self, training: &dyn Dataset, config: &PipelineConfig) -> Result<Model> {
        if self.steps.is_empty() {
            return Err(Error::InvalidArgument("cannot fit an empty pipeline".to_string()));
        }

        info!(
            steps = self.steps.len(),
            rows = ?training.row_count(),
            seed = config.seed,
            "Fitting pipeline"
        );
        let pool = config.thread_pool()?;
        let model = pool.install(|| self.fit_steps(training, config))?;
        info!(model_id = %model.id(), "Fitted pipeline");

        for warning in model.convergence_warnings() {
            debug!(%warning, "Model carries a convergence warning");
        }
        Ok(model)
    }

    fn fit_steps(&self, training: &dyn Dataset, config: &PipelineConfig) -> Result<Model> {
        let mut fitted: Vec<FittedStep> = Vec::with_capacity(self.steps.len());
        let mut diagnostics = Vec::new();

        // Steps before `cached_upto` are already applied to the cached rows
        let mut cache: Option<InMemoryDataset> = None;
        let mut cached_upto = 0;

        for (index, step) in self.steps.iter().enumerate() {
            let (fitted_step, checkpoint) = {
                let base: &dyn Dataset = match &cache {
                    Some(rows) => rows,
                    None => training,
                };
                let view = TransformedView::new(base, &fitted[cached_upto..], cached_upto)?;
                debug!(index, step = step.name(), "Fitting step");

                match step {
                    Step::Stage(stage) => {
                        let fitted_stage = stage
                            .fit(&view, config.batch_size)
                            .map_err(|e| e.in_stage(index, stage.name()))?;
                        let checkpoint = if stage.is_cache_checkpoint() {
                            // row errors from earlier steps already name their stage
                            let rows = InMemoryDataset::materialize(&view, config.batch_size).map_err(|e| match e {
                                staged @ Error::Stage { .. } => staged,
                                other => other.in_stage(index, stage.name()),
                            })?;
                            Some(rows)
                        } else {
                            None
                        };
                        (FittedStep::Stage(fitted_stage), checkpoint)
                    }
                    Step::Trainer(trainer) => {
                        let (fitted_trainer, fit_diagnostics) = trainer
                            .fit(&view, config)
                            .map_err(|e| e.in_stage(index, trainer.name()))?;
                        diagnostics.push(fit_diagnostics);
                        (FittedStep::Trainer(fitted_trainer), None)
                    }
                }
            };

            fitted.push(fitted_step);
            if let Some(rows) = checkpoint {
                debug!(index, rows = ?rows.row_count(), "Cached training rows");
                cache = Some(rows);
                cached_upto = fitted.len();
            }
        }

        Model::new(fitted, training.schema(), diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ml_fit_core::{DataType, Field, Row, Value};
    use ml_fit_trainers::{FastTree, LogisticRegression};
    use ml_fit_transforms::{CacheCheckpoint, Concatenate, CopyColumn, FeaturizeText, MapValueToKey};

    fn taxi() -> InMemoryDataset {
        let schema = Arc::new(Schema::new(vec![
            Field::new("TripDistance", DataType::Float),
            Field::new("PassengerCount", DataType::Float),
            Field::new("FareAmount", DataType::Float),
        ]));
        let rows = (0..40)
            .map(|i| {
                let distance = (i % 10) as f32;
                Row::new(vec![
                    Value::Float(distance),
                    Value::Float((i % 3) as f32),
                    Value::Float(3.0 + 2.5 * distance),
                ])
            })
            .collect();
        InMemoryDataset::new(schema, rows).unwrap()
    }

    fn taxi_pipeline() -> Pipeline {
        Pipeline::new()
            .append(CopyColumn::new("Label", "FareAmount"))
            .append(Concatenate::new("Features", &["TripDistance", "PassengerCount"]))
            .append(CacheCheckpoint)
            .append_trainer(FastTree::default().with_number_of_trees(20))
    }

    #[test]
    fn test_empty_pipeline_is_rejected() {
        let result = Pipeline::new().fit(&taxi(), &PipelineConfig::default());
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_append_returns_new_pipeline() {
        let base = Pipeline::new().append(CopyColumn::new("Label", "FareAmount"));
        let extended = base.clone().append(CacheCheckpoint);
        assert_eq!(base.len(), 1);
        assert_eq!(extended.len(), 2);
    }

    #[test]
    fn test_missing_column_names_stage() {
        let pipeline = Pipeline::new()
            .append(CopyColumn::new("Label", "FareAmount"))
            .append(Concatenate::new("Features", &["TripDistance", "TripTime"]))
            .append_trainer(FastTree::default());

        let err = pipeline.fit(&taxi(), &PipelineConfig::default()).unwrap_err();
        match err {
            Error::Stage { index, name, source } => {
                assert_eq!(index, 1);
                assert_eq!(name, "Concatenate");
                assert!(matches!(*source, Error::Schema { ref column, .. } if column == "TripTime"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    struct Unreadable(Arc<Schema>);

    impl Dataset for Unreadable {
        fn schema(&self) -> Arc<Schema> {
            self.0.clone()
        }

        fn row_count(&self) -> Option<usize> {
            None
        }

        fn scan(&self) -> Result<Box<dyn ml_fit_core::RecordBatchSource + '_>> {
            Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "source went away").into())
        }
    }

    #[test]
    fn test_cache_failure_names_checkpoint() {
        let data = Unreadable(taxi().schema());
        let pipeline = Pipeline::new()
            .append(CopyColumn::new("Label", "FareAmount"))
            .append(CacheCheckpoint)
            .append_trainer(FastTree::default());

        let err = pipeline.fit(&data, &PipelineConfig::default()).unwrap_err();
        match err {
            Error::Stage { index, ref name, ref source } if name == "CacheCheckpoint" => {
                assert_eq!(index, 1);
                assert!(matches!(**source, Error::Io(_)));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_fit_with_cache_checkpoint() {
        let data = taxi();
        let model = taxi_pipeline().fit(&data, &PipelineConfig::default()).unwrap();
        assert_eq!(model.steps().len(), 4);
        assert!(model.output_schema().find("Score").is_some());
        assert_eq!(model.diagnostics().len(), 1);
    }

    #[test]
    fn test_fit_is_deterministic_across_thread_counts() {
        let data = taxi();
        let one = PipelineConfig {
            worker_threads: 1,
            ..PipelineConfig::default()
        };
        let four = PipelineConfig {
            worker_threads: 4,
            ..PipelineConfig::default()
        };
        let a = taxi_pipeline().fit(&data, &one).unwrap();
        let b = taxi_pipeline().fit(&data, &four).unwrap();
        assert_eq!(a.steps(), b.steps());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_output_schema_dry_run() {
        let schema = Schema::new(vec![
            Field::new("SentimentText", DataType::String),
            Field::new("Label", DataType::Bool),
        ]);
        let pipeline = Pipeline::new()
            .append(FeaturizeText::new("Features", "SentimentText"))
            .append_trainer(LogisticRegression::default());
        let planned = pipeline.output_schema(&schema).unwrap();
        assert_eq!(planned.field_by_name("PredictedLabel").unwrap().data_type(), &DataType::Bool);

        let broken = Pipeline::new().append(MapValueToKey::new("Label", "Area"));
        assert!(matches!(broken.output_schema(&schema), Err(Error::Stage { index: 0, .. })));
    }
}
