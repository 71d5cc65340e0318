//! Trained models and lazy views through them

use std::sync::Arc;

use ml_fit_core::{Dataset, Error, RecordBatch, RecordBatchSource, Result, Row, RowTransform, Schema};
use ml_fit_trainers::{ConvergenceWarning, FitDiagnostics, FittedTrainer};
use ml_fit_transforms::FittedStage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One fitted step of a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FittedStep {
    /// A fitted transform stage
    Stage(FittedStage),

    /// A fitted trainer
    Trainer(FittedTrainer),
}

impl FittedStep {
    fn inner(&self) -> &dyn RowTransform {
        match self {
            FittedStep::Stage(stage) => stage,
            FittedStep::Trainer(trainer) => trainer,
        }
    }
}

impl RowTransform for FittedStep {
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

/// Schemas of a run of fitted steps applied to one input schema.
///
/// `schemas[i]` is the input of step `i`; the last entry is the output.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelBinding {
    schemas: Vec<Arc<Schema>>,

    /// Pipeline index of the first bound step
    offset: usize,
}

impl ModelBinding {
    /// Resolve the schema after every step, naming the failing step on error
    pub fn new(steps: &[FittedStep], input_schema: Arc<Schema>, offset: usize) -> Result<Self> {
        let mut schemas = Vec::with_capacity(steps.len() + 1);
        schemas.push(input_schema);
        for (i, step) in steps.iter().enumerate() {
            let next = step
                .output_schema(&schemas[i])
                .map_err(|e| e.in_stage(offset + i, step.name()))?;
            schemas.push(next);
        }
        Ok(Self { schemas, offset })
    }

    /// Get the schema the bound steps expect
    pub fn input_schema(&self) -> &Arc<Schema> {
        &self.schemas[0]
    }

    /// Get the schema the bound steps produce
    pub fn output_schema(&self) -> &Arc<Schema> {
        &self.schemas[self.schemas.len() - 1]
    }

    /// Run one row through `steps`, which must be the steps this binding was built for
    pub fn apply(&self, steps: &[FittedStep], mut row: Row) -> Result<Row> {
        for (i, step) in steps.iter().enumerate() {
            row = step
                .transform_row(&self.schemas[i], row)
                .map_err(|e| e.in_stage(self.offset + i, step.name()))?;
        }
        Ok(row)
    }
}

/// An immutable trained model.
///
/// Holds the fitted steps in pipeline order together with the schema the
/// model was trained on and the schema it produces. Models are shared
/// between threads through `Arc`; scoring only reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    id: Uuid,
    steps: Vec<FittedStep>,
    input_schema: Schema,
    output_schema: Schema,
    diagnostics: Vec<FitDiagnostics>,
}

impl Model {
    pub(crate) fn new(steps: Vec<FittedStep>, input_schema: Arc<Schema>, diagnostics: Vec<FitDiagnostics>) -> Result<Self> {
        let binding = ModelBinding::new(&steps, input_schema.clone(), 0)?;
        Ok(Self {
            id: Uuid::new_v4(),
            output_schema: binding.output_schema().as_ref().clone(),
            input_schema: input_schema.as_ref().clone(),
            steps,
            diagnostics,
        })
    }

    /// Unique id assigned when the model was fit
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Get the fitted steps in order
    pub fn steps(&self) -> &[FittedStep] {
        &self.steps
    }

    /// Get the schema of the training data
    pub fn input_schema(&self) -> &Schema {
        &self.input_schema
    }

    /// Get the schema of scored rows for the training schema
    pub fn output_schema(&self) -> &Schema {
        &self.output_schema
    }

    /// Get the optimization summary of every trainer
    pub fn diagnostics(&self) -> &[FitDiagnostics] {
        &self.diagnostics
    }

    /// Warnings for trainers that stopped at their iteration limit
    pub fn convergence_warnings(&self) -> Vec<ConvergenceWarning> {
        self.diagnostics
            .iter()
            .filter_map(FitDiagnostics::convergence_warning)
            .collect()
    }

    /// Bind the model to an input schema, checking every step against it
    pub fn bind(&self, input_schema: Arc<Schema>) -> Result<ModelBinding> {
        ModelBinding::new(&self.steps, input_schema, 0)
    }

    /// Check that the stored schemas agree with each other and with the
    /// fitted steps. Failures are reported as [`Error::CorruptArtifact`].
    pub fn validate(&self, input_schema: &Schema) -> Result<()> {
        if *input_schema != self.input_schema {
            return Err(Error::CorruptArtifact(
                "stored input schema does not match the model".to_string(),
            ));
        }
        let binding = self
            .bind(Arc::new(self.input_schema.clone()))
            .map_err(|e| Error::CorruptArtifact(format!("fitted steps do not bind: {}", e)))?;
        if **binding.output_schema() != self.output_schema {
            return Err(Error::CorruptArtifact(
                "stored output schema does not match the fitted steps".to_string(),
            ));
        }
        Ok(())
    }

    /// Score one row laid out by `binding`'s input schema
    pub fn score_row(&self, binding: &ModelBinding, row: Row) -> Result<Row> {
        binding.apply(&self.steps, row)
    }

    /// Lazily transform a whole dataset
    pub fn transform<'a>(&'a self, data: &'a dyn Dataset) -> Result<TransformedView<'a>> {
        TransformedView::new(data, &self.steps, 0)
    }
}

/// A dataset seen through a run of fitted steps.
///
/// Rows are transformed as they are scanned; nothing is materialized.
pub struct TransformedView<'a> {
    base: &'a dyn Dataset,
    steps: &'a [FittedStep],
    binding: ModelBinding,
}

impl<'a> TransformedView<'a> {
    /// View `base` through `steps`, the first of which sits at pipeline index `offset`
    pub fn new(base: &'a dyn Dataset, steps: &'a [FittedStep], offset: usize) -> Result<Self> {
        let binding = ModelBinding::new(steps, base.schema(), offset)?;
        Ok(Self { base, steps, binding })
    }
}

impl Dataset for TransformedView<'_> {
    fn schema(&self) -> Arc<Schema> {
        self.binding.output_schema().clone()
    }

    fn row_count(&self) -> Option<usize> {
        self.base.row_count()
    }

    fn scan(&self) -> Result<Box<dyn RecordBatchSource + '_>> {
        Ok(Box::new(TransformedSource {
            inner: self.base.scan()?,
            steps: self.steps,
            binding: &self.binding,
        }))
    }
}

struct TransformedSource<'a> {
    inner: Box<dyn RecordBatchSource + 'a>,
    steps: &'a [FittedStep],
    binding: &'a ModelBinding,
}

impl RecordBatchSource for TransformedSource<'_> {
    fn schema(&self) -> Arc<Schema> {
        self.binding.output_schema().clone()
    }

    fn next_batch(&mut self, max_batch_size: usize) -> Result<Option<RecordBatch>> {
        let Some(batch) = self.inner.next_batch(max_batch_size)? else {
            return Ok(None);
        };

        let rows = batch
            .into_rows()
            .into_iter()
            .map(|row| self.binding.apply(self.steps, row))
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(RecordBatch::new_unchecked(self.binding.output_schema().clone(), rows)))
    }
}
