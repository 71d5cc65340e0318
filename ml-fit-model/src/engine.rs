//! Typed single-record and batch prediction

use std::marker::PhantomData;
use std::sync::Arc;

use ml_fit_core::{FromRow, Record, Result, Row, RowView, Schema};
use rayon::prelude::*;

use crate::model::{Model, ModelBinding};

/// Scores typed input records and reads typed predictions back.
///
/// The engine binds the model to `I`'s schema once, so every prediction
/// skips schema resolution. It only reads the shared model and can be used
/// from many threads at once.
pub struct PredictionEngine<I, O> {
    model: Arc<Model>,
    binding: ModelBinding,
    _marker: PhantomData<fn(&I) -> O>,
}

impl<I: Record, O: FromRow> PredictionEngine<I, O> {
    /// Create an engine for `model`.
    ///
    /// Fails if any step of the model cannot accept `I`'s schema.
    pub fn new(model: Arc<Model>) -> Result<Self> {
        let binding = model.bind(Arc::new(I::schema()))?;
        Ok(Self {
            model,
            binding,
            _marker: PhantomData,
        })
    }

    /// Get the underlying model
    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    /// Get the schema of scored rows
    pub fn output_schema(&self) -> &Arc<Schema> {
        self.binding.output_schema()
    }

    /// Score an untyped row laid out by `I`'s schema
    pub fn score_row(&self, row: Row) -> Result<Row> {
        self.model.score_row(&self.binding, row)
    }

    /// Predict one record
    pub fn predict(&self, input: &I) -> Result<O> {
        let row = self.score_row(input.to_row())?;
        O::from_row(&RowView::new(self.binding.output_schema(), &row))
    }

    /// Predict many records in parallel, keeping input order.
    ///
    /// Every output equals what [`PredictionEngine::predict`] returns for the
    /// same input.
    pub fn predict_batch(&self, inputs: &[I]) -> Result<Vec<O>>
    where
        O: Send,
    {
        inputs.par_iter().map(|input| self.predict(input)).collect()
    }
}

impl<I, O> std::fmt::Debug for PredictionEngine<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionEngine")
            .field("model_id", &self.model.id())
            .field("output_schema", self.binding.output_schema())
            .finish()
    }
}
