//! Task-specific evaluation metrics
//!
//! Every evaluator scores the full test dataset through the model and
//! aggregates over all rows. Metrics are plain values computed once.

mod binary;
mod clustering;
mod multiclass;
mod regression;

pub use binary::{evaluate_binary, BinaryMetrics};
pub use clustering::{evaluate_clustering, ClusteringMetrics};
pub use multiclass::{evaluate_multiclass, ConfusionMatrix, MulticlassMetrics};
pub use regression::{evaluate_regression, RegressionMetrics};

use ml_fit_core::{for_each_row, Dataset, Error, Result, RowView};

use crate::model::Model;

/// Smallest probability used in log-loss terms
const PROBABILITY_FLOOR: f64 = 1e-15;

/// Rows pulled per batch while scoring a test set
const EVALUATION_BATCH_SIZE: usize = 1024;

/// Score `data` through `model` and hand every scored row to `visit`
fn for_each_scored<F>(model: &Model, data: &dyn Dataset, mut visit: F) -> Result<usize>
where
    F: FnMut(&RowView<'_>) -> Result<()>,
{
    let scored = model.transform(data)?;
    let schema = scored.schema();
    let mut rows = 0;
    for_each_row(&scored, EVALUATION_BATCH_SIZE, |row| {
        rows += 1;
        visit(&RowView::new(&schema, row))
    })?;

    if rows == 0 {
        return Err(Error::InvalidArgument("cannot evaluate on an empty dataset".to_string()));
    }
    Ok(rows)
}

fn log_loss_term(probability: f64) -> f64 {
    -probability.clamp(PROBABILITY_FLOOR, 1.0).ln()
}
