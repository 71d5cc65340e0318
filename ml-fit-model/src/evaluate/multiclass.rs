use ml_fit_core::{Dataset, Error, Result};
use ml_fit_trainers::SCORE;
use serde::{Deserialize, Serialize};

use super::{for_each_scored, log_loss_term};
use crate::model::Model;

/// Counts of actual versus predicted classes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// `counts[actual][predicted]`, both zero-based class indices
    pub counts: Vec<Vec<u64>>,
}

impl ConfusionMatrix {
    fn new(classes: usize) -> Self {
        Self {
            counts: vec![vec![0; classes]; classes],
        }
    }

    /// Number of classes
    pub fn classes(&self) -> usize {
        self.counts.len()
    }

    /// Fraction of rows of class `actual` that were predicted correctly
    pub fn recall(&self, actual: usize) -> Option<f64> {
        let row = self.counts.get(actual)?;
        let total: u64 = row.iter().sum();
        (total > 0).then(|| row[actual] as f64 / total as f64)
    }
}

/// Quality of a multiclass classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MulticlassMetrics {
    /// Fraction of rows predicted correctly
    pub micro_accuracy: f64,

    /// Mean per-class recall over the classes present in the test labels
    pub macro_accuracy: f64,

    /// Mean negative log-probability of the true class
    pub log_loss: f64,

    /// Relative improvement in log-loss over uniform guessing
    pub log_loss_reduction: f64,

    /// Log-loss per class; NaN for classes absent from the test labels
    pub per_class_log_loss: Vec<f64>,

    /// Actual versus predicted counts
    pub confusion_matrix: ConfusionMatrix,
}

/// One-based index of the first highest probability
fn predicted_class(probabilities: &[f32]) -> usize {
    probabilities
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (c, &p)| if p > best.1 { (c, p) } else { best })
        .0
        + 1
}

/// Evaluate a multiclass model against the key column `label`.
///
/// The predicted class is read from the `Score` vector, so a pipeline may
/// map `PredictedLabel` back to its original values after the trainer.
/// Rows whose label is the missing key are skipped.
pub fn evaluate_multiclass(model: &Model, data: &dyn Dataset, label: &str) -> Result<MulticlassMetrics> {
    let mut classes = 0;
    let mut confusion = ConfusionMatrix::new(0);
    let mut class_loss: Vec<(f64, u64)> = Vec::new();
    let mut total_loss = 0.0;
    let mut counted = 0u64;

    for_each_scored(model, data, |view| {
        let probabilities = view.vector(SCORE)?;
        if classes == 0 {
            classes = probabilities.len();
            confusion = ConfusionMatrix::new(classes);
            class_loss = vec![(0.0, 0); classes];
        }

        let actual = view.key(label)? as usize;
        if actual == 0 || actual > classes {
            return Ok(());
        }
        let predicted = predicted_class(probabilities);

        let loss = log_loss_term(f64::from(probabilities[actual - 1]));
        total_loss += loss;
        class_loss[actual - 1].0 += loss;
        class_loss[actual - 1].1 += 1;
        confusion.counts[actual - 1][predicted - 1] += 1;
        counted += 1;
        Ok(())
    })?;

    if counted == 0 {
        return Err(Error::InvalidArgument(format!("no rows with a known {} to evaluate", label)));
    }

    let correct: u64 = (0..classes).map(|c| confusion.counts[c][c]).sum();
    let recalls: Vec<f64> = (0..classes).filter_map(|c| confusion.recall(c)).collect();
    let log_loss = total_loss / counted as f64;
    let uniform = (classes as f64).ln();

    Ok(MulticlassMetrics {
        micro_accuracy: correct as f64 / counted as f64,
        macro_accuracy: recalls.iter().sum::<f64>() / recalls.len() as f64,
        log_loss,
        log_loss_reduction: if uniform > 0.0 { 1.0 - log_loss / uniform } else { 0.0 },
        per_class_log_loss: class_loss
            .iter()
            .map(|&(loss, n)| if n > 0 { loss / n as f64 } else { f64::NAN })
            .collect(),
        confusion_matrix: confusion,
    })
}
