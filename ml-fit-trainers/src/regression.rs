//! Regression by gradient-boosted stumps
//!
//! Each boosting round fits a single-split tree to the current residuals
//! under squared loss and adds it with shrinkage. The best split of every
//! feature is searched in parallel; ties go to the lowest feature index.

use std::sync::Arc;

use ml_fit_core::{output_slots, DataType, Dataset, Error, Field, PipelineConfig, Result, Row, RowTransform, Schema, Value};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::features::{collect_examples, feature_column, numeric_label, row_features};
use crate::{FitDiagnostics, SCORE};

/// Boosted-stump regression trainer options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FastTree {
    /// Numeric target column
    pub label: String,

    /// Feature column
    pub features: String,

    /// Number of boosting rounds
    pub number_of_trees: usize,

    /// Shrinkage applied to every stump
    pub learning_rate: f32,

    /// Minimum number of rows on each side of a split
    pub min_examples_per_leaf: usize,

    /// Stop once the training MSE improves by less than this
    pub tolerance: f64,
}

impl Default for FastTree {
    fn default() -> Self {
        Self {
            label: "Label".to_string(),
            features: "Features".to_string(),
            number_of_trees: 100,
            learning_rate: 0.2,
            min_examples_per_leaf: 2,
            tolerance: 1e-9,
        }
    }
}

impl FastTree {
    /// Train on `label` and `features`
    pub fn new(label: &str, features: &str) -> Self {
        Self {
            label: label.to_string(),
            features: features.to_string(),
            ..Self::default()
        }
    }

    /// Set the number of boosting rounds
    pub fn with_number_of_trees(mut self, number_of_trees: usize) -> Self {
        self.number_of_trees = number_of_trees;
        self
    }

    pub(crate) fn plan_schema(&self, input_schema: &Schema) -> Result<Arc<Schema>> {
        feature_column(input_schema, &self.features)?;
        input_schema.require(&self.label, DataType::is_numeric)?;
        Ok(input_schema.with_field(Field::new(SCORE, DataType::Float)).0)
    }

    /// Fit the stump ensemble
    pub fn fit(&self, data: &dyn Dataset, config: &PipelineConfig) -> Result<(FastTreeModel, FitDiagnostics)> {
        data.schema().require(&self.label, DataType::is_numeric)?;
        let examples = collect_examples(data, &self.features, &self.label, config.batch_size, numeric_label)?;
        if examples.is_empty() {
            return Err(Error::Training(format!("no labeled rows in column {} to train on", self.label)));
        }

        let n = examples.len();
        let columns: Vec<Vec<f32>> = (0..examples.dimension)
            .map(|j| examples.features.iter().map(|x| x[j]).collect())
            .collect();
        let orders: Vec<Vec<usize>> = columns
            .par_iter()
            .map(|column| {
                let mut order: Vec<usize> = (0..n).collect();
                order.sort_by(|&a, &b| column[a].total_cmp(&column[b]));
                order
            })
            .collect();

        let bias = examples.labels.iter().map(|&y| f64::from(y)).sum::<f64>() / n as f64;
        let mut predictions = vec![bias; n];
        let mut stumps = Vec::with_capacity(self.number_of_trees);
        let mut diagnostics = FitDiagnostics::new("FastTree");
        let mut previous_loss = mse(&examples.labels, &predictions);

        for round in 1..=self.number_of_trees {
            let residuals: Vec<f64> = examples
                .labels
                .iter()
                .zip(&predictions)
                .map(|(&y, &p)| f64::from(y) - p)
                .collect();
            let total: f64 = residuals.iter().sum();

            let candidates: Vec<Option<Split>> = orders
                .par_iter()
                .zip(&columns)
                .enumerate()
                .map(|(feature, (order, column))| {
                    best_split(feature, order, column, &residuals, total, self.min_examples_per_leaf)
                })
                .collect();

            let mut best: Option<Split> = None;
            for split in candidates.into_iter().flatten() {
                if best.as_ref().map_or(true, |b| split.gain > b.gain) {
                    best = Some(split);
                }
            }
            let Some(split) = best else {
                debug!(round, "No further split improves the fit");
                diagnostics.converged = true;
                break;
            };

            let stump = Stump {
                feature: split.feature,
                threshold: split.threshold,
                left: (split.left_mean as f32) * self.learning_rate,
                right: (split.right_mean as f32) * self.learning_rate,
            };
            for (i, prediction) in predictions.iter_mut().enumerate() {
                *prediction += f64::from(stump.evaluate(columns[stump.feature][i]));
            }
            stumps.push(stump);

            let loss = mse(&examples.labels, &predictions);
            debug!(round, loss, "FastTree round");
            diagnostics.record(round, loss);
            if previous_loss - loss < self.tolerance {
                diagnostics.converged = true;
                break;
            }
            previous_loss = loss;
        }

        if stumps.is_empty() {
            diagnostics.final_loss = previous_loss;
        }
        diagnostics.finish();
        info!(rows = n, trees = stumps.len(), "Trained FastTree");

        let model = FastTreeModel {
            features: self.features.clone(),
            dimension: examples.dimension,
            bias: bias as f32,
            stumps,
        };
        Ok((model, diagnostics))
    }
}

fn mse(labels: &[f32], predictions: &[f64]) -> f64 {
    let total: f64 = labels
        .iter()
        .zip(predictions)
        .map(|(&y, &p)| (f64::from(y) - p).powi(2))
        .sum();
    total / labels.len() as f64
}

struct Split {
    feature: usize,
    threshold: f32,
    left_mean: f64,
    right_mean: f64,
    gain: f64,
}

fn best_split(
    feature: usize,
    order: &[usize],
    column: &[f32],
    residuals: &[f64],
    total: f64,
    min_leaf: usize,
) -> Option<Split> {
    let n = order.len();
    let min_leaf = min_leaf.max(1);
    let baseline = total * total / n as f64;
    let mut left_sum = 0.0;
    let mut best: Option<Split> = None;

    for position in 0..n.saturating_sub(1) {
        left_sum += residuals[order[position]];
        let left_count = position + 1;
        let right_count = n - left_count;
        let here = column[order[position]];
        let next = column[order[position + 1]];
        if here >= next || left_count < min_leaf || right_count < min_leaf {
            continue;
        }

        let right_sum = total - left_sum;
        let gain = left_sum * left_sum / left_count as f64 + right_sum * right_sum / right_count as f64 - baseline;
        if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
            best = Some(Split {
                feature,
                threshold: here + (next - here) / 2.0,
                left_mean: left_sum / left_count as f64,
                right_mean: right_sum / right_count as f64,
                gain,
            });
        }
    }

    best
}

/// A single-split regression tree
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stump {
    /// Feature slot tested
    pub feature: usize,

    /// Values at or below go left
    pub threshold: f32,

    /// Output for the left side
    pub left: f32,

    /// Output for the right side
    pub right: f32,
}

impl Stump {
    fn evaluate(&self, value: f32) -> f32 {
        if value <= self.threshold {
            self.left
        } else {
            self.right
        }
    }
}

/// Trained stump ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FastTreeModel {
    features: String,
    dimension: usize,
    bias: f32,
    stumps: Vec<Stump>,
}

impl FastTreeModel {
    /// Predict the target for one feature vector
    pub fn predict(&self, x: &[f32]) -> f32 {
        self.stumps
            .iter()
            .fold(self.bias, |score, stump| score + stump.evaluate(x.get(stump.feature).copied().unwrap_or(0.0)))
    }

    /// Get the fitted stumps in boosting order
    pub fn stumps(&self) -> &[Stump] {
        &self.stumps
    }
}

impl RowTransform for FastTreeModel {
    fn name(&self) -> &'static str {
        "FastTree"
    }

    fn output_schema(&self, input_schema: &Schema) -> Result<Arc<Schema>> {
        feature_column(input_schema, &self.features)?;
        Ok(input_schema.with_field(Field::new(SCORE, DataType::Float)).0)
    }

    fn transform_row(&self, input_schema: &Schema, mut row: Row) -> Result<Row> {
        let (index, dimension) = feature_column(input_schema, &self.features)?;
        if dimension != self.dimension {
            return Err(Error::schema(
                &self.features,
                format!("expected {} features, found {}", self.dimension, dimension),
            ));
        }

        let score = self.predict(&row_features(&row, index, &self.features)?);
        let slot = output_slots(input_schema, &[SCORE])[0];
        row.put(slot, Value::Float(score))?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ml_fit_core::InMemoryDataset;

    fn fares() -> InMemoryDataset {
        let schema = Arc::new(Schema::new(vec![
            Field::new("Features", DataType::Vector(2)),
            Field::new("Label", DataType::Float),
        ]));
        let rows = (0..60)
            .map(|i| {
                let distance = (i % 12) as f32;
                let passengers = (i % 3) as f32;
                let fare = 2.5 + 2.0 * distance + 0.5 * passengers;
                Row::new(vec![Value::Vector(vec![distance, passengers]), Value::Float(fare)])
            })
            .collect();
        InMemoryDataset::new(schema, rows).unwrap()
    }

    #[test]
    fn test_fits_monotone_target() {
        let data = fares();
        let (model, diagnostics) = FastTree::default().fit(&data, &PipelineConfig::default()).unwrap();
        assert!(diagnostics.final_loss < 2.0);
        assert!(model.predict(&[10.0, 1.0]) > model.predict(&[1.0, 1.0]));
    }

    #[test]
    fn test_constant_features_give_mean() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("Features", DataType::Float),
            Field::new("Label", DataType::Float),
        ]));
        let rows = [1.0, 3.0]
            .iter()
            .map(|&y| Row::new(vec![Value::Float(0.0), Value::Float(y)]))
            .collect();
        let data = InMemoryDataset::new(schema, rows).unwrap();

        let (model, diagnostics) = FastTree::default().fit(&data, &PipelineConfig::default()).unwrap();
        assert!(diagnostics.converged);
        assert!(model.stumps().is_empty());
        assert!((model.predict(&[0.0]) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_wrong_width() {
        let data = fares();
        let (model, _) = FastTree::default().with_number_of_trees(2).fit(&data, &PipelineConfig::default()).unwrap();
        let schema = Schema::new(vec![Field::new("Features", DataType::Vector(3))]);
        let result = model.transform_row(&schema, Row::new(vec![Value::Vector(vec![0.0; 3])]));
        assert!(matches!(result, Err(Error::Schema { .. })));
    }
}
