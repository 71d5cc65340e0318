//! Binary classification by logistic regression

use std::sync::Arc;

use ml_fit_core::{output_slots, DataType, Dataset, Error, Field, PipelineConfig, Result, Row, RowTransform, Schema, Value};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::features::{collect_examples, dot_with_bias, feature_column, parallel_sum, row_features};
use crate::{FitDiagnostics, PREDICTED_LABEL, PROBABILITY, SCORE};

/// Logistic regression trainer options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Bool column holding the class
    pub label: String,

    /// Feature column
    pub features: String,

    /// Gradient step size
    pub learning_rate: f64,

    /// L2 regularization strength
    pub l2: f64,

    /// Maximum number of gradient steps
    pub max_iterations: usize,

    /// Stop once the loss improves by less than this
    pub tolerance: f64,

    /// Probability at or above which the prediction is positive
    pub threshold: f32,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self {
            label: "Label".to_string(),
            features: "Features".to_string(),
            learning_rate: 1.0,
            l2: 1e-4,
            max_iterations: 200,
            tolerance: 1e-6,
            threshold: 0.5,
        }
    }
}

impl LogisticRegression {
    /// Train on `label` and `features`
    pub fn new(label: &str, features: &str) -> Self {
        Self {
            label: label.to_string(),
            features: features.to_string(),
            ..Self::default()
        }
    }

    /// Set the maximum number of iterations
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub(crate) fn plan_schema(&self, input_schema: &Schema) -> Result<Arc<Schema>> {
        feature_column(input_schema, &self.features)?;
        input_schema.require(&self.label, |t| *t == DataType::Bool)?;
        Ok(output_schema(input_schema))
    }

    /// Fit the weights
    pub fn fit(&self, data: &dyn Dataset, config: &PipelineConfig) -> Result<(LogisticRegressionModel, FitDiagnostics)> {
        data.schema().require(&self.label, |t| *t == DataType::Bool)?;
        let examples = collect_examples(data, &self.features, &self.label, config.batch_size, |value| match value {
            Value::Bool(b) => Some(*b),
            _ => None,
        })?;
        if examples.is_empty() {
            return Err(Error::Training(format!("no labeled rows in column {} to train on", self.label)));
        }

        let dimension = examples.dimension;
        let n = examples.len() as f64;
        let mut weights = vec![0.0f64; dimension + 1];
        let mut diagnostics = FitDiagnostics::new("LogisticRegression");
        let mut previous_loss = f64::INFINITY;

        for iteration in 1..=self.max_iterations {
            let totals = parallel_sum(examples.len(), dimension + 2, |range, acc| {
                for i in range {
                    let x = &examples.features[i];
                    let y = if examples.labels[i] { 1.0 } else { 0.0 };
                    let p = sigmoid(dot_with_bias(x, &weights));
                    acc[dimension + 1] -= if examples.labels[i] { p.max(1e-15).ln() } else { (1.0 - p).max(1e-15).ln() };

                    let error = p - y;
                    for (g, &value) in acc[..dimension].iter_mut().zip(x) {
                        *g += error * f64::from(value);
                    }
                    acc[dimension] += error;
                }
            });

            let penalty: f64 = weights[..dimension].iter().map(|w| w * w).sum();
            let loss = totals[dimension + 1] / n + 0.5 * self.l2 * penalty;

            for (j, w) in weights.iter_mut().enumerate() {
                let mut gradient = totals[j] / n;
                if j < dimension {
                    gradient += self.l2 * *w;
                }
                *w -= self.learning_rate * gradient;
            }

            debug!(iteration, loss, "LogisticRegression step");
            diagnostics.record(iteration, loss);
            if (previous_loss - loss).abs() < self.tolerance {
                diagnostics.converged = true;
                break;
            }
            previous_loss = loss;
        }

        diagnostics.finish();
        info!(rows = examples.len(), iterations = diagnostics.iterations, "Trained LogisticRegression");

        let model = LogisticRegressionModel {
            features: self.features.clone(),
            threshold: self.threshold,
            weights: weights.into_iter().map(|w| w as f32).collect(),
        };
        Ok((model, diagnostics))
    }
}

fn sigmoid(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}

fn output_schema(input_schema: &Schema) -> Arc<Schema> {
    let (schema, _) = input_schema.with_field(Field::new(SCORE, DataType::Float));
    let (schema, _) = schema.with_field(Field::new(PROBABILITY, DataType::Float));
    schema.with_field(Field::new(PREDICTED_LABEL, DataType::Bool)).0
}

/// Trained logistic regression model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegressionModel {
    features: String,
    threshold: f32,

    /// Feature weights followed by the bias
    weights: Vec<f32>,
}

impl LogisticRegressionModel {
    /// Raw margin for one feature vector
    pub fn margin(&self, x: &[f32]) -> f32 {
        let dimension = self.weights.len() - 1;
        let dot: f32 = x.iter().zip(&self.weights[..dimension]).map(|(a, b)| a * b).sum();
        dot + self.weights[dimension]
    }
}

impl RowTransform for LogisticRegressionModel {
    fn name(&self) -> &'static str {
        "LogisticRegression"
    }

    fn output_schema(&self, input_schema: &Schema) -> Result<Arc<Schema>> {
        feature_column(input_schema, &self.features)?;
        Ok(output_schema(input_schema))
    }

    fn transform_row(&self, input_schema: &Schema, mut row: Row) -> Result<Row> {
        let (index, dimension) = feature_column(input_schema, &self.features)?;
        if dimension + 1 != self.weights.len() {
            return Err(Error::schema(
                &self.features,
                format!("model was trained on a different feature width than {}", dimension),
            ));
        }

        let margin = self.margin(&row_features(&row, index, &self.features)?);
        let probability = sigmoid(f64::from(margin)) as f32;

        let slots = output_slots(input_schema, &[SCORE, PROBABILITY, PREDICTED_LABEL]);
        row.put(slots[0], Value::Float(margin))?;
        row.put(slots[1], Value::Float(probability))?;
        row.put(slots[2], Value::Bool(probability >= self.threshold))?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ml_fit_core::InMemoryDataset;
    use test_case::test_case;

    fn data() -> InMemoryDataset {
        let schema = Arc::new(Schema::new(vec![
            Field::new("Features", DataType::Vector(2)),
            Field::new("Label", DataType::Bool),
        ]));
        let rows = (0..40)
            .map(|i| {
                let positive = i % 2 == 0;
                let x = if positive { 1.0 } else { -1.0 } + (i % 7) as f32 * 0.01;
                Row::new(vec![Value::Vector(vec![x, 0.5]), Value::Bool(positive)])
            })
            .collect();
        InMemoryDataset::new(schema, rows).unwrap()
    }

    #[test_case(vec![1.2, 0.5], true ; "positive side")]
    #[test_case(vec![-1.2, 0.5], false ; "negative side")]
    fn test_predicts_side(features: Vec<f32>, expected: bool) {
        let data = data();
        let (model, _) = LogisticRegression::default().fit(&data, &PipelineConfig::default()).unwrap();
        let out = model
            .transform_row(&data.schema(), Row::new(vec![Value::Vector(features), Value::Bool(false)]))
            .unwrap();

        assert_eq!(out.get(4), Some(&Value::Bool(expected)));
        match out.get(3) {
            Some(Value::Float(p)) => assert_eq!(*p >= 0.5, expected),
            other => panic!("unexpected probability {:?}", other),
        }
    }

    #[test]
    fn test_iteration_cap_reports_diagnostics() {
        let (_, diagnostics) = LogisticRegression::default()
            .with_max_iterations(3)
            .fit(&data(), &PipelineConfig::default())
            .unwrap();
        assert_eq!(diagnostics.iterations, 3);
        assert!(!diagnostics.converged);
    }
}
