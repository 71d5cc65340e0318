//! Multiclass classification by maximum entropy
//!
//! A multinomial logistic regression fit with full-batch gradient descent and
//! L2 regularization. Weights start at zero, so the result depends only on
//! the data and the options.

use std::sync::Arc;

use ml_fit_core::{output_slots, DataType, Dataset, Error, Field, PipelineConfig, Result, Row, RowTransform, Schema, Value};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::features::{collect_examples, feature_column, key_column, parallel_sum, row_features};
use crate::{FitDiagnostics, PREDICTED_LABEL, SCORE};

/// Maximum entropy trainer options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaximumEntropy {
    /// Key column holding the class
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
}

impl Default for MaximumEntropy {
    fn default() -> Self {
        Self {
            label: "Label".to_string(),
            features: "Features".to_string(),
            learning_rate: 0.5,
            l2: 1e-4,
            max_iterations: 200,
            tolerance: 1e-6,
        }
    }
}

impl MaximumEntropy {
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
        let (index, classes) = key_column(input_schema, &self.label)?;
        let values = input_schema.field(index).key_values().map(<[String]>::to_vec);
        Ok(output_schema(input_schema, classes, values))
    }

    /// Fit the class weights
    pub fn fit(&self, data: &dyn Dataset, config: &PipelineConfig) -> Result<(MaximumEntropyModel, FitDiagnostics)> {
        let schema = data.schema();
        let (label_index, classes) = key_column(&schema, &self.label)?;
        let label_values = schema.field(label_index).key_values().map(<[String]>::to_vec);

        let examples = collect_examples(data, &self.features, &self.label, config.batch_size, |value| match value {
            Value::Key(key) if *key > 0 && *key <= classes => Some(*key as usize - 1),
            _ => None,
        })?;
        if examples.is_empty() || classes == 0 {
            return Err(Error::Training(format!(
                "no labeled rows in column {} to train on",
                self.label
            )));
        }

        let k = classes as usize;
        let stride = examples.dimension + 1;
        let width = k * stride;
        let n = examples.len() as f64;
        let mut weights = vec![0.0f64; width];
        let mut diagnostics = FitDiagnostics::new("MaximumEntropy");
        let mut previous_loss = f64::INFINITY;

        for iteration in 1..=self.max_iterations {
            let totals = parallel_sum(examples.len(), width + 1, |range, acc| {
                let mut probabilities = vec![0.0; k];
                for i in range {
                    let x = &examples.features[i];
                    let y = examples.labels[i];
                    softmax_into(&weights, stride, x, &mut probabilities);
                    acc[width] -= probabilities[y].max(1e-15).ln();

                    for (c, &p) in probabilities.iter().enumerate() {
                        let error = p - if c == y { 1.0 } else { 0.0 };
                        let row = &mut acc[c * stride..(c + 1) * stride];
                        for (g, &value) in row.iter_mut().zip(x) {
                            *g += error * f64::from(value);
                        }
                        row[stride - 1] += error;
                    }
                }
            });

            let penalty: f64 = weights
                .iter()
                .enumerate()
                .filter(|(j, _)| j % stride != stride - 1)
                .map(|(_, w)| w * w)
                .sum();
            let loss = totals[width] / n + 0.5 * self.l2 * penalty;

            for (j, w) in weights.iter_mut().enumerate() {
                let mut gradient = totals[j] / n;
                if j % stride != stride - 1 {
                    gradient += self.l2 * *w;
                }
                *w -= self.learning_rate * gradient;
            }

            debug!(iteration, loss, "MaximumEntropy step");
            diagnostics.record(iteration, loss);
            if (previous_loss - loss).abs() < self.tolerance {
                diagnostics.converged = true;
                break;
            }
            previous_loss = loss;
        }

        diagnostics.finish();
        info!(classes = k, rows = examples.len(), iterations = diagnostics.iterations, "Trained MaximumEntropy");

        let model = MaximumEntropyModel {
            features: self.features.clone(),
            classes,
            label_values,
            weights: weights.into_iter().map(|w| w as f32).collect(),
        };
        Ok((model, diagnostics))
    }
}

fn softmax_into(weights: &[f64], stride: usize, x: &[f32], out: &mut [f64]) {
    for (c, score) in out.iter_mut().enumerate() {
        let row = &weights[c * stride..(c + 1) * stride];
        *score = crate::features::dot_with_bias(x, row);
    }
    let max = out.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut sum = 0.0;
    for score in out.iter_mut() {
        *score = (*score - max).exp();
        sum += *score;
    }
    for score in out.iter_mut() {
        *score /= sum;
    }
}

fn output_schema(input_schema: &Schema, classes: u32, values: Option<Vec<String>>) -> Arc<Schema> {
    let predicted = match values {
        Some(values) => Field::key_with_values(PREDICTED_LABEL, values),
        None => Field::new(PREDICTED_LABEL, DataType::Key(classes)),
    };
    let (schema, _) = input_schema.with_field(Field::new(SCORE, DataType::Vector(classes as usize)));
    schema.with_field(predicted).0
}

/// Trained maximum entropy model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaximumEntropyModel {
    features: String,
    classes: u32,
    label_values: Option<Vec<String>>,

    /// Row-major `classes x (dimension + 1)`, bias last in each row
    weights: Vec<f32>,
}

impl MaximumEntropyModel {
    /// Number of classes
    pub fn classes(&self) -> u32 {
        self.classes
    }

    /// Class probabilities for one feature vector
    pub fn probabilities(&self, x: &[f32]) -> Vec<f32> {
        let stride = x.len() + 1;
        let weights: Vec<f64> = self.weights.iter().map(|&w| f64::from(w)).collect();
        let mut out = vec![0.0; self.classes as usize];
        if weights.len() == out.len() * stride {
            softmax_into(&weights, stride, x, &mut out);
        }
        out.into_iter().map(|p| p as f32).collect()
    }
}

impl RowTransform for MaximumEntropyModel {
    fn name(&self) -> &'static str {
        "MaximumEntropy"
    }

    fn output_schema(&self, input_schema: &Schema) -> Result<Arc<Schema>> {
        feature_column(input_schema, &self.features)?;
        Ok(output_schema(input_schema, self.classes, self.label_values.clone()))
    }

    fn transform_row(&self, input_schema: &Schema, mut row: Row) -> Result<Row> {
        let (index, dimension) = feature_column(input_schema, &self.features)?;
        if self.weights.len() != self.classes as usize * (dimension + 1) {
            return Err(Error::schema(
                &self.features,
                format!("model was trained on a different feature width than {}", dimension),
            ));
        }

        let probabilities = self.probabilities(&row_features(&row, index, &self.features)?);
        let best = probabilities
            .iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (c, &p)| if p > best.1 { (c, p) } else { best })
            .0;

        let slots = output_slots(input_schema, &[SCORE, PREDICTED_LABEL]);
        row.put(slots[0], Value::Vector(probabilities))?;
        row.put(slots[1], Value::Key(best as u32 + 1))?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ml_fit_core::InMemoryDataset;

    fn clusters() -> InMemoryDataset {
        let schema = Arc::new(Schema::new(vec![
            Field::new("Features", DataType::Vector(2)),
            Field::key_with_values("Label", vec!["west".into(), "east".into(), "north".into()]),
        ]));
        let mut rows = Vec::new();
        for i in 0..30 {
            let jitter = (i % 5) as f32 * 0.05;
            rows.push(Row::new(vec![Value::Vector(vec![-1.0 + jitter, 0.0]), Value::Key(1)]));
            rows.push(Row::new(vec![Value::Vector(vec![1.0 - jitter, 0.0]), Value::Key(2)]));
            rows.push(Row::new(vec![Value::Vector(vec![0.0, 1.0 + jitter]), Value::Key(3)]));
        }
        rows.push(Row::new(vec![Value::Vector(vec![5.0, 5.0]), Value::Key(0)]));
        InMemoryDataset::new(schema, rows).unwrap()
    }

    #[test]
    fn test_separable_classes() {
        let data = clusters();
        let (model, diagnostics) = MaximumEntropy::default().fit(&data, &PipelineConfig::default()).unwrap();
        assert!(diagnostics.final_loss < 0.5);

        let schema = data.schema();
        let out_schema = model.output_schema(&schema).unwrap();
        assert_eq!(
            out_schema.field_by_name(PREDICTED_LABEL).unwrap().key_values().unwrap()[1],
            "east"
        );

        let row = Row::new(vec![Value::Vector(vec![0.9, 0.0]), Value::Key(0)]);
        let out = model.transform_row(&schema, row).unwrap();
        assert_eq!(out.get(3), Some(&Value::Key(2)));
        match out.get(2) {
            Some(Value::Vector(p)) => assert!((p.iter().sum::<f32>() - 1.0).abs() < 1e-4),
            other => panic!("unexpected score {:?}", other),
        }
    }

    #[test]
    fn test_fit_is_deterministic() {
        let data = clusters();
        let config = PipelineConfig::default();
        let (a, _) = MaximumEntropy::default().with_max_iterations(20).fit(&data, &config).unwrap();
        let (b, _) = MaximumEntropy::default().with_max_iterations(20).fit(&data, &config).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_requires_key_label() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("Features", DataType::Vector(1)),
            Field::new("Label", DataType::String),
        ]));
        let data = InMemoryDataset::new(schema, vec![]).unwrap();
        let result = MaximumEntropy::default().fit(&data, &PipelineConfig::default());
        assert!(matches!(result, Err(Error::Schema { column, .. }) if column == "Label"));
    }
}
