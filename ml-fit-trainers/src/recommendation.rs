//! Recommendation by matrix factorization
//!
//! Ratings are modeled as a global mean plus a bias per row entity and per
//! column entity plus the dot product of their latent factors. Parameters are
//! learned by stochastic gradient descent over a seeded shuffle of the
//! training pairs, so the same seed and data reproduce the same model.

use std::sync::Arc;

use ml_fit_core::{output_slots, DataType, Dataset, Error, Field, PipelineConfig, Result, Row, RowTransform, Schema, Value};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::features::{key_column, numeric_label, parallel_sum};
use crate::{FitDiagnostics, SCORE};

/// Matrix factorization trainer options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixFactorization {
    /// Key column identifying the row entity (e.g. user)
    pub row_column: String,

    /// Key column identifying the column entity (e.g. movie)
    pub column_column: String,

    /// Numeric rating column
    pub label: String,

    /// Number of latent factors
    pub rank: usize,

    /// Number of passes over the training pairs
    pub iterations: usize,

    /// SGD step size
    pub learning_rate: f32,

    /// L2 regularization on biases and factors
    pub lambda: f32,

    /// Stop once the training RMSE improves by less than this
    pub tolerance: f64,
}

impl Default for MatrixFactorization {
    fn default() -> Self {
        Self {
            row_column: "userIdEncoded".to_string(),
            column_column: "movieIdEncoded".to_string(),
            label: "Label".to_string(),
            rank: 8,
            iterations: 20,
            learning_rate: 0.05,
            lambda: 0.02,
            tolerance: 1e-5,
        }
    }
}

impl MatrixFactorization {
    /// Factorize ratings in `label` indexed by two key columns
    pub fn new(row_column: &str, column_column: &str, label: &str) -> Self {
        Self {
            row_column: row_column.to_string(),
            column_column: column_column.to_string(),
            label: label.to_string(),
            ..Self::default()
        }
    }

    /// Set the number of latent factors
    pub fn with_rank(mut self, rank: usize) -> Self {
        self.rank = rank;
        self
    }

    /// Set the number of passes over the data
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub(crate) fn plan_schema(&self, input_schema: &Schema) -> Result<Arc<Schema>> {
        key_column(input_schema, &self.row_column)?;
        key_column(input_schema, &self.column_column)?;
        input_schema.require(&self.label, DataType::is_numeric)?;
        Ok(input_schema.with_field(Field::new(SCORE, DataType::Float)).0)
    }

    /// Learn biases and latent factors
    pub fn fit(&self, data: &dyn Dataset, config: &PipelineConfig) -> Result<(MatrixFactorizationModel, FitDiagnostics)> {
        let schema = data.schema();
        let (row_index, rows) = key_column(&schema, &self.row_column)?;
        let (column_index, columns) = key_column(&schema, &self.column_column)?;
        let (label_index, _) = schema.require(&self.label, DataType::is_numeric)?;

        let mut ratings: Vec<(usize, usize, f32)> = Vec::new();
        ml_fit_core::for_each_row(data, config.batch_size, |row| {
            // keys outside the schema cardinality are unseen
            let entity = |index, cardinality: u32| match row.get(index) {
                Some(Value::Key(key)) if *key > 0 && *key <= cardinality => Some(*key as usize - 1),
                _ => None,
            };
            let rating = row.get(label_index).and_then(numeric_label);
            if let (Some(u), Some(i), Some(r)) = (entity(row_index, rows), entity(column_index, columns), rating) {
                ratings.push((u, i, r));
            }
            Ok(())
        })?;
        if ratings.is_empty() {
            return Err(Error::Training("no rated pairs to factorize".to_string()));
        }

        let rank = self.rank.max(1);
        let mut rng = StdRng::seed_from_u64(config.seed);
        let scale = 0.1 / (rank as f32).sqrt();
        let mut init = |count: usize| -> Vec<f32> { (0..count * rank).map(|_| rng.random::<f32>() * scale).collect() };

        let mut model = MatrixFactorizationModel {
            row_column: self.row_column.clone(),
            column_column: self.column_column.clone(),
            rank,
            global_mean: (ratings.iter().map(|&(_, _, r)| f64::from(r)).sum::<f64>() / ratings.len() as f64) as f32,
            row_bias: vec![0.0; rows as usize],
            column_bias: vec![0.0; columns as usize],
            row_factors: init(rows as usize),
            column_factors: init(columns as usize),
        };

        let mut order: Vec<usize> = (0..ratings.len()).collect();
        let mut diagnostics = FitDiagnostics::new("MatrixFactorization");
        let mut previous_loss = f64::INFINITY;
        let (lr, lambda) = (self.learning_rate, self.lambda);

        for epoch in 1..=self.iterations {
            order.shuffle(&mut rng);
            for &n in &order {
                let (u, i, r) = ratings[n];
                let error = r - model.predict_known(u, i);

                model.row_bias[u] += lr * (error - lambda * model.row_bias[u]);
                model.column_bias[i] += lr * (error - lambda * model.column_bias[i]);

                let p = &mut model.row_factors[u * rank..(u + 1) * rank];
                let q = &mut model.column_factors[i * rank..(i + 1) * rank];
                for (pf, qf) in p.iter_mut().zip(q.iter_mut()) {
                    let (old_p, old_q) = (*pf, *qf);
                    *pf += lr * (error * old_q - lambda * old_p);
                    *qf += lr * (error * old_p - lambda * old_q);
                }
            }

            let squared = parallel_sum(ratings.len(), 1, |range, acc| {
                for &(u, i, r) in &ratings[range] {
                    acc[0] += f64::from(r - model.predict_known(u, i)).powi(2);
                }
            });
            let loss = (squared[0] / ratings.len() as f64).sqrt();
            debug!(epoch, rmse = loss, "MatrixFactorization epoch");
            diagnostics.record(epoch, loss);
            if (previous_loss - loss).abs() < self.tolerance {
                diagnostics.converged = true;
                break;
            }
            previous_loss = loss;
        }

        diagnostics.finish();
        info!(rows, columns, ratings = ratings.len(), rank, "Trained MatrixFactorization");
        Ok((model, diagnostics))
    }
}

/// Trained biased matrix factorization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixFactorizationModel {
    row_column: String,
    column_column: String,
    rank: usize,
    global_mean: f32,
    row_bias: Vec<f32>,
    column_bias: Vec<f32>,
    row_factors: Vec<f32>,
    column_factors: Vec<f32>,
}

impl MatrixFactorizationModel {
    fn predict_known(&self, u: usize, i: usize) -> f32 {
        let p = &self.row_factors[u * self.rank..(u + 1) * self.rank];
        let q = &self.column_factors[i * self.rank..(i + 1) * self.rank];
        let dot: f32 = p.iter().zip(q).map(|(a, b)| a * b).sum();
        self.global_mean + self.row_bias[u] + self.column_bias[i] + dot
    }

    /// Predict the rating of a pair of keys.
    ///
    /// Key `0` or a key beyond the training vocabulary is unseen and
    /// contributes neither a bias nor factors.
    pub fn predict(&self, row_key: u32, column_key: u32) -> f32 {
        let u = (row_key as usize).checked_sub(1).filter(|&u| u < self.row_bias.len());
        let i = (column_key as usize).checked_sub(1).filter(|&i| i < self.column_bias.len());
        match (u, i) {
            (Some(u), Some(i)) => self.predict_known(u, i),
            (Some(u), None) => self.global_mean + self.row_bias[u],
            (None, Some(i)) => self.global_mean + self.column_bias[i],
            (None, None) => self.global_mean,
        }
    }

    /// Mean rating seen during training
    pub fn global_mean(&self) -> f32 {
        self.global_mean
    }
}

fn read_key(schema: &Schema, row: &Row, name: &str) -> Result<u32> {
    key_column(schema, name)?;
    match row.get(schema.index_of(name)?) {
        Some(Value::Key(key)) => Ok(*key),
        other => Err(Error::schema(name, format!("expected key value, found {:?}", other))),
    }
}

impl RowTransform for MatrixFactorizationModel {
    fn name(&self) -> &'static str {
        "MatrixFactorization"
    }

    fn output_schema(&self, input_schema: &Schema) -> Result<Arc<Schema>> {
        key_column(input_schema, &self.row_column)?;
        key_column(input_schema, &self.column_column)?;
        Ok(input_schema.with_field(Field::new(SCORE, DataType::Float)).0)
    }

    fn transform_row(&self, input_schema: &Schema, mut row: Row) -> Result<Row> {
        let u = read_key(input_schema, &row, &self.row_column)?;
        let i = read_key(input_schema, &row, &self.column_column)?;
        let slot = output_slots(input_schema, &[SCORE])[0];
        row.put(slot, Value::Float(self.predict(u, i)))?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ml_fit_core::InMemoryDataset;

    fn ratings() -> InMemoryDataset {
        let schema = Arc::new(Schema::new(vec![
            Field::new("userIdEncoded", DataType::Key(8)),
            Field::new("movieIdEncoded", DataType::Key(12)),
            Field::new("Label", DataType::Float),
        ]));
        let mut rows = Vec::new();
        for _ in 0..20 {
            rows.push(Row::new(vec![Value::Key(6), Value::Key(10), Value::Float(4.0)]));
        }
        for u in 1..=4 {
            for i in 1..=4 {
                rows.push(Row::new(vec![Value::Key(u), Value::Key(i), Value::Float(1.0)]));
            }
        }
        InMemoryDataset::new(schema, rows).unwrap()
    }

    #[test]
    fn test_seen_pair_beats_cold_pair() {
        let (model, _) = MatrixFactorization::default().fit(&ratings(), &PipelineConfig::default()).unwrap();
        let seen = model.predict(6, 10);
        let cold = model.predict(0, 0);
        assert!((seen - 4.0).abs() < 0.5, "seen pair scored {}", seen);
        assert!((seen - 4.0).abs() < (cold - 4.0).abs());
        assert!((cold - model.global_mean()).abs() < f32::EPSILON);
    }

    #[test]
    fn test_same_seed_same_model() {
        let config = PipelineConfig::with_seed(3);
        let trainer = MatrixFactorization::default().with_iterations(5);
        let (a, _) = trainer.fit(&ratings(), &config).unwrap();
        let (b, _) = trainer.fit(&ratings(), &config).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_out_of_range_key_is_cold() {
        let (model, _) = MatrixFactorization::default().fit(&ratings(), &PipelineConfig::default()).unwrap();
        assert_eq!(model.predict(99, 99), model.global_mean());
    }

    #[test]
    fn test_fit_skips_keys_beyond_cardinality() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("u", DataType::Key(2)),
            Field::new("m", DataType::Key(2)),
            Field::new("r", DataType::Float),
        ]));
        let rows = vec![
            Row::new(vec![Value::Key(5), Value::Key(1), Value::Float(4.0)]),
            Row::new(vec![Value::Key(1), Value::Key(7), Value::Float(4.0)]),
            Row::new(vec![Value::Key(1), Value::Key(2), Value::Float(3.0)]),
        ];
        let data = InMemoryDataset::new_unchecked(schema, rows);
        let (model, _) = MatrixFactorization::new("u", "m", "r").fit(&data, &PipelineConfig::default()).unwrap();
        assert_eq!(model.global_mean(), 3.0);

        let only_invalid = InMemoryDataset::new_unchecked(
            data.schema(),
            vec![Row::new(vec![Value::Key(5), Value::Key(1), Value::Float(4.0)])],
        );
        let result = MatrixFactorization::new("u", "m", "r").fit(&only_invalid, &PipelineConfig::default());
        assert!(matches!(result, Err(Error::Training(_))));
    }
}
