//! Reading feature vectors and labels out of datasets and rows

use std::ops::Range;

use ml_fit_core::{for_each_row, DataType, Dataset, Error, Result, Row, Schema, Value};
use rayon::prelude::*;

/// Rows per parallel work unit. Fixed so reductions do not depend on the
/// number of threads.
const CHUNK_ROWS: usize = 256;

/// Training examples gathered from a dataset
#[derive(Debug, Clone, Default)]
pub struct Examples<L> {
    /// Feature vector per example
    pub features: Vec<Vec<f32>>,

    /// Label per example
    pub labels: Vec<L>,

    /// Length of every feature vector
    pub dimension: usize,
}

impl<L> Examples<L> {
    /// Number of examples
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Check if there are no examples
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Resolve a feature column, returning its index and vector length
pub fn feature_column(schema: &Schema, name: &str) -> Result<(usize, usize)> {
    let (index, field) = schema.require(name, |t| t.feature_slots().is_some())?;
    let dimension = field.data_type().feature_slots().unwrap_or(0);
    Ok((index, dimension))
}

/// Read the feature vector of one row. Missing values (NaN) read as zero.
pub fn row_features(row: &Row, index: usize, name: &str) -> Result<Vec<f32>> {
    let mut features = Vec::new();
    let accepted = row
        .get(index)
        .is_some_and(|value| value.extend_features(&mut features));
    if !accepted {
        return Err(Error::schema(name, "value cannot be used as a feature"));
    }
    for value in &mut features {
        if !value.is_finite() {
            *value = 0.0;
        }
    }
    Ok(features)
}

/// Gather features and labels. Rows for which `read_label` returns `None`
/// are left out.
pub fn collect_examples<L, F>(
    data: &dyn Dataset,
    features: &str,
    label: &str,
    batch_size: usize,
    read_label: F,
) -> Result<Examples<L>>
where
    F: Fn(&Value) -> Option<L>,
{
    let schema = data.schema();
    let (feature_index, dimension) = feature_column(&schema, features)?;
    let label_index = schema.index_of(label)?;

    let mut examples = Examples {
        features: Vec::new(),
        labels: Vec::new(),
        dimension,
    };
    for_each_row(data, batch_size, |row| {
        if let Some(label) = row.get(label_index).and_then(&read_label) {
            examples.features.push(row_features(row, feature_index, features)?);
            examples.labels.push(label);
        }
        Ok(())
    })?;

    Ok(examples)
}

/// Gather feature vectors only
pub fn collect_features(data: &dyn Dataset, features: &str, batch_size: usize) -> Result<(Vec<Vec<f32>>, usize)> {
    let schema = data.schema();
    let (index, dimension) = feature_column(&schema, features)?;

    let mut vectors = Vec::with_capacity(data.row_count().unwrap_or(0));
    for_each_row(data, batch_size, |row| {
        vectors.push(row_features(row, index, features)?);
        Ok(())
    })?;
    Ok((vectors, dimension))
}

/// Read a numeric label, treating NaN as missing
pub fn numeric_label(value: &Value) -> Option<f32> {
    value.as_f32().filter(|v| !v.is_nan())
}

/// Resolve a Key label column, returning its index and cardinality
pub fn key_column(schema: &Schema, name: &str) -> Result<(usize, u32)> {
    let (index, field) = schema.require(name, |t| matches!(t, DataType::Key(_)))?;
    match field.data_type() {
        DataType::Key(cardinality) => Ok((index, *cardinality)),
        _ => Err(Error::schema(name, "expected a key column")),
    }
}

/// Sum `width` accumulators over `rows` rows.
///
/// Rows are split into fixed-size chunks that are accumulated in parallel and
/// then added up in chunk order.
pub fn parallel_sum<F>(rows: usize, width: usize, accumulate: F) -> Vec<f64>
where
    F: Fn(Range<usize>, &mut [f64]) + Sync,
{
    let chunks: Vec<Vec<f64>> = (0..rows.div_ceil(CHUNK_ROWS))
        .into_par_iter()
        .map(|chunk| {
            let start = chunk * CHUNK_ROWS;
            let mut partial = vec![0.0; width];
            accumulate(start..(start + CHUNK_ROWS).min(rows), &mut partial);
            partial
        })
        .collect();

    let mut total = vec![0.0; width];
    for partial in chunks {
        for (t, p) in total.iter_mut().zip(partial) {
            *t += p;
        }
    }
    total
}

/// Dot product of a feature vector with weights, plus a trailing bias
pub fn dot_with_bias(features: &[f32], weights: &[f64]) -> f64 {
    let dimension = features.len();
    let dot: f64 = features
        .iter()
        .zip(&weights[..dimension])
        .map(|(&x, &w)| f64::from(x) * w)
        .sum();
    dot + weights[dimension]
}

/// Squared Euclidean distance
pub fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ml_fit_core::{Field, InMemoryDataset};
    use std::sync::Arc;

    #[test]
    fn test_parallel_sum_matches_sequential() {
        let values: Vec<f64> = (0..1000).map(|i| f64::from(i) * 0.1).collect();
        let total = parallel_sum(values.len(), 2, |range, acc| {
            for i in range {
                acc[0] += values[i];
                acc[1] += 1.0;
            }
        });
        let expected: f64 = values.iter().sum();
        assert!((total[0] - expected).abs() < 1e-6);
        assert_eq!(total[1], 1000.0);
    }

    proptest::proptest! {
        #[test]
        fn test_parallel_sum_ignores_thread_count(values in proptest::collection::vec(-1e3f64..1e3, 0..2000)) {
            let sum_with = |threads: usize| {
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .unwrap()
                    .install(|| {
                        parallel_sum(values.len(), 1, |range, acc| {
                            for i in range {
                                acc[0] += values[i];
                            }
                        })
                    })
            };
            // Bitwise equal, not just close
            proptest::prop_assert_eq!(sum_with(1)[0].to_bits(), sum_with(4)[0].to_bits());
        }
    }

    #[test]
    fn test_collect_examples_skips_missing_labels() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("Features", DataType::Vector(2)),
            Field::new("Label", DataType::Float),
        ]));
        let rows = vec![
            Row::new(vec![Value::Vector(vec![1.0, f32::NAN]), Value::Float(2.0)]),
            Row::new(vec![Value::Vector(vec![3.0, 4.0]), Value::Float(f32::NAN)]),
        ];
        let data = InMemoryDataset::new(schema, rows).unwrap();

        let examples = collect_examples(&data, "Features", "Label", 8, numeric_label).unwrap();
        assert_eq!(examples.len(), 1);
        assert_eq!(examples.features[0], vec![1.0, 0.0]);
        assert_eq!(examples.dimension, 2);
    }

    #[test]
    fn test_feature_column_rejects_text() {
        let schema = Schema::new(vec![Field::new("Features", DataType::String)]);
        assert!(feature_column(&schema, "Features").is_err());
    }
}
