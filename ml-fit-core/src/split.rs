//! Seeded train/test partitioning

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

use crate::dataset::{collect_rows, Dataset, InMemoryDataset};
use crate::error::Result;

/// A dataset partitioned into training and test rows
#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    /// Rows used for fitting
    pub train: InMemoryDataset,

    /// Held-out rows used for evaluation
    pub test: InMemoryDataset,
}

/// Partition `dataset` into train and test sets.
///
/// `test_fraction` is clamped to the open interval `(0, 1)`; the test side
/// receives `round(rows * test_fraction)` rows picked by a shuffle seeded
/// with `seed`. Both sides keep the source row order, so the same seed over
/// the same rows always yields the same partition.
pub fn train_test_split(dataset: &dyn Dataset, test_fraction: f64, seed: u64) -> Result<TrainTestSplit> {
    let fraction = test_fraction.clamp(f64::EPSILON, 1.0 - f64::EPSILON);
    let rows = collect_rows(dataset, 4096)?;
    let total = rows.len();
    let test_count = ((total as f64) * fraction).round() as usize;

    let mut order: Vec<usize> = (0..total).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    order.shuffle(&mut rng);

    let mut in_test = vec![false; total];
    for &index in &order[..test_count] {
        in_test[index] = true;
    }

    let mut train = Vec::with_capacity(total - test_count);
    let mut test = Vec::with_capacity(test_count);
    for (row, is_test) in rows.into_iter().zip(in_test) {
        if is_test {
            test.push(row);
        } else {
            train.push(row);
        }
    }

    debug!(total, train = train.len(), test = test.len(), seed, "Split dataset");

    let schema = dataset.schema();
    Ok(TrainTestSplit {
        train: InMemoryDataset::new_unchecked(schema.clone(), train),
        test: InMemoryDataset::new_unchecked(schema, test),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DataType, Field, Schema};
    use crate::value::{Row, Value};
    use proptest::prelude::*;
    use std::sync::Arc;

    fn numbered(n: usize) -> InMemoryDataset {
        let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int)]));
        let rows = (0..n).map(|i| Row::new(vec![Value::Int(i as i64)])).collect();
        InMemoryDataset::new_unchecked(schema, rows)
    }

    fn ids(data: &InMemoryDataset) -> Vec<i64> {
        data.rows()
            .iter()
            .map(|r| match r.get(0) {
                Some(Value::Int(v)) => *v,
                _ => unreachable!(),
            })
            .collect()
    }

    #[test]
    fn test_fraction_is_clamped() {
        let data = numbered(10);
        let all_test = train_test_split(&data, 5.0, 0).unwrap();
        assert_eq!(all_test.test.rows().len(), 10);
        let none_test = train_test_split(&data, -1.0, 0).unwrap();
        assert_eq!(none_test.test.rows().len(), 0);
    }

    #[test]
    fn test_sides_preserve_order() {
        let split = train_test_split(&numbered(50), 0.3, 7).unwrap();
        let train = ids(&split.train);
        let test = ids(&split.test);
        assert!(train.windows(2).all(|w| w[0] < w[1]));
        assert!(test.windows(2).all(|w| w[0] < w[1]));
    }

    proptest! {
        #[test]
        fn prop_split_is_reproducible(n in 1usize..200, fraction in 0.01f64..0.99, seed in any::<u64>()) {
            let data = numbered(n);
            let a = train_test_split(&data, fraction, seed).unwrap();
            let b = train_test_split(&data, fraction, seed).unwrap();
            prop_assert_eq!(ids(&a.test), ids(&b.test));
            prop_assert_eq!(ids(&a.train), ids(&b.train));
            prop_assert_eq!(a.test.rows().len(), ((n as f64) * fraction).round() as usize);
            prop_assert_eq!(a.test.rows().len() + a.train.rows().len(), n);
        }
    }
}
