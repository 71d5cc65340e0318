//! Clustering by k-means
//!
//! Centroids are seeded with k-means++ and refined with Lloyd iterations.
//! Cluster ids are 1-based keys so they line up with other key columns.

use std::sync::Arc;

use ml_fit_core::{output_slots, DataType, Dataset, Error, Field, PipelineConfig, Result, Row, RowTransform, Schema, Value};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::features::{collect_features, feature_column, row_features, squared_distance};
use crate::{FitDiagnostics, PREDICTED_LABEL, SCORE};

/// K-means trainer options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KMeans {
    /// Feature column
    pub features: String,

    /// Number of clusters
    pub number_of_clusters: usize,

    /// Maximum number of Lloyd iterations
    pub max_iterations: usize,

    /// Stop once the mean centroid movement falls below this
    pub tolerance: f64,
}

impl Default for KMeans {
    fn default() -> Self {
        Self {
            features: "Features".to_string(),
            number_of_clusters: 3,
            max_iterations: 100,
            tolerance: 1e-6,
        }
    }
}

impl KMeans {
    /// Cluster `features` into `number_of_clusters` groups
    pub fn new(features: &str, number_of_clusters: usize) -> Self {
        Self {
            features: features.to_string(),
            number_of_clusters,
            ..Self::default()
        }
    }

    pub(crate) fn plan_schema(&self, input_schema: &Schema) -> Result<Arc<Schema>> {
        feature_column(input_schema, &self.features)?;
        Ok(output_schema(input_schema, self.number_of_clusters))
    }

    /// Fit the centroids
    pub fn fit(&self, data: &dyn Dataset, config: &PipelineConfig) -> Result<(KMeansModel, FitDiagnostics)> {
        let (vectors, dimension) = collect_features(data, &self.features, config.batch_size)?;
        let k = self.number_of_clusters;
        if k == 0 {
            return Err(Error::InvalidArgument("number_of_clusters must be positive".to_string()));
        }
        if vectors.len() < k {
            return Err(Error::Training(format!(
                "cannot create {} clusters from {} rows",
                k,
                vectors.len()
            )));
        }

        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut centroids = seed_centroids(&vectors, k, &mut rng);
        let mut diagnostics = FitDiagnostics::new("KMeans");

        for iteration in 1..=self.max_iterations {
            let assignments: Vec<(usize, f32)> = vectors.par_iter().map(|v| nearest(&centroids, v)).collect();
            let inertia = assignments.iter().map(|&(_, d)| f64::from(d)).sum::<f64>() / vectors.len() as f64;

            let mut sums = vec![vec![0.0f64; dimension]; k];
            let mut counts = vec![0usize; k];
            for (vector, &(cluster, _)) in vectors.iter().zip(&assignments) {
                counts[cluster] += 1;
                for (s, &x) in sums[cluster].iter_mut().zip(vector) {
                    *s += f64::from(x);
                }
            }

            let mut movement = 0.0f64;
            for (cluster, (sum, &count)) in sums.iter().zip(&counts).enumerate() {
                if count == 0 {
                    continue;
                }
                let updated: Vec<f32> = sum.iter().map(|&s| (s / count as f64) as f32).collect();
                movement += f64::from(squared_distance(&centroids[cluster], &updated)).sqrt();
                centroids[cluster] = updated;
            }
            movement /= k as f64;

            debug!(iteration, inertia, movement, "KMeans iteration");
            diagnostics.record(iteration, inertia);
            if movement < self.tolerance {
                diagnostics.converged = true;
                break;
            }
        }

        diagnostics.finish();
        info!(clusters = k, rows = vectors.len(), iterations = diagnostics.iterations, "Trained KMeans");

        let model = KMeansModel {
            features: self.features.clone(),
            centroids,
        };
        Ok((model, diagnostics))
    }
}

/// k-means++: each further centroid is drawn with probability proportional
/// to its squared distance from the nearest centroid chosen so far
fn seed_centroids(vectors: &[Vec<f32>], k: usize, rng: &mut StdRng) -> Vec<Vec<f32>> {
    let mut centroids = vec![vectors[rng.random_range(0..vectors.len())].clone()];

    while centroids.len() < k {
        let weights: Vec<f32> = vectors.iter().map(|v| nearest(&centroids, v).1).collect();
        let total: f32 = weights.iter().sum();

        let index = if total <= 0.0 {
            rng.random_range(0..vectors.len())
        } else {
            let target = rng.random::<f32>() * total;
            let mut cumulative = 0.0;
            weights
                .iter()
                .position(|&w| {
                    cumulative += w;
                    cumulative >= target && w > 0.0
                })
                .unwrap_or(vectors.len() - 1)
        };
        centroids.push(vectors[index].clone());
    }

    centroids
}

/// Index of the nearest centroid and the squared distance to it
fn nearest(centroids: &[Vec<f32>], vector: &[f32]) -> (usize, f32) {
    centroids
        .iter()
        .enumerate()
        .map(|(i, c)| (i, squared_distance(c, vector)))
        .fold((0, f32::INFINITY), |best, (i, d)| if d < best.1 { (i, d) } else { best })
}

fn output_schema(input_schema: &Schema, k: usize) -> Arc<Schema> {
    let (schema, _) = input_schema.with_field(Field::new(PREDICTED_LABEL, DataType::Key(k as u32)));
    schema.with_field(Field::new(SCORE, DataType::Vector(k))).0
}

/// Trained k-means centroids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KMeansModel {
    features: String,
    centroids: Vec<Vec<f32>>,
}

impl KMeansModel {
    /// Get the centroids; cluster `k` is `centroids()[k - 1]`
    pub fn centroids(&self) -> &[Vec<f32>] {
        &self.centroids
    }

    /// Squared distance from `vector` to every centroid
    pub fn distances(&self, vector: &[f32]) -> Vec<f32> {
        self.centroids.iter().map(|c| squared_distance(c, vector)).collect()
    }
}

impl RowTransform for KMeansModel {
    fn name(&self) -> &'static str {
        "KMeans"
    }

    fn output_schema(&self, input_schema: &Schema) -> Result<Arc<Schema>> {
        feature_column(input_schema, &self.features)?;
        Ok(output_schema(input_schema, self.centroids.len()))
    }

    fn transform_row(&self, input_schema: &Schema, mut row: Row) -> Result<Row> {
        let (index, dimension) = feature_column(input_schema, &self.features)?;
        if self.centroids.first().is_some_and(|c| c.len() != dimension) {
            return Err(Error::schema(
                &self.features,
                format!("model was trained on a different feature width than {}", dimension),
            ));
        }

        let vector = row_features(&row, index, &self.features)?;
        let (cluster, _) = nearest(&self.centroids, &vector);
        let distances = self.distances(&vector);

        let slots = output_slots(input_schema, &[PREDICTED_LABEL, SCORE]);
        row.put(slots[0], Value::Key(cluster as u32 + 1))?;
        row.put(slots[1], Value::Vector(distances))?;
        Ok(row)
    }
}
