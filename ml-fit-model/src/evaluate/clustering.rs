use std::collections::HashMap;

use ml_fit_core::{Dataset, Error, Result};
use ml_fit_trainers::features::squared_distance;
use ml_fit_trainers::{PREDICTED_LABEL, SCORE};
use serde::{Deserialize, Serialize};

use super::for_each_scored;
use crate::model::Model;

/// Quality of a clustering model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringMetrics {
    /// Mean squared distance from each row to its assigned centroid
    pub average_distance: f64,

    /// Davies-Bouldin index over the test-set clusters; lower is better
    pub davies_bouldin_index: f64,

    /// Normalized mutual information against a reference label, if one was given
    pub normalized_mutual_information: Option<f64>,
}

/// Evaluate a clustering model.
///
/// `features` names the vector the clusters were fit on. When `label` names
/// a reference key column, assignments are compared against it.
pub fn evaluate_clustering(
    model: &Model,
    data: &dyn Dataset,
    features: &str,
    label: Option<&str>,
) -> Result<ClusteringMetrics> {
    let mut assigned: Vec<(usize, Vec<f32>)> = Vec::new();
    let mut labels: Vec<u32> = Vec::new();
    let mut total_distance = 0.0;

    let rows = for_each_scored(model, data, |view| {
        let cluster = view.key(PREDICTED_LABEL)? as usize;
        let distances = view.vector(SCORE)?;
        let distance = cluster
            .checked_sub(1)
            .and_then(|c| distances.get(c))
            .ok_or_else(|| Error::schema(PREDICTED_LABEL, "assigned cluster has no distance"))?;
        total_distance += f64::from(*distance);

        assigned.push((cluster, view.vector(features)?.to_vec()));
        if let Some(label) = label {
            labels.push(view.key(label)?);
        }
        Ok(())
    })?;

    let clusters: Vec<usize> = assigned.iter().map(|(c, _)| *c).collect();
    Ok(ClusteringMetrics {
        average_distance: total_distance / rows as f64,
        davies_bouldin_index: davies_bouldin(&assigned),
        normalized_mutual_information: label.map(|_| normalized_mutual_information(&clusters, &labels)),
    })
}

fn davies_bouldin(assigned: &[(usize, Vec<f32>)]) -> f64 {
    let mut members: HashMap<usize, Vec<&[f32]>> = HashMap::new();
    for (cluster, vector) in assigned {
        members.entry(*cluster).or_default().push(vector);
    }
    if members.len() < 2 {
        return 0.0;
    }

    let mut ids: Vec<usize> = members.keys().copied().collect();
    ids.sort_unstable();

    let centroids: Vec<Vec<f32>> = ids
        .iter()
        .map(|id| {
            let vectors = &members[id];
            let dimension = vectors[0].len();
            let mut centroid = vec![0.0f32; dimension];
            for vector in vectors {
                for (c, &x) in centroid.iter_mut().zip(vector.iter()) {
                    *c += x;
                }
            }
            centroid.iter_mut().for_each(|c| *c /= vectors.len() as f32);
            centroid
        })
        .collect();

    let scatter: Vec<f64> = ids
        .iter()
        .zip(&centroids)
        .map(|(id, centroid)| {
            let vectors = &members[id];
            vectors
                .iter()
                .map(|v| f64::from(squared_distance(v, centroid)).sqrt())
                .sum::<f64>()
                / vectors.len() as f64
        })
        .collect();

    let mut total = 0.0;
    for i in 0..ids.len() {
        let mut worst = 0.0f64;
        for j in 0..ids.len() {
            if i == j {
                continue;
            }
            let separation = f64::from(squared_distance(&centroids[i], &centroids[j])).sqrt();
            if separation > 0.0 {
                worst = worst.max((scatter[i] + scatter[j]) / separation);
            }
        }
        total += worst;
    }
    total / ids.len() as f64
}

fn entropy(counts: impl Iterator<Item = usize>, n: f64) -> f64 {
    counts
        .filter(|&c| c > 0)
        .map(|c| {
            let p = c as f64 / n;
            -p * p.ln()
        })
        .sum()
}

/// Mutual information normalized by the geometric mean of both entropies.
///
/// Two single-group partitions agree perfectly (1); a single group against
/// anything else carries no information (0).
fn normalized_mutual_information(clusters: &[usize], labels: &[u32]) -> f64 {
    let n = clusters.len() as f64;
    let mut joint: HashMap<(usize, u32), usize> = HashMap::new();
    let mut by_cluster: HashMap<usize, usize> = HashMap::new();
    let mut by_label: HashMap<u32, usize> = HashMap::new();
    for (&c, &l) in clusters.iter().zip(labels) {
        *joint.entry((c, l)).or_default() += 1;
        *by_cluster.entry(c).or_default() += 1;
        *by_label.entry(l).or_default() += 1;
    }

    let h_clusters = entropy(by_cluster.values().copied(), n);
    let h_labels = entropy(by_label.values().copied(), n);
    if h_clusters == 0.0 && h_labels == 0.0 {
        return 1.0;
    }
    if h_clusters == 0.0 || h_labels == 0.0 {
        return 0.0;
    }

    let mutual: f64 = joint
        .iter()
        .map(|(&(c, l), &count)| {
            let p_joint = count as f64 / n;
            let p_c = by_cluster[&c] as f64 / n;
            let p_l = by_label[&l] as f64 / n;
            p_joint * (p_joint / (p_c * p_l)).ln()
        })
        .sum();
    (mutual / (h_clusters * h_labels).sqrt()).clamp(0.0, 1.0)
}
