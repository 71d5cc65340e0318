use ml_fit_core::{Dataset, Result};
use ml_fit_trainers::{PREDICTED_LABEL, PROBABILITY};
use serde::{Deserialize, Serialize};

use super::{for_each_scored, log_loss_term};
use crate::model::Model;

/// Quality of a binary classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryMetrics {
    /// Fraction of rows predicted correctly
    pub accuracy: f64,

    /// Area under the ROC curve; NaN when the test set holds one class only
    pub area_under_roc_curve: f64,

    /// Harmonic mean of positive precision and recall
    pub f1_score: f64,

    /// Fraction of positive predictions that are correct
    pub positive_precision: f64,

    /// Fraction of positive rows predicted positive
    pub positive_recall: f64,

    /// Fraction of negative predictions that are correct
    pub negative_precision: f64,

    /// Fraction of negative rows predicted negative
    pub negative_recall: f64,

    /// Mean negative log-probability of the true class
    pub log_loss: f64,
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Evaluate a binary model against the bool column `label`
pub fn evaluate_binary(model: &Model, data: &dyn Dataset, label: &str) -> Result<BinaryMetrics> {
    let mut scored: Vec<(f32, bool)> = Vec::new();
    let (mut tp, mut fp, mut tn, mut fnn) = (0u64, 0u64, 0u64, 0u64);
    let mut total_loss = 0.0;

    let rows = for_each_scored(model, data, |view| {
        let actual = view.bool(label)?;
        let probability = view.float(PROBABILITY)?;
        let predicted = view.bool(PREDICTED_LABEL)?;

        match (actual, predicted) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (false, false) => tn += 1,
            (true, false) => fnn += 1,
        }
        let p = f64::from(probability);
        total_loss += log_loss_term(if actual { p } else { 1.0 - p });
        scored.push((probability, actual));
        Ok(())
    })?;

    let positive_precision = ratio(tp, tp + fp);
    let positive_recall = ratio(tp, tp + fnn);
    let f1_score = if positive_precision + positive_recall > 0.0 {
        2.0 * positive_precision * positive_recall / (positive_precision + positive_recall)
    } else {
        0.0
    };

    Ok(BinaryMetrics {
        accuracy: ratio(tp + tn, rows as u64),
        area_under_roc_curve: area_under_roc_curve(&mut scored),
        f1_score,
        positive_precision,
        positive_recall,
        negative_precision: ratio(tn, tn + fnn),
        negative_recall: ratio(tn, tn + fp),
        log_loss: total_loss / rows as f64,
    })
}

/// Mann-Whitney rank statistic; tied scores share their average rank
fn area_under_roc_curve(scored: &mut [(f32, bool)]) -> f64 {
    let positives = scored.iter().filter(|(_, label)| *label).count() as f64;
    let negatives = scored.len() as f64 - positives;
    if positives == 0.0 || negatives == 0.0 {
        return f64::NAN;
    }

    scored.sort_by(|a, b| a.0.total_cmp(&b.0));
    let mut positive_rank_sum = 0.0;
    let mut start = 0;
    while start < scored.len() {
        let mut end = start + 1;
        while end < scored.len() && scored[end].0 == scored[start].0 {
            end += 1;
        }
        // Ranks are 1-based; the group covers ranks start+1..=end
        let average_rank = (start + 1 + end) as f64 / 2.0;
        let group_positives = scored[start..end].iter().filter(|(_, label)| *label).count();
        positive_rank_sum += average_rank * group_positives as f64;
        start = end;
    }

    (positive_rank_sum - positives * (positives + 1.0) / 2.0) / (positives * negatives)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auc_perfect_and_inverted() {
        let mut perfect = vec![(0.9, true), (0.8, true), (0.2, false), (0.1, false)];
        assert!((area_under_roc_curve(&mut perfect) - 1.0).abs() < 1e-12);

        let mut inverted = vec![(0.1, true), (0.9, false)];
        assert!(area_under_roc_curve(&mut inverted).abs() < 1e-12);
    }

    #[test]
    fn test_auc_ties_count_half() {
        let mut tied = vec![(0.5, true), (0.5, false)];
        assert!((area_under_roc_curve(&mut tied) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_auc_single_class_is_nan() {
        let mut single = vec![(0.5, true), (0.7, true)];
        assert!(area_under_roc_curve(&mut single).is_nan());
    }
}
