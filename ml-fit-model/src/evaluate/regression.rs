use ml_fit_core::{Dataset, Error, Result};
use ml_fit_trainers::SCORE;
use serde::{Deserialize, Serialize};

use super::for_each_scored;
use crate::model::Model;

/// Quality of a regression model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    /// Root mean squared error
    pub root_mean_squared_error: f64,

    /// Mean squared error
    pub mean_squared_error: f64,

    /// Mean absolute error
    pub mean_absolute_error: f64,

    /// Coefficient of determination, `1 - SS_res / SS_tot`
    pub r_squared: f64,
}

/// Evaluate a regression model against the numeric column `label`.
///
/// When every label is equal, R² is 1 for a perfect fit and 0 otherwise.
pub fn evaluate_regression(model: &Model, data: &dyn Dataset, label: &str) -> Result<RegressionMetrics> {
    let mut pairs: Vec<(f64, f64)> = Vec::new();

    for_each_scored(model, data, |view| {
        let actual = view
            .get(label)?
            .as_f32()
            .ok_or_else(|| Error::schema(label, "expected a numeric label"))?;
        let predicted = view.float(SCORE)?;
        if !actual.is_nan() {
            pairs.push((f64::from(actual), f64::from(predicted)));
        }
        Ok(())
    })?;

    if pairs.is_empty() {
        return Err(Error::InvalidArgument(format!("no rows with a known {} to evaluate", label)));
    }

    let n = pairs.len() as f64;
    let mean = pairs.iter().map(|(y, _)| y).sum::<f64>() / n;
    let ss_res: f64 = pairs.iter().map(|(y, p)| (y - p).powi(2)).sum();
    let ss_tot: f64 = pairs.iter().map(|(y, _)| (y - mean).powi(2)).sum();
    let mae = pairs.iter().map(|(y, p)| (y - p).abs()).sum::<f64>() / n;

    let r_squared = if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else if ss_res == 0.0 {
        1.0
    } else {
        0.0
    };

    Ok(RegressionMetrics {
        root_mean_squared_error: (ss_res / n).sqrt(),
        mean_squared_error: ss_res / n,
        mean_absolute_error: mae,
        r_squared,
    })
}
