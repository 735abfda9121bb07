use serde::{Deserialize, Serialize};

/// Held-out performance of a fitted model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Root mean squared error.
    pub rmse: f64,
    /// Mean absolute error.
    pub mae: f64,
    /// Coefficient of determination.
    pub r2: f64,
    /// Rows scored.
    pub samples: usize,
    /// The observed target had zero variance; `r2` is then 1 for a perfect
    /// fit and 0 otherwise.
    pub constant_target: bool,
}

impl EvaluationResult {
    /// Scores `predicted` against `actual`.
    #[must_use]
    pub fn score(actual: &[f64], predicted: &[f64]) -> Self {
        let mse = mean_squared_error(actual, predicted);
        let (r2, constant_target) = r2_score(actual, predicted);
        Self {
            rmse: mse.sqrt(),
            mae: mean_absolute_error(actual, predicted),
            r2,
            samples: actual.len().min(predicted.len()),
            constant_target,
        }
    }
}

/// Mean of squared residuals; 0 for empty input.
#[must_use]
pub fn mean_squared_error(actual: &[f64], predicted: &[f64]) -> f64 {
    mean(actual.iter().zip(predicted).map(|(a, p)| (a - p).powi(2)))
}

/// Mean of absolute residuals; 0 for empty input.
#[must_use]
pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> f64 {
    mean(actual.iter().zip(predicted).map(|(a, p)| (a - p).abs()))
}

/// `1 - SS_res / SS_tot`, plus whether the target was constant.
#[must_use]
pub fn r2_score(actual: &[f64], predicted: &[f64]) -> (f64, bool) {
    let target_mean = mean(actual.iter().copied());
    let ss_res: f64 = actual.iter().zip(predicted).map(|(a, p)| (a - p).powi(2)).sum();
    let ss_tot: f64 = actual.iter().map(|a| (a - target_mean).powi(2)).sum();
    if ss_tot <= f64::EPSILON {
        let perfect = ss_res <= f64::EPSILON;
        return (if perfect { 1.0 } else { 0.0 }, true);
    }
    (1.0 - ss_res / ss_tot, false)
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0_usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
