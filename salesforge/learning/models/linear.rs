use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::{errors::TrainingError, models::Regressor};

/// Least-squares linear model with optional L2 penalty.
///
/// `alpha = 0` is ordinary least squares; `alpha > 0` is ridge regression.
/// The intercept is never penalized: when fitted, inputs and target are
/// centred first and the intercept recovered from the means.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    alpha: f64,
    fit_intercept: bool,
    coefficients: Array1<f64>,
    intercept: f64,
    fitted: bool,
}

impl LinearModel {
    /// Unfitted ordinary least squares.
    #[must_use]
    pub fn ols(fit_intercept: bool) -> Self {
        Self::ridge(0.0, fit_intercept)
    }

    /// Unfitted ridge regression.
    #[must_use]
    pub fn ridge(alpha: f64, fit_intercept: bool) -> Self {
        Self {
            alpha,
            fit_intercept,
            coefficients: Array1::zeros(0),
            intercept: 0.0,
            fitted: false,
        }
    }

    /// Fitted weights, one per feature.
    #[must_use]
    pub const fn coefficients(&self) -> &Array1<f64> {
        &self.coefficients
    }

    /// Fitted intercept (0 when not fitted).
    #[must_use]
    pub const fn intercept(&self) -> f64 {
        self.intercept
    }

    fn label(&self) -> &'static str {
        if self.alpha > 0.0 {
            "Ridge Regression"
        } else {
            "Linear Regression"
        }
    }
}

impl Regressor for LinearModel {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), TrainingError> {
        if x.nrows() != y.len() {
            return Err(TrainingError::ShapeMismatch {
                rows: x.nrows(),
                targets: y.len(),
            });
        }
        if x.nrows() == 0 {
            return Err(TrainingError::EmptyTrainingSet {
                family: self.label().into(),
            });
        }

        let (x_mean, y_mean) = if self.fit_intercept {
            (
                x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols())),
                y.mean().unwrap_or_default(),
            )
        } else {
            (Array1::zeros(x.ncols()), 0.0)
        };
        let xc = x - &x_mean.view().insert_axis(Axis(0));
        let yc = y - y_mean;

        let mut gram = xc.t().dot(&xc);
        for i in 0..gram.nrows() {
            gram[[i, i]] += self.alpha;
        }
        let rhs = xc.t().dot(&yc);
        let coefficients = solve_normal_equations(gram, rhs);

        let intercept = if self.fit_intercept {
            y_mean - coefficients.dot(&x_mean)
        } else {
            0.0
        };
        if !intercept.is_finite() || coefficients.iter().any(|w| !w.is_finite()) {
            return Err(TrainingError::NonFinite {
                family: self.label().into(),
            });
        }
        self.coefficients = coefficients;
        self.intercept = intercept;
        self.fitted = true;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, TrainingError> {
        if !self.fitted {
            return Err(TrainingError::NotFitted {
                family: self.label().into(),
            });
        }
        if self.coefficients.len() != x.ncols() {
            return Err(TrainingError::FeatureWidth {
                family: self.label().into(),
                expected: self.coefficients.len(),
                found: x.ncols(),
            });
        }
        Ok(x.dot(&self.coefficients) + self.intercept)
    }
}

/// Solves the symmetric system `a * w = b` by Gauss-Jordan elimination with
/// partial pivoting.
///
/// Columns without a usable pivot (collinear or all-zero features) get a zero
/// weight, which yields a valid least-squares solution for rank-deficient
/// inputs.
fn solve_normal_equations(mut a: Array2<f64>, mut b: Array1<f64>) -> Array1<f64> {
    let n = a.nrows();
    let scale = a.diag().iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let tolerance = 1e-10 * scale.max(1.0);
    let mut pivots: Vec<(usize, usize)> = Vec::with_capacity(n);
    let mut row = 0;

    for col in 0..n {
        if row == n {
            break;
        }
        let best = (row..n)
            .max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))
            .unwrap_or(row);
        if a[[best, col]].abs() <= tolerance {
            continue;
        }
        if best != row {
            for k in 0..n {
                a.swap([best, k], [row, k]);
            }
            b.swap(best, row);
        }
        let pivot = a[[row, col]];
        for k in 0..n {
            a[[row, k]] /= pivot;
        }
        b[row] /= pivot;
        for other in 0..n {
            if other == row {
                continue;
            }
            let factor = a[[other, col]];
            if factor == 0.0 {
                continue;
            }
            for k in 0..n {
                a[[other, k]] -= factor * a[[row, k]];
            }
            b[other] -= factor * b[row];
        }
        pivots.push((row, col));
        row += 1;
    }

    let mut solution = Array1::zeros(n);
    for (row, col) in pivots {
        solution[col] = b[row];
    }
    solution
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn ols_recovers_exact_relationship() {
        let x = array![[1.0, 2.0], [2.0, 0.5], [3.0, 1.0], [4.0, 3.0], [5.0, 0.0]];
        let y = x.column(0).mapv(|v| 3.0 * v) - x.column(1).mapv(|v| 2.0 * v) + 1.5;
        let mut model = LinearModel::ols(true);
        model.fit(&x, &y).unwrap();
        assert!((model.coefficients()[0] - 3.0).abs() < 1e-9);
        assert!((model.coefficients()[1] + 2.0).abs() < 1e-9);
        assert!((model.intercept() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn without_intercept_line_passes_through_origin() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![2.0, 4.0, 6.0];
        let mut model = LinearModel::ols(false);
        model.fit(&x, &y).unwrap();
        assert!((model.coefficients()[0] - 2.0).abs() < 1e-12);
        assert!(model.intercept().abs() < f64::EPSILON);
    }

    #[test]
    fn ridge_shrinks_weights() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![1.0, 2.0, 3.0, 4.0];
        let mut ols = LinearModel::ols(true);
        let mut ridge = LinearModel::ridge(10.0, true);
        ols.fit(&x, &y).unwrap();
        ridge.fit(&x, &y).unwrap();
        // centred gram is 5, so the ridge weight is 5 / (5 + 10)
        assert!((ridge.coefficients()[0] - 5.0 / 15.0).abs() < 1e-12);
        assert!(ridge.coefficients()[0] < ols.coefficients()[0]);
    }

    #[test]
    fn all_zero_feature_gets_zero_weight() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0]];
        let y = array![1.0, 2.0, 3.0];
        let mut model = LinearModel::ols(true);
        model.fit(&x, &y).unwrap();
        assert!((model.coefficients()[1]).abs() < f64::EPSILON);
        let predictions = model.predict(&array![[4.0, 1.0]]).unwrap();
        assert!((predictions[0] - 4.0).abs() < 1e-9);
    }

    #[test]
    fn shape_mismatch_is_reported() {
        let mut model = LinearModel::ols(true);
        let err = model.fit(&array![[1.0], [2.0]], &array![1.0]).unwrap_err();
        assert_eq!(err, TrainingError::ShapeMismatch { rows: 2, targets: 1 });
    }
}
