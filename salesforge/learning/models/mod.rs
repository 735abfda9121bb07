use std::fmt;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::{
    errors::{PipelineResult, SchemaError, TrainingError},
    preprocess::frame::CleanedDataset,
};

/// Least-squares and ridge regression.
pub mod linear;
/// CART regression tree.
pub mod tree;

pub use linear::LinearModel;
pub use tree::DecisionTreeRegressor;

/// Model families in catalogue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    /// L2-penalized least squares.
    Ridge,
    /// Ordinary least squares.
    Linear,
    /// CART regression tree.
    DecisionTree,
}

impl ModelFamily {
    /// Human-readable family name, used as the key in selection results.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Ridge => "Ridge Regression",
            Self::Linear => "Linear Regression",
            Self::DecisionTree => "Decision Tree Regressor",
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One point of a family's hyper-parameter grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum HyperParams {
    /// Ridge regression.
    Ridge {
        /// L2 penalty strength.
        alpha: f64,
        /// Fit an unpenalized intercept.
        fit_intercept: bool,
    },
    /// Ordinary least squares.
    Linear {
        /// Fit an intercept.
        fit_intercept: bool,
    },
    /// Regression tree.
    DecisionTree {
        /// Maximum tree depth.
        max_depth: usize,
        /// Minimum samples a node needs to be split.
        min_samples_split: usize,
    },
}

impl HyperParams {
    /// Family these parameters belong to.
    #[must_use]
    pub const fn family(&self) -> ModelFamily {
        match self {
            Self::Ridge { .. } => ModelFamily::Ridge,
            Self::Linear { .. } => ModelFamily::Linear,
            Self::DecisionTree { .. } => ModelFamily::DecisionTree,
        }
    }

    /// Unfitted estimator configured with these parameters.
    #[must_use]
    pub fn estimator(&self) -> Estimator {
        match *self {
            Self::Ridge {
                alpha,
                fit_intercept,
            } => Estimator::Linear(LinearModel::ridge(alpha, fit_intercept)),
            Self::Linear { fit_intercept } => Estimator::Linear(LinearModel::ols(fit_intercept)),
            Self::DecisionTree {
                max_depth,
                min_samples_split,
            } => Estimator::Tree(DecisionTreeRegressor::new(Some(max_depth), min_samples_split)),
        }
    }
}

impl fmt::Display for HyperParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ridge {
                alpha,
                fit_intercept,
            } => write!(f, "alpha={alpha}, fit_intercept={fit_intercept}"),
            Self::Linear { fit_intercept } => write!(f, "fit_intercept={fit_intercept}"),
            Self::DecisionTree {
                max_depth,
                min_samples_split,
            } => write!(f, "max_depth={max_depth}, min_samples_split={min_samples_split}"),
        }
    }
}

/// Common fit/predict contract of every estimator.
pub trait Regressor {
    /// Fits on `x` (rows x features) and `y`.
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), TrainingError>;
    /// Predicts one value per row of `x`. Fails when unfitted or when the
    /// width of `x` differs from the training matrix.
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, TrainingError>;
}

/// Closed set of estimators a [`TrainedModel`] can hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Estimator {
    /// Linear or ridge model.
    Linear(LinearModel),
    /// Regression tree.
    Tree(DecisionTreeRegressor),
}

impl Regressor for Estimator {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), TrainingError> {
        match self {
            Self::Linear(model) => model.fit(x, y),
            Self::Tree(model) => model.fit(x, y),
        }
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, TrainingError> {
        match self {
            Self::Linear(model) => model.predict(x),
            Self::Tree(model) => model.predict(x),
        }
    }
}

/// A fitted estimator bound to the feature schema it was trained on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    family: ModelFamily,
    params: HyperParams,
    target: String,
    features: Vec<String>,
    estimator: Estimator,
}

impl TrainedModel {
    /// Fits `params` on `x`/`y` and binds the result to `features`.
    pub fn fit(
        params: HyperParams,
        target: impl Into<String>,
        features: Vec<String>,
        x: &Array2<f64>,
        y: &Array1<f64>,
    ) -> Result<Self, TrainingError> {
        let mut estimator = params.estimator();
        estimator.fit(x, y)?;
        Ok(Self {
            family: params.family(),
            params,
            target: target.into(),
            features,
            estimator,
        })
    }

    /// Model family.
    #[must_use]
    pub const fn family(&self) -> ModelFamily {
        self.family
    }

    /// Hyper-parameters the model was fitted with.
    #[must_use]
    pub const fn params(&self) -> &HyperParams {
        &self.params
    }

    /// Target column name.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Feature columns in matrix order.
    #[must_use]
    pub fn features(&self) -> &[String] {
        &self.features
    }

    /// Underlying estimator.
    #[must_use]
    pub const fn estimator(&self) -> &Estimator {
        &self.estimator
    }

    /// Predicts for a matrix whose columns follow [`Self::features`].
    pub fn predict(&self, x: &Array2<f64>) -> PipelineResult<Array1<f64>> {
        if x.ncols() != self.features.len() {
            return Err(SchemaError::FeatureMismatch {
                expected: self.features.len(),
                found: x.ncols(),
            }
            .into());
        }
        Ok(self.estimator.predict(x)?)
    }

    /// Predicts for a cleaned frame, selecting the bound feature columns by name.
    pub fn predict_dataset(&self, dataset: &CleanedDataset) -> PipelineResult<Array1<f64>> {
        let x = dataset.select_matrix(&self.features)?;
        let predictions = self.predict(&x)?;
        if predictions.iter().any(|v| !v.is_finite()) {
            return Err(TrainingError::NonFinite {
                family: self.family.label().into(),
            }
            .into());
        }
        Ok(predictions)
    }
}
