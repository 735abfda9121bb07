use indexmap::IndexMap;
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;

use crate::{
    errors::{DataQualityError, PipelineResult, TrainingError},
    models::{HyperParams, Regressor, TrainedModel},
    preprocess::frame::CleanedDataset,
    schema::DATE,
    telemetry::{self, LearningTelemetry},
};

/// Fixed model catalogue and hyper-parameter grids.
pub mod grid;
/// Regression metrics.
pub mod metrics;
/// Human-readable selection summaries.
pub mod reporter;
/// Seeded train/test split and k-fold partitions.
pub mod split;

use grid::{catalogue, ModelCandidate};
use metrics::{mean_squared_error, EvaluationResult};
use split::{k_fold, shuffle_split, Partition, DEFAULT_SEED};

/// Knobs of a selection run. Defaults reproduce the reference behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorSettings {
    /// Fraction of rows held out for the final evaluation.
    pub test_ratio: f64,
    /// Shuffle seed for the train/test split.
    pub seed: u64,
    /// Cross-validation folds.
    pub folds: usize,
    /// Columns never used as features.
    pub excluded: Vec<String>,
    /// Score grid points on the rayon pool.
    pub parallel: bool,
}

impl Default for SelectorSettings {
    fn default() -> Self {
        Self {
            test_ratio: 0.2,
            seed: DEFAULT_SEED,
            folds: 5,
            excluded: vec![DATE.to_owned()],
            parallel: true,
        }
    }
}

/// Grid search result for one family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    /// Best grid point.
    pub params: HyperParams,
    /// Mean cross-validated MSE of `params` (the negated CV score).
    pub cv_mse: f64,
    /// Grid points searched.
    pub grid_size: usize,
    /// Grid points that scored on every fold.
    pub valid_points: usize,
}

/// Winner of a selection run plus every candidate's scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    /// Winning model, refitted on the whole training partition.
    pub model: TrainedModel,
    /// Winner's test-set metrics.
    pub evaluation: EvaluationResult,
    /// Test-set metrics per family label, in catalogue order.
    pub per_candidate: IndexMap<String, EvaluationResult>,
    /// Grid search outcome per family label, in catalogue order.
    pub searches: IndexMap<String, SearchOutcome>,
}

impl Selection {
    /// Winner, its metrics, and the per-family metrics.
    #[must_use]
    pub fn into_parts(self) -> (TrainedModel, EvaluationResult, IndexMap<String, EvaluationResult>) {
        (self.model, self.evaluation, self.per_candidate)
    }

    /// Label of the winning family.
    #[must_use]
    pub fn winner(&self) -> &'static str {
        self.model.family().label()
    }
}

/// Grid-searches every catalogue family and picks the best by test RMSE.
#[derive(Debug, Clone, Default)]
pub struct ModelSelector {
    settings: SelectorSettings,
    telemetry: Option<LearningTelemetry>,
}

struct Candidate {
    model: TrainedModel,
    evaluation: EvaluationResult,
    search: SearchOutcome,
}

impl ModelSelector {
    /// Selector with the given settings.
    #[must_use]
    pub const fn new(settings: SelectorSettings) -> Self {
        Self {
            settings,
            telemetry: None,
        }
    }

    /// Logs every stage through `telemetry`.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: &LearningTelemetry) -> Self {
        self.telemetry = Some(telemetry.scoped("selection"));
        self
    }

    /// Active settings.
    #[must_use]
    pub const fn settings(&self) -> &SelectorSettings {
        &self.settings
    }

    /// Splits, cross-validates every family's grid on the training rows,
    /// refits each family's best point and keeps the lowest test RMSE.
    ///
    /// Ties go to the family declared first in the catalogue.
    pub fn select_best(&self, dataset: &CleanedDataset, target: &str) -> PipelineResult<Selection> {
        let matrix = dataset.feature_matrix(target, &self.settings.excluded)?;
        let rows = matrix.y.len();
        let required = 2 * self.settings.folds.max(2);
        if rows < required {
            return Err(DataQualityError::EmptyDataset { rows, required }.into());
        }

        let Partition { train, test } =
            shuffle_split(rows, self.settings.test_ratio, self.settings.seed);
        let x_train = matrix.x.select(Axis(0), &train);
        let y_train = matrix.y.select(Axis(0), &train);
        let x_test = matrix.x.select(Axis(0), &test);
        let y_test = matrix.y.select(Axis(0), &test);
        if train.len() < self.settings.folds || test.is_empty() {
            return Err(DataQualityError::EmptyDataset { rows, required }.into());
        }
        let folds = k_fold(train.len(), self.settings.folds);
        self.log(
            LogLevel::Info,
            "split_complete",
            json!({
                "target": target,
                "features": &matrix.features,
                "train_rows": train.len(),
                "test_rows": test.len(),
                "folds": folds.len(),
                "seed": self.settings.seed,
            }),
        );

        let mut per_candidate = IndexMap::new();
        let mut searches = IndexMap::new();
        let mut winner: Option<(TrainedModel, EvaluationResult)> = None;

        for candidate in catalogue() {
            let Candidate {
                model,
                evaluation,
                search,
            } = self.evaluate_candidate(
                &candidate,
                target,
                &matrix.features,
                (&x_train, &y_train),
                (&x_test, &y_test),
                &folds,
            )?;
            self.log(
                LogLevel::Info,
                "candidate_evaluated",
                json!({
                    "family": candidate.name(),
                    "params": search.params,
                    "cv_mse": search.cv_mse,
                    "rmse": evaluation.rmse,
                    "mae": evaluation.mae,
                    "r2": evaluation.r2,
                }),
            );
            if evaluation.constant_target {
                self.log(
                    LogLevel::Warn,
                    "constant_test_target",
                    json!({ "family": candidate.name(), "r2": evaluation.r2 }),
                );
            }
            per_candidate.insert(candidate.name().to_owned(), evaluation);
            searches.insert(candidate.name().to_owned(), search);
            let better = winner
                .as_ref()
                .map_or(true, |(_, best)| evaluation.rmse < best.rmse);
            if better {
                winner = Some((model, evaluation));
            }
        }

        let (model, evaluation) = winner.ok_or_else(|| TrainingError::NoValidCombination {
            family: "catalogue".into(),
        })?;
        let payload = json!({
            "winner": model.family().label(),
            "params": model.params(),
            "rmse": evaluation.rmse,
            "r2": evaluation.r2,
        });
        self.log(LogLevel::Info, "winner_selected", payload.clone());
        telemetry::event(self.telemetry.as_ref(), "selection.winner", payload);

        Ok(Selection {
            model,
            evaluation,
            per_candidate,
            searches,
        })
    }

    fn evaluate_candidate(
        &self,
        candidate: &ModelCandidate,
        target: &str,
        features: &[String],
        (x_train, y_train): (&Array2<f64>, &Array1<f64>),
        (x_test, y_test): (&Array2<f64>, &Array1<f64>),
        folds: &[Partition],
    ) -> PipelineResult<Candidate> {
        let search = self.grid_search(candidate, x_train, y_train, folds)?;
        let model = TrainedModel::fit(search.params, target, features.to_vec(), x_train, y_train)?;
        let predictions = model.predict(x_test)?;
        if predictions.iter().any(|v| !v.is_finite()) {
            return Err(TrainingError::NonFinite {
                family: candidate.name().into(),
            }
            .into());
        }
        let evaluation = EvaluationResult::score(&y_test.to_vec(), &predictions.to_vec());
        Ok(Candidate {
            model,
            evaluation,
            search,
        })
    }

    /// Scores every grid point by mean fold MSE and keeps the first minimum.
    fn grid_search(
        &self,
        candidate: &ModelCandidate,
        x: &Array2<f64>,
        y: &Array1<f64>,
        folds: &[Partition],
    ) -> Result<SearchOutcome, TrainingError> {
        let score = |params: &HyperParams| cross_validate(params, x, y, folds);
        let scores: Vec<Option<f64>> = if self.settings.parallel {
            candidate.grid.par_iter().map(score).collect()
        } else {
            candidate.grid.iter().map(score).collect()
        };

        let mut best: Option<(HyperParams, f64)> = None;
        for (params, cv_mse) in candidate.grid.iter().zip(&scores) {
            self.log(
                LogLevel::Debug,
                "grid_point_scored",
                json!({ "family": candidate.name(), "params": params, "cv_mse": cv_mse }),
            );
            if let Some(cv_mse) = *cv_mse {
                if best.map_or(true, |(_, best_mse)| cv_mse < best_mse) {
                    best = Some((*params, cv_mse));
                }
            }
        }

        let (params, cv_mse) = best.ok_or_else(|| TrainingError::NoValidCombination {
            family: candidate.name().into(),
        })?;
        let outcome = SearchOutcome {
            params,
            cv_mse,
            grid_size: candidate.grid.len(),
            valid_points: scores.iter().filter(|s| s.is_some()).count(),
        };
        self.log(
            LogLevel::Info,
            "search_complete",
            json!({
                "family": candidate.name(),
                "best_params": params,
                "best_score": -cv_mse,
                "grid_size": outcome.grid_size,
                "valid_points": outcome.valid_points,
            }),
        );
        Ok(outcome)
    }

    fn log(&self, level: LogLevel, message: &str, metadata: serde_json::Value) {
        telemetry::log(self.telemetry.as_ref(), level, message, metadata);
    }
}

/// Mean validation MSE over `folds`, or `None` when any fold fails to fit or
/// scores non-finite.
fn cross_validate(
    params: &HyperParams,
    x: &Array2<f64>,
    y: &Array1<f64>,
    folds: &[Partition],
) -> Option<f64> {
    let mut total = 0.0;
    for fold in folds {
        let mut estimator = params.estimator();
        estimator
            .fit(&x.select(Axis(0), &fold.train), &y.select(Axis(0), &fold.train))
            .ok()?;
        let predicted = estimator.predict(&x.select(Axis(0), &fold.test)).ok()?;
        let actual = y.select(Axis(0), &fold.test);
        let mse = mean_squared_error(&actual.to_vec(), &predicted.to_vec());
        if !mse.is_finite() {
            return None;
        }
        total += mse;
    }
    Some(total / folds.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        errors::PipelineError,
        models::ModelFamily,
        preprocess::{frame::ColumnData, Preprocessor},
        schema::{synthetic_sales, TOTAL_SALES},
    };

    fn linear_frame(rows: usize) -> CleanedDataset {
        let units: Vec<f64> = (0..rows).map(|i| ((i * 37) % 101) as f64 / 10.0).collect();
        let flags: Vec<bool> = (0..rows).map(|i| i % 3 == 0).collect();
        let total: Vec<f64> = units
            .iter()
            .zip(&flags)
            .map(|(u, &f)| 3.0f64.mul_add(*u, if f { 4.0 } else { 0.0 }) + 2.0)
            .collect();
        let mut frame = CleanedDataset::new();
        frame.push_column("Units_Sold", ColumnData::Numeric(units)).unwrap();
        frame.push_column("Store_B", ColumnData::Flag(flags)).unwrap();
        frame.push_column(TOTAL_SALES, ColumnData::Numeric(total)).unwrap();
        frame
    }

    fn sequential() -> SelectorSettings {
        SelectorSettings {
            parallel: false,
            ..SelectorSettings::default()
        }
    }

    #[test]
    fn exact_linear_data_selects_linear_regression() {
        let selection = ModelSelector::default()
            .select_best(&linear_frame(60), TOTAL_SALES)
            .unwrap();
        assert_eq!(selection.model.family(), ModelFamily::Linear);
        assert!(selection.evaluation.rmse < 1e-6);
        assert!(selection.evaluation.r2 > 0.999_999);
        assert_eq!(selection.per_candidate.len(), 3);
        assert_eq!(
            selection.per_candidate.keys().collect::<Vec<_>>(),
            vec!["Ridge Regression", "Linear Regression", "Decision Tree Regressor"]
        );
        assert_eq!(selection.searches["Ridge Regression"].grid_size, 8);
        assert_eq!(selection.searches["Decision Tree Regressor"].valid_points, 12);
    }

    #[test]
    fn winner_has_minimum_test_rmse() {
        let selection = ModelSelector::default()
            .select_best(&linear_frame(40), TOTAL_SALES)
            .unwrap();
        let min = selection
            .per_candidate
            .values()
            .map(|e| e.rmse)
            .fold(f64::INFINITY, f64::min);
        assert!((selection.evaluation.rmse - min).abs() < f64::EPSILON);
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let frame = linear_frame(50);
        let parallel = ModelSelector::default().select_best(&frame, TOTAL_SALES).unwrap();
        let serial = ModelSelector::new(sequential()).select_best(&frame, TOTAL_SALES).unwrap();
        assert_eq!(parallel, serial);
    }

    #[test]
    fn synthetic_pipeline_is_reproducible() {
        let raw = synthetic_sales(100, 11);
        let (dataset, _) = Preprocessor::new().process(&raw).unwrap();
        let first = ModelSelector::default().select_best(&dataset, TOTAL_SALES).unwrap();
        let second = ModelSelector::default().select_best(&dataset, TOTAL_SALES).unwrap();
        assert_eq!(first, second);
        assert!(first.model.features().iter().all(|f| f != DATE && f != TOTAL_SALES));
        assert!(first.evaluation.samples > 0);
    }

    #[test]
    fn too_few_rows_is_a_data_quality_error() {
        let err = ModelSelector::default()
            .select_best(&linear_frame(6), TOTAL_SALES)
            .unwrap_err();
        assert_eq!(
            err,
            PipelineError::DataQuality(DataQualityError::EmptyDataset { rows: 6, required: 10 })
        );
    }

    #[test]
    fn missing_target_is_a_schema_error() {
        let err = ModelSelector::default()
            .select_best(&linear_frame(20), "Revenue")
            .unwrap_err();
        assert!(matches!(err, PipelineError::Schema(_)));
    }
}
