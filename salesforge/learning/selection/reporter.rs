use serde::{Deserialize, Serialize};

use crate::{
    models::HyperParams,
    selection::{metrics::EvaluationResult, Selection},
};

/// One family's line in a [`SelectionReport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyReport {
    /// Family label.
    pub family: String,
    /// Best grid point.
    pub params: HyperParams,
    /// Best cross-validated score (negated MSE).
    pub cv_score: f64,
    /// Test-set metrics of the refitted model.
    pub evaluation: EvaluationResult,
    /// Whether this family won.
    pub winner: bool,
}

/// Serializable summary of a selection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionReport {
    /// Target column.
    pub target: String,
    /// Feature columns of the winning model.
    pub features: Vec<String>,
    /// Winning family label.
    pub winner: String,
    /// Per-family results in catalogue order.
    pub families: Vec<FamilyReport>,
}

impl SelectionReport {
    /// Builds the report for `selection`.
    #[must_use]
    pub fn from_selection(selection: &Selection) -> Self {
        let winner = selection.winner();
        let families = selection
            .searches
            .iter()
            .filter_map(|(family, search)| {
                selection.per_candidate.get(family).map(|evaluation| FamilyReport {
                    family: family.clone(),
                    params: search.params,
                    cv_score: -search.cv_mse,
                    evaluation: *evaluation,
                    winner: family == winner,
                })
            })
            .collect();
        Self {
            target: selection.model.target().to_owned(),
            features: selection.model.features().to_vec(),
            winner: winner.to_owned(),
            families,
        }
    }

    /// One line per family, then the winner.
    #[must_use]
    pub fn summary(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .families
            .iter()
            .map(|f| {
                format!(
                    "[selection] {} params=({}) cv_score={:.4} rmse={:.4} mae={:.4} r2={:.4}",
                    f.family, f.params, f.cv_score, f.evaluation.rmse, f.evaluation.mae, f.evaluation.r2
                )
            })
            .collect();
        lines.push(format!("[selection] best model: {}", self.winner));
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        preprocess::Preprocessor,
        schema::{synthetic_sales, TOTAL_SALES},
        selection::ModelSelector,
    };

    #[test]
    fn report_marks_exactly_one_winner() {
        let (dataset, _) = Preprocessor::new().process(&synthetic_sales(80, 5)).unwrap();
        let selection = ModelSelector::default().select_best(&dataset, TOTAL_SALES).unwrap();
        let report = SelectionReport::from_selection(&selection);
        assert_eq!(report.families.len(), 3);
        assert_eq!(report.families.iter().filter(|f| f.winner).count(), 1);
        assert_eq!(report.target, TOTAL_SALES);

        let summary = report.summary();
        assert_eq!(summary.len(), 4);
        assert!(summary[0].starts_with("[selection] Ridge Regression"));
        assert!(summary[3].ends_with(selection.winner()));
    }
}
