use thiserror::Error;

use crate::schema::ColumnKind;

/// Result alias used by the preprocessing and selection components.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Missing or wrongly typed columns.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// A required column is absent.
    #[error("missing required column `{0}`")]
    MissingRequiredColumn(String),
    /// A column has the wrong storage type for its use.
    #[error("column `{column}` is {found}, expected {expected}")]
    WrongColumnType {
        /// Column name.
        column: String,
        /// Type required by the caller.
        expected: ColumnKind,
        /// Type actually stored.
        found: ColumnKind,
    },
    /// A column's length disagrees with the frame's row count.
    #[error("column `{column}` has {found} rows, frame has {expected}")]
    ColumnLength {
        /// Column name.
        column: String,
        /// Rows in the frame.
        expected: usize,
        /// Rows in the column.
        found: usize,
    },
    /// A column name is used twice.
    #[error("duplicate column `{0}`")]
    DuplicateColumn(String),
    /// Nothing left to learn from after removing target and exclusions.
    #[error("no feature columns remain besides target `{0}`")]
    NoFeatureColumns(String),
    /// Input matrix width differs from the model's feature schema.
    #[error("model expects {expected} features, input has {found}")]
    FeatureMismatch {
        /// Features bound at training time.
        expected: usize,
        /// Columns supplied.
        found: usize,
    },
}

/// Data that is well-typed but unusable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataQualityError {
    /// Zero standard deviation; z-scoring would divide by zero.
    #[error("column `{column}` is constant (value {value}); cannot normalize")]
    DegenerateColumn {
        /// Column name.
        column: String,
        /// The constant value.
        value: f64,
    },
    /// No parseable value to fit a fill value from.
    #[error("column `{0}` has no numeric values to compute a median from")]
    EmptyColumn(String),
    /// Too few rows for the requested operation.
    #[error("dataset has {rows} rows, at least {required} required")]
    EmptyDataset {
        /// Rows available.
        rows: usize,
        /// Rows required.
        required: usize,
    },
}

/// Failures while fitting or scoring candidate models.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrainingError {
    /// Feature rows and target length disagree.
    #[error("feature matrix has {rows} rows but target has {targets}")]
    ShapeMismatch {
        /// Feature rows.
        rows: usize,
        /// Target values.
        targets: usize,
    },
    /// Fit called without data.
    #[error("cannot fit {family} on an empty training set")]
    EmptyTrainingSet {
        /// Model family label.
        family: String,
    },
    /// The fitted model produced NaN or infinite values.
    #[error("{family} produced non-finite values")]
    NonFinite {
        /// Model family label.
        family: String,
    },
    /// Predict called before a successful fit.
    #[error("{family} has not been fitted")]
    NotFitted {
        /// Model family label.
        family: String,
    },
    /// Prediction input width differs from the width seen at fit time.
    #[error("{family} was fitted on {expected} features but got {found}")]
    FeatureWidth {
        /// Model family label.
        family: String,
        /// Features seen during fit.
        expected: usize,
        /// Columns in the prediction input.
        found: usize,
    },
    /// Every grid point failed cross-validation.
    #[error("grid search for {family} produced no valid hyper-parameter combination")]
    NoValidCombination {
        /// Model family label.
        family: String,
    },
}

/// Any error surfaced by the preprocessing or selection components.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// Schema violation.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// Unusable data.
    #[error(transparent)]
    DataQuality(#[from] DataQualityError),
    /// Model fitting failure.
    #[error(transparent)]
    Training(#[from] TrainingError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_convert_into_pipeline_error() {
        fn fails() -> PipelineResult<()> {
            Err(DataQualityError::EmptyDataset { rows: 3, required: 10 }.into())
        }
        let err = fails().unwrap_err();
        assert!(matches!(err, PipelineError::DataQuality(_)));
        assert_eq!(err.to_string(), "dataset has 3 rows, at least 10 required");
    }

    #[test]
    fn wrong_type_message_names_both_kinds() {
        let err = SchemaError::WrongColumnType {
            column: "Date".into(),
            expected: ColumnKind::Numeric,
            found: ColumnKind::Date,
        };
        assert_eq!(err.to_string(), "column `Date` is date, expected numeric");
    }
}
