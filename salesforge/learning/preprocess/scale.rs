use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    errors::{DataQualityError, PipelineResult, SchemaError},
    preprocess::frame::CleanedDataset,
    schema::{TOTAL_SALES, UNITS_SOLD, UNIT_PRICE},
};

/// Columns z-scored by the preprocessor.
pub const NORMALIZED_COLUMNS: [&str; 3] = [UNITS_SOLD, UNIT_PRICE, TOTAL_SALES];

/// Mean and population standard deviation of one column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnScale {
    /// Column mean.
    pub mean: f64,
    /// Population standard deviation (`ddof = 0`).
    pub std: f64,
}

impl ColumnScale {
    /// `(value - mean) / std`.
    #[must_use]
    pub fn apply(&self, value: f64) -> f64 {
        (value - self.mean) / self.std
    }

    /// Maps a z-score back to the original unit.
    #[must_use]
    pub fn invert(&self, value: f64) -> f64 {
        value.mul_add(self.std, self.mean)
    }
}

/// Per-column z-score parameters, fitted once and replayed on later inputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizationParams {
    columns: IndexMap<String, ColumnScale>,
}

impl NormalizationParams {
    /// Fits mean and standard deviation for each of `columns`.
    ///
    /// Fails with `DegenerateColumn` when a column is constant.
    pub fn fit(dataset: &CleanedDataset, columns: &[&str]) -> PipelineResult<Self> {
        if dataset.is_empty() {
            return Err(DataQualityError::EmptyDataset { rows: 0, required: 1 }.into());
        }
        let mut fitted = IndexMap::with_capacity(columns.len());
        for column in columns {
            let values = dataset.numeric(column)?;
            let scale = column_scale(values);
            if !(scale.std > degenerate_tolerance(scale.mean)) {
                return Err(DataQualityError::DegenerateColumn {
                    column: (*column).to_owned(),
                    value: scale.mean,
                }
                .into());
            }
            fitted.insert((*column).to_owned(), scale);
        }
        Ok(Self { columns: fitted })
    }

    /// Parameters of one column.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&ColumnScale> {
        self.columns.get(column)
    }

    /// `(column, scale)` pairs in fit order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ColumnScale)> + '_ {
        self.columns.iter().map(|(name, scale)| (name.as_str(), scale))
    }

    /// Z-scores the fitted columns of `dataset` in place.
    pub fn apply(&self, dataset: &mut CleanedDataset) -> Result<(), SchemaError> {
        for (column, scale) in &self.columns {
            for value in dataset.numeric_mut(column)?.iter_mut() {
                *value = scale.apply(*value);
            }
        }
        Ok(())
    }

    /// Maps a normalized value of `column` back to its original unit.
    #[must_use]
    pub fn invert(&self, column: &str, value: f64) -> Option<f64> {
        self.columns.get(column).map(|scale| scale.invert(value))
    }
}

fn column_scale(values: &[f64]) -> ColumnScale {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    ColumnScale {
        mean,
        std: variance.sqrt(),
    }
}

// Constant columns can leave rounding noise in the computed deviation.
fn degenerate_tolerance(mean: f64) -> f64 {
    1e-12 * mean.abs().max(1.0)
}
