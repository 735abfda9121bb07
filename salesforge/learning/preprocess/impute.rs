use serde::{Deserialize, Serialize};

use crate::errors::DataQualityError;

/// Parses a numeric cell. Missing, malformed and non-finite values yield `None`.
#[must_use]
pub fn coerce_numeric(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|text| text.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite())
}

/// Median of `values`; the mean of the two middle values for even counts.
#[must_use]
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Fill values fitted once on training data and reused for every later input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FillValues {
    /// Median of the coerced `Units_Sold` column.
    pub units_sold: f64,
    /// Median of the coerced `Unit_Price` column.
    pub unit_price: f64,
}

/// Fits a median over the parsed values of `column`.
pub fn fit_median(column: &str, coerced: &[Option<f64>]) -> Result<f64, DataQualityError> {
    let present: Vec<f64> = coerced.iter().flatten().copied().collect();
    median(&present).ok_or_else(|| DataQualityError::EmptyColumn(column.to_owned()))
}

/// Replaces `None` with `fill`; returns the values and how many were filled.
#[must_use]
pub fn fill_missing(coerced: &[Option<f64>], fill: f64) -> (Vec<f64>, usize) {
    let filled = coerced.iter().filter(|value| value.is_none()).count();
    let values = coerced.iter().map(|value| value.unwrap_or(fill)).collect();
    (values, filled)
}
