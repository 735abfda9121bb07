use serde::{Deserialize, Serialize};

use crate::{
    errors::PipelineResult,
    preprocess::{
        frame::{CleanedDataset, ColumnData},
        impute::{coerce_numeric, fill_missing, fit_median},
    },
    schema::{RawDataset, TOTAL_SALES, UNITS_SOLD, UNIT_PRICE},
};

/// Bins in the `Total_Sales` distribution.
pub const HISTOGRAM_BINS: usize = 30;

/// Descriptive statistics of one numeric column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    /// Column name.
    pub column: String,
    /// Values counted.
    pub count: usize,
    /// Arithmetic mean.
    pub mean: f64,
    /// Sample standard deviation (`n - 1`); 0 for a single value.
    pub std: f64,
    /// Minimum.
    pub min: f64,
    /// First quartile.
    pub q25: f64,
    /// Median.
    pub median: f64,
    /// Third quartile.
    pub q75: f64,
    /// Maximum.
    pub max: f64,
}

impl ColumnStats {
    /// Statistics of `values`, or `None` when empty.
    #[must_use]
    pub fn of(column: &str, values: &[f64]) -> Option<Self> {
        let sorted = sorted(values);
        let (&min, &max) = (sorted.first()?, sorted.last()?);
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let std = if values.len() > 1 {
            (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        } else {
            0.0
        };
        Some(Self {
            column: column.to_owned(),
            count: values.len(),
            mean,
            std,
            min,
            q25: quantile(&sorted, 0.25),
            median: quantile(&sorted, 0.5),
            q75: quantile(&sorted, 0.75),
            max,
        })
    }
}

/// Equal-width histogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    /// Column name.
    pub column: String,
    /// `bins + 1` bin edges.
    pub edges: Vec<f64>,
    /// Values per bin; the last bin includes its right edge.
    pub counts: Vec<usize>,
}

impl Histogram {
    /// Bins `values` into `bins` equal-width buckets over their range.
    #[must_use]
    pub fn of(column: &str, values: &[f64], bins: usize) -> Option<Self> {
        let bins = bins.max(1);
        let sorted = sorted(values);
        let (&lo, &hi) = (sorted.first()?, sorted.last()?);
        // a constant column gets a unit-wide range centred on its value
        let (lo, hi) = if hi > lo { (lo, hi) } else { (lo - 0.5, hi + 0.5) };
        let width = (hi - lo) / bins as f64;
        let edges = (0..=bins).map(|i| (i as f64).mul_add(width, lo)).collect();
        let mut counts = vec![0; bins];
        for value in values {
            let bin = (((value - lo) / width) as usize).min(bins - 1);
            counts[bin] += 1;
        }
        Some(Self {
            column: column.to_owned(),
            edges,
            counts,
        })
    }
}

/// Pearson correlations between the numeric and flag columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    /// Columns in matrix order.
    pub columns: Vec<String>,
    /// Row-major coefficients; `None` where a column has zero variance.
    pub values: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    /// Correlation of every numeric or flag column pair in `dataset`.
    #[must_use]
    pub fn of(dataset: &CleanedDataset) -> Self {
        let series: Vec<(String, Vec<f64>)> = dataset
            .columns()
            .filter(|(_, data)| !matches!(data, ColumnData::Date(_)))
            .map(|(name, data)| {
                let values = (0..data.len()).filter_map(|row| data.as_f64(row)).collect();
                (name.to_owned(), values)
            })
            .collect();
        let values = series
            .iter()
            .map(|(_, a)| series.iter().map(|(_, b)| pearson(a, b)).collect())
            .collect();
        Self {
            columns: series.into_iter().map(|(name, _)| name).collect(),
            values,
        }
    }

    /// Coefficient between two named columns.
    #[must_use]
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.columns.iter().position(|c| c == a)?;
        let j = self.columns.iter().position(|c| c == b)?;
        self.values[i][j]
    }
}

/// Box-plot statistics with 1.5 IQR whiskers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxStats {
    /// Column name.
    pub column: String,
    /// First quartile.
    pub q1: f64,
    /// Median.
    pub median: f64,
    /// Third quartile.
    pub q3: f64,
    /// Smallest value within `q1 - 1.5 * IQR`.
    pub lower_whisker: f64,
    /// Largest value within `q3 + 1.5 * IQR`.
    pub upper_whisker: f64,
    /// Values beyond the whiskers, ascending.
    pub outliers: Vec<f64>,
}

impl BoxStats {
    /// Box statistics of `values`, or `None` when empty.
    #[must_use]
    pub fn of(column: &str, values: &[f64]) -> Option<Self> {
        let sorted = sorted(values);
        if sorted.is_empty() {
            return None;
        }
        let q1 = quantile(&sorted, 0.25);
        let q3 = quantile(&sorted, 0.75);
        let iqr = q3 - q1;
        let (low_fence, high_fence) = (1.5f64.mul_add(-iqr, q1), 1.5f64.mul_add(iqr, q3));
        let inside = sorted.iter().filter(|&&v| v >= low_fence && v <= high_fence);
        let lower_whisker = inside.clone().next().copied().unwrap_or(q1);
        let upper_whisker = inside.last().copied().unwrap_or(q3);
        Some(Self {
            column: column.to_owned(),
            q1,
            median: quantile(&sorted, 0.5),
            q3,
            lower_whisker,
            upper_whisker,
            outliers: sorted
                .iter()
                .copied()
                .filter(|&v| v < low_fence || v > high_fence)
                .collect(),
        })
    }
}

/// Summary payload handed to a report sink after preprocessing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetReport {
    /// Rows in the dataset.
    pub rows: usize,
    /// Column names in order.
    pub columns: Vec<String>,
    /// Statistics per numeric column.
    pub describe: Vec<ColumnStats>,
    /// `Total_Sales` distribution, when present.
    pub total_sales_histogram: Option<Histogram>,
    /// Pearson correlation matrix.
    pub correlation: CorrelationMatrix,
    /// `Units_Sold` box statistics, when present.
    pub units_sold_box: Option<BoxStats>,
}

impl DatasetReport {
    /// Computes every payload from a cleaned dataset.
    #[must_use]
    pub fn from_dataset(dataset: &CleanedDataset) -> Self {
        Self {
            rows: dataset.len(),
            columns: dataset.column_names().map(str::to_owned).collect(),
            describe: describe(dataset),
            total_sales_histogram: dataset
                .numeric(TOTAL_SALES)
                .ok()
                .and_then(|values| Histogram::of(TOTAL_SALES, values, HISTOGRAM_BINS)),
            correlation: CorrelationMatrix::of(dataset),
            units_sold_box: dataset
                .numeric(UNITS_SOLD)
                .ok()
                .and_then(|values| BoxStats::of(UNITS_SOLD, values)),
        }
    }
}

/// Statistics of every numeric column, in frame order.
#[must_use]
pub fn describe(dataset: &CleanedDataset) -> Vec<ColumnStats> {
    dataset
        .columns()
        .filter_map(|(name, data)| match data {
            ColumnData::Numeric(values) => ColumnStats::of(name, values),
            _ => None,
        })
        .collect()
}

/// Exploratory statistics of the raw numeric columns.
///
/// Values are coerced and median-filled, and `Total_Sales` is derived, but
/// nothing is deduplicated or normalized.
pub fn describe_raw(raw: &RawDataset) -> PipelineResult<Vec<ColumnStats>> {
    let units: Vec<Option<f64>> = raw
        .records()
        .iter()
        .map(|r| coerce_numeric(r.units_sold.as_deref()))
        .collect();
    let prices: Vec<Option<f64>> = raw
        .records()
        .iter()
        .map(|r| coerce_numeric(r.unit_price.as_deref()))
        .collect();
    let (units, _) = fill_missing(&units, fit_median(UNITS_SOLD, &units)?);
    let (prices, _) = fill_missing(&prices, fit_median(UNIT_PRICE, &prices)?);
    let total: Vec<f64> = units.iter().zip(&prices).map(|(u, p)| u * p).collect();
    Ok([(UNITS_SOLD, &units), (UNIT_PRICE, &prices), (TOTAL_SALES, &total)]
        .into_iter()
        .filter_map(|(name, values)| ColumnStats::of(name, values))
        .collect())
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// Linearly interpolated quantile of ascending `sorted` values.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    (sorted[upper] - sorted[lower]).mul_add(fraction, sorted[lower])
}

fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len().min(b.len());
    if n < 2 {
        return None;
    }
    let mean_a = a.iter().sum::<f64>() / n as f64;
    let mean_b = b.iter().sum::<f64>() / n as f64;
    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        let (dx, dy) = (x - mean_a, y - mean_b);
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    if var_a <= f64::EPSILON || var_b <= f64::EPSILON {
        return None;
    }
    Some(cov / (var_a.sqrt() * var_b.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RawRecord, DATE};

    fn frame() -> CleanedDataset {
        let mut frame = CleanedDataset::new();
        frame
            .push_column(UNITS_SOLD, ColumnData::Numeric(vec![1.0, 2.0, 3.0, 4.0, 100.0]))
            .unwrap();
        frame
            .push_column(DATE, ColumnData::Date(vec![None; 5]))
            .unwrap();
        frame
            .push_column("Store_B", ColumnData::Flag(vec![false, false, true, true, true]))
            .unwrap();
        frame
            .push_column(TOTAL_SALES, ColumnData::Numeric(vec![2.0, 4.0, 6.0, 8.0, 200.0]))
            .unwrap();
        frame
    }

    #[test]
    fn describe_matches_pandas_conventions() {
        let stats = ColumnStats::of("x", &[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(stats.count, 4);
        assert!((stats.mean - 2.5).abs() < 1e-12);
        assert!((stats.std - (5.0_f64 / 3.0).sqrt()).abs() < 1e-12);
        assert!((stats.q25 - 1.75).abs() < 1e-12);
        assert!((stats.median - 2.5).abs() < 1e-12);
        assert!((stats.q75 - 3.25).abs() < 1e-12);
        assert!(ColumnStats::of("x", &[]).is_none());
    }

    #[test]
    fn histogram_counts_every_value() {
        let values: Vec<f64> = (0..=60).map(f64::from).collect();
        let histogram = Histogram::of("x", &values, HISTOGRAM_BINS).unwrap();
        assert_eq!(histogram.edges.len(), 31);
        assert_eq!(histogram.counts.iter().sum::<usize>(), 61);
        assert_eq!(histogram.counts[29], 3);
    }

    #[test]
    fn box_stats_flag_outliers() {
        let stats = BoxStats::of(UNITS_SOLD, &[1.0, 2.0, 3.0, 4.0, 100.0]).unwrap();
        assert_eq!(stats.outliers, vec![100.0]);
        assert!((stats.upper_whisker - 4.0).abs() < f64::EPSILON);
        assert!((stats.lower_whisker - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn correlation_skips_dates_and_includes_flags() {
        let matrix = CorrelationMatrix::of(&frame());
        assert_eq!(matrix.columns, vec![UNITS_SOLD, "Store_B", TOTAL_SALES]);
        let r = matrix.get(UNITS_SOLD, TOTAL_SALES).unwrap();
        assert!((r - 1.0).abs() < 1e-12);
    }

    #[test]
    fn dataset_report_collects_payloads() {
        let report = DatasetReport::from_dataset(&frame());
        assert_eq!(report.rows, 5);
        assert_eq!(report.describe.len(), 2);
        assert!(report.total_sales_histogram.is_some());
        assert_eq!(report.units_sold_box.unwrap().outliers, vec![100.0]);
    }

    #[test]
    fn describe_raw_fills_before_summarizing() {
        let raw = RawDataset::new(vec![
            RawRecord::from_cells(["A", "X", "2", "3", ""]),
            RawRecord::from_cells(["A", "X", "", "5", ""]),
            RawRecord::from_cells(["B", "Y", "4", "bad", ""]),
        ]);
        let stats = describe_raw(&raw).unwrap();
        assert_eq!(stats[0].column, UNITS_SOLD);
        assert!((stats[0].mean - 3.0).abs() < 1e-12);
        assert!((stats[1].mean - 4.0).abs() < 1e-12);
        assert_eq!(stats[2].column, TOTAL_SALES);
        assert_eq!(stats[2].count, 3);
    }
}
