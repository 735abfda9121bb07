//! Ordered preprocessing: deduplicate, repair numerics, parse dates, dummy
//! encode, derive `Total_Sales`, normalize.

/// Exact duplicate removal.
pub mod dedup;
/// Numeric coercion and median fill.
pub mod impute;
/// Date parsing.
pub mod dates;
/// One-hot encoding with a dropped reference level.
pub mod encode;
/// Z-score normalization.
pub mod scale;
/// Cleaned column frame.
pub mod frame;

use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;

use crate::{
    errors::{DataQualityError, PipelineResult},
    schema::{RawDataset, RawRecord, CATEGORY, DATE, STORE, TOTAL_SALES, UNITS_SOLD, UNIT_PRICE},
    telemetry::{self, LearningTelemetry},
};
use dates::DateParser;
use encode::CategoricalLevels;
use frame::{CleanedDataset, ColumnData};
use impute::{coerce_numeric, fill_missing, fit_median, FillValues};
use scale::{NormalizationParams, NORMALIZED_COLUMNS};

/// Every parameter fitted by [`Preprocessor::fit_process`].
///
/// Replaying it through [`PreprocessArtifact::transform`] reproduces the
/// training-time transform on new rows without refitting anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessArtifact {
    /// Median fill values.
    pub fill_values: FillValues,
    /// `Store` levels.
    pub store: CategoricalLevels,
    /// `Category` levels.
    pub category: CategoricalLevels,
    /// Accepted date formats.
    pub date_formats: Vec<String>,
    /// Z-score parameters.
    pub normalization: NormalizationParams,
}

/// What a preprocessing pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessReport {
    /// Rows received.
    pub rows_in: usize,
    /// Exact duplicates dropped.
    pub duplicates_removed: usize,
    /// `Units_Sold` cells replaced by the fill value.
    pub units_sold_filled: usize,
    /// `Unit_Price` cells replaced by the fill value.
    pub unit_price_filled: usize,
    /// Date cells that did not parse (kept as null).
    pub invalid_dates: usize,
    /// Labels not seen when the levels were fitted.
    pub unknown_labels: usize,
    /// Rows emitted.
    pub rows_out: usize,
}

/// Output of [`Preprocessor::fit_process`].
#[derive(Debug, Clone, PartialEq)]
pub struct Preprocessed {
    /// Cleaned, encoded, normalized rows.
    pub dataset: CleanedDataset,
    /// Fitted parameters.
    pub artifact: PreprocessArtifact,
    /// Step counters.
    pub report: PreprocessReport,
}

/// Fits and applies the cleaning transform.
#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    dates: DateParser,
    telemetry: Option<LearningTelemetry>,
}

impl Preprocessor {
    /// Preprocessor with the default date formats.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the accepted date formats.
    #[must_use]
    pub fn with_date_formats(mut self, formats: Vec<String>) -> Self {
        self.dates = DateParser::new(formats);
        self
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: LearningTelemetry) -> Self {
        self.telemetry = Some(telemetry.scoped("preprocess"));
        self
    }

    /// Cleans `raw` and returns the dataset with its normalization parameters.
    pub fn process(&self, raw: &RawDataset) -> PipelineResult<(CleanedDataset, NormalizationParams)> {
        let Preprocessed { dataset, artifact, .. } = self.fit_process(raw)?;
        Ok((dataset, artifact.normalization))
    }

    /// Cleans `raw`, fitting every parameter on it.
    pub fn fit_process(&self, raw: &RawDataset) -> PipelineResult<Preprocessed> {
        let telemetry = self.telemetry.as_ref();
        if raw.is_empty() {
            return Err(DataQualityError::EmptyDataset { rows: 0, required: 1 }.into());
        }
        if !raw.ignored_columns().is_empty() {
            telemetry::log(
                telemetry,
                LogLevel::Warn,
                "columns_ignored",
                json!({ "columns": raw.ignored_columns() }),
            );
        }

        let (records, duplicates_removed) = dedup::deduplicate(raw.records());
        telemetry::log(
            telemetry,
            LogLevel::Info,
            "dedup_complete",
            json!({ "before": raw.len(), "after": records.len(), "removed": duplicates_removed }),
        );

        let units = coerce_column(&records, UNITS_SOLD);
        let prices = coerce_column(&records, UNIT_PRICE);
        let fill_values = FillValues {
            units_sold: fit_median(UNITS_SOLD, &units)?,
            unit_price: fit_median(UNIT_PRICE, &prices)?,
        };
        let store = CategoricalLevels::fit(STORE, records.iter().map(|r| r.store.as_deref()));
        let category =
            CategoricalLevels::fit(CATEGORY, records.iter().map(|r| r.category.as_deref()));

        let mut report = PreprocessReport {
            rows_in: raw.len(),
            duplicates_removed,
            ..PreprocessReport::default()
        };
        let mut dataset = assemble(
            &records,
            &fill_values,
            &store,
            &category,
            &self.dates,
            &mut report,
            telemetry,
        )?;

        let normalization = NormalizationParams::fit(&dataset, &NORMALIZED_COLUMNS)?;
        normalization.apply(&mut dataset)?;
        log_normalization(telemetry, &normalization);

        let artifact = PreprocessArtifact {
            fill_values,
            store,
            category,
            date_formats: self.dates.formats().to_vec(),
            normalization,
        };
        telemetry::log(
            telemetry,
            LogLevel::Info,
            "preprocess_complete",
            json!({ "rows": dataset.len(), "columns": dataset.column_names().collect::<Vec<_>>() }),
        );
        Ok(Preprocessed {
            dataset,
            artifact,
            report,
        })
    }
}

impl PreprocessArtifact {
    /// Applies the fitted transform to new rows.
    ///
    /// Rows are not deduplicated: each one is a prediction request.
    pub fn transform(&self, raw: &RawDataset) -> PipelineResult<(CleanedDataset, PreprocessReport)> {
        self.transform_with_telemetry(raw, None)
    }

    /// [`PreprocessArtifact::transform`] with logging.
    pub fn transform_with_telemetry(
        &self,
        raw: &RawDataset,
        telemetry: Option<&LearningTelemetry>,
    ) -> PipelineResult<(CleanedDataset, PreprocessReport)> {
        let parser = DateParser::new(self.date_formats.clone());
        let mut report = PreprocessReport {
            rows_in: raw.len(),
            ..PreprocessReport::default()
        };
        let mut dataset = assemble(
            raw.records(),
            &self.fill_values,
            &self.store,
            &self.category,
            &parser,
            &mut report,
            telemetry,
        )?;
        self.normalization.apply(&mut dataset)?;
        Ok((dataset, report))
    }
}

fn coerce_column(records: &[RawRecord], column: &str) -> Vec<Option<f64>> {
    records
        .iter()
        .map(|record| coerce_numeric(record.get(column)))
        .collect()
}

/// Steps 2-5 with already-fitted parameters: numeric repair, dates, dummies,
/// `Total_Sales`. Column order is `Units_Sold, Unit_Price, Date, Store_*,
/// Category_*, Total_Sales`.
fn assemble(
    records: &[RawRecord],
    fill: &FillValues,
    store: &CategoricalLevels,
    category: &CategoricalLevels,
    dates: &DateParser,
    report: &mut PreprocessReport,
    telemetry: Option<&LearningTelemetry>,
) -> PipelineResult<CleanedDataset> {
    let (units, units_filled) = fill_missing(&coerce_column(records, UNITS_SOLD), fill.units_sold);
    let (prices, prices_filled) =
        fill_missing(&coerce_column(records, UNIT_PRICE), fill.unit_price);
    report.units_sold_filled = units_filled;
    report.unit_price_filled = prices_filled;
    telemetry::log(
        telemetry,
        LogLevel::Info,
        "median_fill",
        json!({
            UNITS_SOLD: { "median": fill.units_sold, "filled": units_filled },
            UNIT_PRICE: { "median": fill.unit_price, "filled": prices_filled },
        }),
    );

    let parsed: Vec<_> = records
        .iter()
        .map(|record| dates.parse(record.date.as_deref()))
        .collect();
    report.invalid_dates = parsed.iter().filter(|date| date.is_none()).count();
    if report.invalid_dates > 0 {
        telemetry::log(
            telemetry,
            LogLevel::Warn,
            "dates_unparsed",
            json!({ "count": report.invalid_dates }),
        );
    }

    let stores = store.encode(records.iter().map(|r| r.store.as_deref()));
    let categories = category.encode(records.iter().map(|r| r.category.as_deref()));
    report.unknown_labels = stores.unknown + categories.unknown;
    if report.unknown_labels > 0 {
        telemetry::log(
            telemetry,
            LogLevel::Warn,
            "unknown_labels",
            json!({ STORE: stores.unknown, CATEGORY: categories.unknown }),
        );
    }

    let total_sales: Vec<f64> = units.iter().zip(&prices).map(|(u, p)| u * p).collect();

    let mut dataset = CleanedDataset::new();
    dataset.push_column(UNITS_SOLD, ColumnData::Numeric(units))?;
    dataset.push_column(UNIT_PRICE, ColumnData::Numeric(prices))?;
    dataset.push_column(DATE, ColumnData::Date(parsed))?;
    let indicator_count = stores.indicators.len() + categories.indicators.len();
    for (name, flags) in stores.indicators.into_iter().chain(categories.indicators) {
        dataset.push_column(name, ColumnData::Flag(flags))?;
    }
    telemetry::log(
        telemetry,
        LogLevel::Info,
        "one_hot_encoded",
        json!({
            "indicators": indicator_count,
            "reference_levels": { STORE: store.reference(), CATEGORY: category.reference() },
        }),
    );
    dataset.push_column(TOTAL_SALES, ColumnData::Numeric(total_sales))?;
    report.rows_out = dataset.len();
    Ok(dataset)
}

fn log_normalization(telemetry: Option<&LearningTelemetry>, params: &NormalizationParams) {
    let scales: serde_json::Map<String, serde_json::Value> = params
        .iter()
        .map(|(column, scale)| (column.to_owned(), json!({ "mean": scale.mean, "std": scale.std })))
        .collect();
    telemetry::log(telemetry, LogLevel::Info, "normalized", serde_json::Value::Object(scales));
}
