use std::{
    fs::{self, File},
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
};

use chrono::NaiveDate;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::{
    errors::SchemaError,
    models::TrainedModel,
    preprocess::{
        frame::{CleanedDataset, ColumnData},
        PreprocessArtifact,
    },
    reporting::DatasetReport,
    schema::RawDataset,
    selection::reporter::SelectionReport,
    telemetry::LearningTelemetry,
};

const ISO_DATE: &str = "%Y-%m-%d";

/// Failures of the file and event collaborators.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Filesystem failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed CSV.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    /// Malformed or unserializable JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// Input doesn't match the expected columns.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// Bytes that don't decode as the configured encoding.
    #[error("input is not valid utf-8: {0}")]
    Decode(#[from] std::string::FromUtf8Error),
    /// A cell that can't be read back as its column's type.
    #[error("row {row}, column `{column}`: {message}")]
    Format {
        /// 1-based data row.
        row: usize,
        /// Column name.
        column: String,
        /// What went wrong.
        message: String,
    },
    /// The event publisher rejected a report.
    #[error("event publish failed: {0}")]
    Publish(String),
}

/// Produces the raw input rows.
pub trait DatasetSource {
    /// Reads every row.
    fn load(&self) -> Result<RawDataset, SinkError>;

    /// Where the rows come from, for logs.
    fn describe(&self) -> String {
        "in-memory dataset".to_owned()
    }
}

impl DatasetSource for RawDataset {
    fn load(&self) -> Result<RawDataset, SinkError> {
        Ok(self.clone())
    }
}

/// Receives the cleaned dataset.
pub trait DatasetSink {
    /// Persists `dataset`.
    fn write(&self, dataset: &CleanedDataset) -> Result<(), SinkError>;
}

/// Receives report payloads.
pub trait ReportSink {
    /// Dataset statistics after preprocessing.
    fn dataset(&self, report: &DatasetReport) -> Result<(), SinkError>;
    /// Model comparison after selection.
    fn selection(&self, report: &SelectionReport) -> Result<(), SinkError>;
}

/// Persists the winning model.
pub trait ModelSink {
    /// Stores `model`.
    fn save(&self, model: &TrainedModel) -> Result<(), SinkError>;

    /// Reads back the last stored model, when the sink supports it.
    fn reload(&self) -> Result<Option<TrainedModel>, SinkError> {
        Ok(None)
    }
}

/// Byte encoding of an input file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    /// UTF-8, optionally with a byte-order mark.
    #[default]
    Utf8,
    /// ISO-8859-1; every byte maps to the code point of the same value.
    Latin1,
}

impl TextEncoding {
    fn decode(self, bytes: Vec<u8>) -> Result<String, SinkError> {
        match self {
            Self::Utf8 => {
                let text = String::from_utf8(bytes)?;
                Ok(match text.strip_prefix('\u{feff}') {
                    Some(rest) => rest.to_owned(),
                    None => text,
                })
            }
            Self::Latin1 => Ok(bytes.into_iter().map(char::from).collect()),
        }
    }
}

/// Raw sales rows from a delimited text file.
#[derive(Debug, Clone)]
pub struct CsvDatasetSource {
    path: PathBuf,
    delimiter: u8,
    encoding: TextEncoding,
}

impl CsvDatasetSource {
    /// Comma-separated UTF-8 source.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            delimiter: b',',
            encoding: TextEncoding::Utf8,
        }
    }

    /// Field delimiter. Non-ASCII characters fall back to a comma.
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = u8::try_from(delimiter).unwrap_or(b',');
        self
    }

    /// Byte encoding.
    #[must_use]
    pub const fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// File path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DatasetSource for CsvDatasetSource {
    fn load(&self) -> Result<RawDataset, SinkError> {
        let text = self.encoding.decode(fs::read(&self.path)?)?;
        let (headers, rows) = read_table(&text, self.delimiter)?;
        Ok(RawDataset::from_table(&headers, rows)?)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

fn read_table(text: &str, delimiter: u8) -> Result<(Vec<String>, Vec<Vec<String>>), SinkError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_owned())
        .collect();
    let rows = reader
        .records()
        .map(|record| record.map(|r| r.iter().map(str::to_owned).collect()))
        .collect::<Result<Vec<Vec<String>>, _>>()?;
    Ok((headers, rows))
}

/// Reads a cleaned dataset written by [`CsvDatasetSink`] back into typed
/// columns.
///
/// Column types are inferred: `true`/`false` columns become flags,
/// ISO-date columns (blank for null) become dates, everything else must be
/// numeric.
#[derive(Debug, Clone)]
pub struct CsvCleanedSource {
    path: PathBuf,
    delimiter: u8,
}

impl CsvCleanedSource {
    /// Comma-separated source.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            delimiter: b',',
        }
    }

    /// Loads and type-infers every column.
    pub fn load(&self) -> Result<CleanedDataset, SinkError> {
        let text = TextEncoding::Utf8.decode(fs::read(&self.path)?)?;
        let (headers, rows) = read_table(&text, self.delimiter)?;
        let mut dataset = CleanedDataset::new();
        for (idx, name) in headers.iter().enumerate() {
            let cells: Vec<&str> = rows
                .iter()
                .map(|row| row.get(idx).map_or("", |cell| cell.trim()))
                .collect();
            dataset.push_column(name.clone(), infer_column(name, &cells)?)?;
        }
        Ok(dataset)
    }
}

/// Header-only columns load as empty numeric columns.
fn infer_column(name: &str, cells: &[&str]) -> Result<ColumnData, SinkError> {
    if cells.is_empty() {
        return Ok(ColumnData::Numeric(Vec::new()));
    }
    if cells.iter().all(|c| matches!(*c, "true" | "false")) {
        return Ok(ColumnData::Flag(cells.iter().map(|c| *c == "true").collect()));
    }
    let dates: Option<Vec<Option<NaiveDate>>> = cells
        .iter()
        .map(|c| {
            if c.is_empty() {
                Some(None)
            } else {
                NaiveDate::parse_from_str(c, ISO_DATE).ok().map(Some)
            }
        })
        .collect();
    if let Some(dates) = dates {
        return Ok(ColumnData::Date(dates));
    }
    cells
        .iter()
        .enumerate()
        .map(|(row, c)| {
            c.parse::<f64>().map_err(|err| SinkError::Format {
                row: row + 1,
                column: name.to_owned(),
                message: format!("`{c}` is not a number ({err})"),
            })
        })
        .collect::<Result<Vec<f64>, _>>()
        .map(ColumnData::Numeric)
}

/// Writes a cleaned dataset as CSV: flags as `true`/`false`, dates as ISO
/// `YYYY-MM-DD` (blank when null).
#[derive(Debug, Clone)]
pub struct CsvDatasetSink {
    path: PathBuf,
}

impl CsvDatasetSink {
    /// Sink writing to `path`; parent directories are created on write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DatasetSink for CsvDatasetSink {
    fn write(&self, dataset: &CleanedDataset) -> Result<(), SinkError> {
        create_parent(&self.path)?;
        let mut writer = csv::Writer::from_path(&self.path)?;
        writer.write_record(dataset.column_names())?;
        let columns: Vec<&ColumnData> = dataset.columns().map(|(_, data)| data).collect();
        for row in 0..dataset.len() {
            writer.write_record(columns.iter().map(|data| format_cell(data, row)))?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn format_cell(data: &ColumnData, row: usize) -> String {
    match data {
        ColumnData::Numeric(values) => values[row].to_string(),
        ColumnData::Flag(values) => values[row].to_string(),
        ColumnData::Date(values) => values[row]
            .map(|date| date.format(ISO_DATE).to_string())
            .unwrap_or_default(),
    }
}

/// Stores a [`TrainedModel`] as JSON.
#[derive(Debug, Clone)]
pub struct JsonModelSink {
    path: PathBuf,
}

impl JsonModelSink {
    /// Sink writing to `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ModelSink for JsonModelSink {
    fn save(&self, model: &TrainedModel) -> Result<(), SinkError> {
        write_json(&self.path, model)
    }

    fn reload(&self) -> Result<Option<TrainedModel>, SinkError> {
        load_model(&self.path).map(Some)
    }
}

/// Reads a model written by [`JsonModelSink`].
pub fn load_model(path: impl AsRef<Path>) -> Result<TrainedModel, SinkError> {
    read_json(path.as_ref())
}

/// Writes a fitted preprocessing artifact as JSON.
pub fn save_artifact(path: impl AsRef<Path>, artifact: &PreprocessArtifact) -> Result<(), SinkError> {
    write_json(path.as_ref(), artifact)
}

/// Reads an artifact written by [`save_artifact`].
pub fn load_artifact(path: impl AsRef<Path>) -> Result<PreprocessArtifact, SinkError> {
    read_json(path.as_ref())
}

/// Writes report payloads as JSON files in a directory.
#[derive(Debug, Clone)]
pub struct JsonReportSink {
    dir: PathBuf,
}

impl JsonReportSink {
    /// File name of the dataset report.
    pub const DATASET_FILE: &'static str = "dataset_report.json";
    /// File name of the selection report.
    pub const SELECTION_FILE: &'static str = "selection_report.json";

    /// Sink writing into `dir`, created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ReportSink for JsonReportSink {
    fn dataset(&self, report: &DatasetReport) -> Result<(), SinkError> {
        write_json(&self.dir.join(Self::DATASET_FILE), report)
    }

    fn selection(&self, report: &SelectionReport) -> Result<(), SinkError> {
        write_json(&self.dir.join(Self::SELECTION_FILE), report)
    }
}

/// Publishes report payloads as `report.dataset` / `report.selection` events.
#[derive(Debug, Clone)]
pub struct EventReportSink {
    telemetry: LearningTelemetry,
}

impl EventReportSink {
    /// Publishes through `telemetry`'s event publisher.
    #[must_use]
    pub fn new(telemetry: &LearningTelemetry) -> Self {
        Self {
            telemetry: telemetry.scoped("report"),
        }
    }

    fn publish(&self, event_type: &str, payload: &impl Serialize) -> Result<(), SinkError> {
        let payload = serde_json::to_value(payload)?;
        self.telemetry
            .event(event_type, payload)
            .map_err(|err| SinkError::Publish(format!("{err:#}")))
    }
}

impl ReportSink for EventReportSink {
    fn dataset(&self, report: &DatasetReport) -> Result<(), SinkError> {
        self.publish("report.dataset", report)
    }

    fn selection(&self, report: &SelectionReport) -> Result<(), SinkError> {
        self.publish("report.selection", report)
    }
}

fn create_parent(path: &Path) -> Result<(), SinkError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn write_json(path: &Path, value: &impl Serialize) -> Result<(), SinkError> {
    create_parent(path)?;
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, value)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, SinkError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::HyperParams,
        preprocess::Preprocessor,
        schema::{synthetic_sales, DATE, STORE, TOTAL_SALES},
    };
    use ndarray::array;
    use shared_event_bus::MemoryEventBus;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn utf8_byte_order_mark_is_stripped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bom.csv");
        let mut bytes = "\u{feff}".as_bytes().to_vec();
        bytes.extend_from_slice(b"Store,Category,Units_Sold,Unit_Price,Date\nA,Toys,3,2.5,2023-01-02\n");
        fs::write(&path, bytes).unwrap();
        let raw = CsvDatasetSource::new(&path).load().unwrap();
        assert_eq!(raw.records()[0].get(STORE), Some("A"));
        assert!(raw.ignored_columns().is_empty());
    }

    #[test]
    fn header_only_cleaned_csv_is_reported_as_too_small() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cleaned.csv");
        fs::write(&path, "Units_Sold,Unit_Price,Date,Store_B,Total_Sales\n").unwrap();
        let dataset = CsvCleanedSource::new(&path).load().unwrap();
        assert!(matches!(dataset.column(TOTAL_SALES), Some(ColumnData::Numeric(v)) if v.is_empty()));

        let err = crate::ModelSelector::new(crate::SelectorSettings::default())
            .select_best(&dataset, TOTAL_SALES)
            .unwrap_err();
        assert_eq!(
            err,
            crate::errors::PipelineError::DataQuality(crate::errors::DataQualityError::EmptyDataset {
                rows: 0,
                required: 10,
            })
        );
    }

    #[test]
    fn csv_source_reads_schema_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sales.csv");
        fs::write(
            &path,
            "Store,Category,Units_Sold,Unit_Price,Date,Region\nA,Toys,3,2.5,2023-01-02,EU\nB,Food,,NA,,US\n",
        )
        .unwrap();
        let raw = CsvDatasetSource::new(&path).load().unwrap();
        assert_eq!(raw.len(), 2);
        assert_eq!(raw.ignored_columns(), ["Region".to_owned()]);
        assert_eq!(raw.records()[0].get(STORE), Some("A"));
        assert_eq!(raw.records()[1].units_sold, None);
        assert_eq!(raw.records()[1].unit_price, None);
    }

    #[test]
    fn latin1_source_decodes_high_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("latin1.csv");
        let mut bytes = b"Store;Category;Units_Sold;Unit_Price;Date\nM".to_vec();
        bytes.push(0xFC);
        bytes.extend_from_slice(b"nchen;Toys;1;2;2023-01-01\n");
        fs::write(&path, bytes).unwrap();
        let raw = CsvDatasetSource::new(&path)
            .with_delimiter(';')
            .with_encoding(TextEncoding::Latin1)
            .load()
            .unwrap();
        assert_eq!(raw.records()[0].get(STORE), Some("München"));
    }

    #[test]
    fn missing_schema_column_fails_at_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short.csv");
        fs::write(&path, "Store,Category,Units_Sold,Date\nA,B,1,2023-01-01\n").unwrap();
        let err = CsvDatasetSource::new(&path).load().unwrap_err();
        assert!(matches!(
            err,
            SinkError::Schema(SchemaError::MissingRequiredColumn(ref c)) if c == "Unit_Price"
        ));
    }

    #[test]
    fn cleaned_csv_reads_back_with_types() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out/cleaned.csv");
        let (dataset, _) = Preprocessor::new().process(&synthetic_sales(40, 2)).unwrap();
        CsvDatasetSink::new(&path).write(&dataset).unwrap();
        let restored = CsvCleanedSource::new(&path).load().unwrap();
        assert_eq!(
            restored.column_names().collect::<Vec<_>>(),
            dataset.column_names().collect::<Vec<_>>()
        );
        assert_eq!(restored.dates(DATE).unwrap(), dataset.dates(DATE).unwrap());
        assert_eq!(restored.numeric(TOTAL_SALES).unwrap(), dataset.numeric(TOTAL_SALES).unwrap());
    }

    #[test]
    fn non_numeric_cell_reports_its_position() {
        let err = infer_column("Units_Sold", &["1.0", "oops"]).unwrap_err();
        assert!(matches!(err, SinkError::Format { row: 2, .. }));
    }

    #[test]
    fn model_and_artifact_reload() {
        let dir = tempdir().unwrap();
        let model = TrainedModel::fit(
            HyperParams::Ridge {
                alpha: 1.0,
                fit_intercept: true,
            },
            TOTAL_SALES,
            vec!["a".into()],
            &array![[0.0], [1.0], [2.0]],
            &array![1.0, 3.0, 5.0],
        )
        .unwrap();
        let sink = JsonModelSink::new(dir.path().join("model.json"));
        sink.save(&model).unwrap();
        let reloaded = sink.reload().unwrap().unwrap();
        let x = array![[0.5], [4.0]];
        let (a, b) = (model.predict(&x).unwrap(), reloaded.predict(&x).unwrap());
        assert!(a.iter().zip(b.iter()).all(|(p, q)| (p - q).abs() < 1e-9));

        let artifact = Preprocessor::new()
            .fit_process(&synthetic_sales(30, 4))
            .unwrap()
            .artifact;
        let path = dir.path().join("artifact.json");
        save_artifact(&path, &artifact).unwrap();
        let restored = load_artifact(&path).unwrap();
        assert_eq!(restored.store, artifact.store);
        assert_eq!(restored.date_formats, artifact.date_formats);
    }

    #[test]
    fn report_sinks_write_and_publish() {
        let dir = tempdir().unwrap();
        let (dataset, _) = Preprocessor::new().process(&synthetic_sales(30, 9)).unwrap();
        let report = DatasetReport::from_dataset(&dataset);

        let files = JsonReportSink::new(dir.path().join("reports"));
        files.dataset(&report).unwrap();
        assert!(dir
            .path()
            .join("reports")
            .join(JsonReportSink::DATASET_FILE)
            .exists());

        let bus = Arc::new(MemoryEventBus::new(4));
        let telemetry = LearningTelemetry::builder("pipeline")
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        EventReportSink::new(&telemetry).dataset(&report).unwrap();
        let events = bus.of_type("report.dataset");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source, "report");
        assert_eq!(events[0].payload["rows"], dataset.len());
    }
}
