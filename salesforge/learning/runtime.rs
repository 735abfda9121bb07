//! End-to-end run: load, clean, report, select, persist.

use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::{json, Value};
use shared_event_bus::FileEventPublisher;
use shared_logging::LogLevel;
use uuid::Uuid;

use crate::{
    config::PipelineConfig,
    preprocess::{PreprocessArtifact, PreprocessReport, Preprocessed, Preprocessor},
    reporting::DatasetReport,
    selection::{reporter::SelectionReport, ModelSelector, Selection},
    sinks::{
        save_artifact, CsvDatasetSink, DatasetSink, DatasetSource, EventReportSink,
        JsonModelSink, JsonReportSink, ModelSink, ReportSink,
    },
    telemetry::LearningTelemetry,
};

/// Everything a successful run produced.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    /// Unique id stamped on the run's logs and events.
    pub run_id: String,
    /// Raw rows read from the source.
    pub rows_loaded: usize,
    /// Rows left after cleaning.
    pub rows_cleaned: usize,
    /// Exact duplicates dropped.
    pub duplicates_removed: usize,
    /// Per-step counters.
    pub preprocess: PreprocessReport,
    /// Fitted preprocessing parameters.
    pub artifact: PreprocessArtifact,
    /// Winning model and per-family scores.
    pub selection: Selection,
}

impl PipelineOutcome {
    /// Selection summary for display.
    #[must_use]
    pub fn summary(&self) -> SelectionReport {
        SelectionReport::from_selection(&self.selection)
    }
}

/// Sales pipeline wired to its collaborators.
pub struct SalesPipeline {
    config: PipelineConfig,
    telemetry: Option<LearningTelemetry>,
    dataset_sink: Option<Box<dyn DatasetSink>>,
    report_sinks: Vec<Box<dyn ReportSink>>,
    model_sink: Option<Box<dyn ModelSink>>,
    artifact_path: Option<PathBuf>,
}

impl SalesPipeline {
    /// Pipeline without any sinks or telemetry.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            telemetry: None,
            dataset_sink: None,
            report_sinks: Vec::new(),
            model_sink: None,
            artifact_path: None,
        }
    }

    /// Pipeline with telemetry and file sinks taken from `[output]`.
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        let output = config.output.clone();
        let mut pipeline = Self::new(config);

        if output.log_path.is_some() || output.event_log.is_some() {
            let mut builder = LearningTelemetry::builder("pipeline").min_level(output.log_level);
            if let Some(path) = &output.log_path {
                builder = builder.log_path(path);
            }
            if let Some(path) = &output.event_log {
                let publisher = FileEventPublisher::new(path)
                    .with_context(|| format!("opening event log {}", path.display()))?;
                builder = builder.event_publisher(Arc::new(publisher));
            }
            let telemetry = builder.build().context("initialising telemetry")?;
            if output.event_log.is_some() {
                pipeline = pipeline.with_report_sink(Box::new(EventReportSink::new(&telemetry)));
            }
            pipeline = pipeline.with_telemetry(telemetry);
        }
        if let Some(path) = output.cleaned_csv {
            pipeline = pipeline.with_dataset_sink(Box::new(CsvDatasetSink::new(path)));
        }
        if let Some(dir) = output.report_dir {
            pipeline = pipeline.with_report_sink(Box::new(JsonReportSink::new(dir)));
        }
        if let Some(path) = output.model {
            pipeline = pipeline.with_model_sink(Box::new(JsonModelSink::new(path)));
        }
        pipeline.artifact_path = output.artifact;
        Ok(pipeline)
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: LearningTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Sets the cleaned-dataset sink.
    #[must_use]
    pub fn with_dataset_sink(mut self, sink: Box<dyn DatasetSink>) -> Self {
        self.dataset_sink = Some(sink);
        self
    }

    /// Adds a report sink.
    #[must_use]
    pub fn with_report_sink(mut self, sink: Box<dyn ReportSink>) -> Self {
        self.report_sinks.push(sink);
        self
    }

    /// Sets the model sink.
    #[must_use]
    pub fn with_model_sink(mut self, sink: Box<dyn ModelSink>) -> Self {
        self.model_sink = Some(sink);
        self
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Telemetry handle, if any.
    #[must_use]
    pub const fn telemetry(&self) -> Option<&LearningTelemetry> {
        self.telemetry.as_ref()
    }

    /// Runs every stage against `source`. The first failure halts the run.
    pub fn run(&self, source: &dyn DatasetSource) -> Result<PipelineOutcome> {
        let run_id = Uuid::new_v4().to_string();
        let target = self.config.selection.target.clone();
        self.log(
            LogLevel::Info,
            "run_started",
            json!({ "run_id": run_id, "source": source.describe(), "target": target }),
        );
        self.event("pipeline.started", json!({ "run_id": run_id }));

        let result = self.execute(&run_id, source, &target);
        match &result {
            Ok(outcome) => {
                let payload = json!({
                    "run_id": run_id,
                    "winner": outcome.selection.winner(),
                    "rmse": outcome.selection.evaluation.rmse,
                    "rows_cleaned": outcome.rows_cleaned,
                });
                self.log(LogLevel::Info, "run_complete", payload.clone());
                self.event("pipeline.completed", payload);
            }
            Err(err) => {
                let payload = json!({ "run_id": run_id, "error": format!("{err:#}") });
                self.log(LogLevel::Error, "run_failed", payload.clone());
                self.event("pipeline.failed", payload);
            }
        }
        result
    }

    fn execute(&self, run_id: &str, source: &dyn DatasetSource, target: &str) -> Result<PipelineOutcome> {
        let raw = source
            .load()
            .with_context(|| format!("loading {}", source.describe()))?;
        self.log(
            LogLevel::Info,
            "dataset_loaded",
            json!({ "rows": raw.len(), "ignored_columns": raw.ignored_columns() }),
        );

        let mut preprocessor =
            Preprocessor::new().with_date_formats(self.config.preprocess.date_formats.clone());
        if let Some(telemetry) = &self.telemetry {
            preprocessor = preprocessor.with_telemetry(telemetry.clone());
        }
        let Preprocessed {
            dataset,
            artifact,
            report,
        } = preprocessor.fit_process(&raw).context("preprocessing")?;

        if let Some(sink) = &self.dataset_sink {
            sink.write(&dataset).context("writing cleaned dataset")?;
        }
        if let Some(path) = &self.artifact_path {
            save_artifact(path, &artifact)
                .with_context(|| format!("writing artifact {}", path.display()))?;
        }
        let dataset_report = DatasetReport::from_dataset(&dataset);
        for sink in &self.report_sinks {
            sink.dataset(&dataset_report).context("publishing dataset report")?;
        }

        let mut selector = ModelSelector::new(self.config.selector_settings());
        if let Some(telemetry) = &self.telemetry {
            selector = selector.with_telemetry(telemetry);
        }
        let selection = selector
            .select_best(&dataset, target)
            .context("model selection")?;

        let selection_report = SelectionReport::from_selection(&selection);
        for line in selection_report.summary() {
            self.log(LogLevel::Info, "selection_summary", json!({ "line": line }));
        }
        for sink in &self.report_sinks {
            sink.selection(&selection_report)
                .context("publishing selection report")?;
        }

        if let Some(sink) = &self.model_sink {
            sink.save(&selection.model).context("saving model")?;
            if let Some(reloaded) = sink.reload().context("reloading model")? {
                let expected = selection.model.predict_dataset(&dataset)?;
                let actual = reloaded.predict_dataset(&dataset)?;
                let drift = expected
                    .iter()
                    .zip(actual.iter())
                    .map(|(e, a)| (e - a).abs() / (1.0 + e.abs()))
                    .fold(0.0, f64::max);
                if drift > 1e-9 {
                    bail!("reloaded model diverges from the trained model (relative drift {drift:e})");
                }
                self.log(LogLevel::Info, "model_reloaded", json!({ "run_id": run_id }));
            }
        }

        Ok(PipelineOutcome {
            run_id: run_id.to_owned(),
            rows_loaded: raw.len(),
            rows_cleaned: dataset.len(),
            duplicates_removed: report.duplicates_removed,
            preprocess: report,
            artifact,
            selection,
        })
    }

    fn log(&self, level: LogLevel, message: &str, metadata: Value) {
        crate::telemetry::log(self.telemetry.as_ref(), level, message, metadata);
    }

    fn event(&self, event_type: &str, payload: Value) {
        crate::telemetry::event(self.telemetry.as_ref(), event_type, payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        schema::{synthetic_sales, RawDataset, RawRecord, TOTAL_SALES},
        sinks::{load_artifact, load_model, CsvCleanedSource},
    };
    use shared_logging::read_records;
    use tempfile::tempdir;

    fn configured(dir: &std::path::Path) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.output.cleaned_csv = Some(dir.join("cleaned.csv"));
        config.output.artifact = Some(dir.join("artifact.json"));
        config.output.model = Some(dir.join("model.json"));
        config.output.report_dir = Some(dir.join("reports"));
        config.output.log_path = Some(dir.join("run.log"));
        config.output.event_log = Some(dir.join("events.log"));
        config
    }

    #[test]
    fn full_run_writes_every_output() {
        let dir = tempdir().unwrap();
        let pipeline = SalesPipeline::from_config(configured(dir.path())).unwrap();
        let outcome = pipeline.run(&synthetic_sales(100, 42)).unwrap();

        assert_eq!(outcome.rows_loaded, 100);
        assert!(outcome.duplicates_removed > 0);
        assert_eq!(outcome.rows_cleaned, 100 - outcome.duplicates_removed);
        assert_eq!(outcome.selection.per_candidate.len(), 3);

        let cleaned = CsvCleanedSource::new(dir.path().join("cleaned.csv")).load().unwrap();
        assert_eq!(cleaned.len(), outcome.rows_cleaned);
        let model = load_model(dir.path().join("model.json")).unwrap();
        assert_eq!(model.family(), outcome.selection.model.family());
        assert_eq!(load_artifact(dir.path().join("artifact.json")).unwrap(), outcome.artifact);
        assert!(dir.path().join("reports").join(JsonReportSink::SELECTION_FILE).exists());

        let messages: Vec<String> = read_records(dir.path().join("run.log"))
            .unwrap()
            .into_iter()
            .map(|r| r.message)
            .collect();
        for expected in ["run_started", "dedup_complete", "winner_selected", "model_reloaded", "run_complete"] {
            assert!(messages.iter().any(|m| m == expected), "missing {expected}");
        }
        let events = std::fs::read_to_string(dir.path().join("events.log")).unwrap();
        assert!(events.contains("report.selection"));
    }

    #[test]
    fn runs_are_reproducible() {
        let raw = synthetic_sales(100, 3);
        let first = SalesPipeline::new(PipelineConfig::default()).run(&raw).unwrap();
        let second = SalesPipeline::new(PipelineConfig::default()).run(&raw).unwrap();
        assert_ne!(first.run_id, second.run_id);
        assert_eq!(first.selection, second.selection);
        assert_eq!(first.artifact, second.artifact);
    }

    #[test]
    fn failure_halts_before_model_is_written() {
        let dir = tempdir().unwrap();
        let rows = (0..20)
            .map(|i| {
                let units = (i + 1).to_string();
                RawRecord::from_cells(["A", "Toys", units.as_str(), "9.99", "2023-01-01"])
            })
            .collect::<Vec<_>>();
        let pipeline = SalesPipeline::from_config(configured(dir.path())).unwrap();
        let err = pipeline.run(&RawDataset::new(rows)).unwrap_err();
        assert!(format!("{err:#}").contains("Unit_Price"));
        assert!(!dir.path().join("model.json").exists());
        let log = read_records(dir.path().join("run.log")).unwrap();
        assert_eq!(log.last().unwrap().message, "run_failed");
    }

    #[test]
    fn custom_target_is_honoured() {
        let mut config = PipelineConfig::default();
        config.selection.target = "Units_Sold".into();
        let outcome = SalesPipeline::new(config).run(&synthetic_sales(80, 8)).unwrap();
        assert_eq!(outcome.selection.model.target(), "Units_Sold");
        assert!(outcome.selection.model.features().iter().any(|f| f == TOTAL_SALES));
    }
}
