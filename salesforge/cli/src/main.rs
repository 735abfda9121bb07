use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use salesforge_learning::{
    reporting::describe_raw,
    schema::synthetic_sales,
    sinks::{
        load_artifact, load_model, save_artifact, CsvCleanedSource, CsvDatasetSink,
        CsvDatasetSource, DatasetSink, DatasetSource, JsonModelSink, ModelSink,
    },
    LearningTelemetry, ModelSelector, PipelineConfig, Preprocessor, SalesPipeline,
    SelectionReport,
};
use serde::Serialize;
use serde_json::json;
use shared_event_bus::FileEventPublisher;
use shared_logging::LogLevel;

#[derive(Parser, Debug)]
#[command(name = "salesforge", version, about = "Sales data cleaning and model selection")]
struct Cli {
    /// JSON-lines run log.
    #[arg(long, global = true)]
    log: Option<PathBuf>,
    /// JSON-lines event log.
    #[arg(long, global = true)]
    event_log: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Cleans a raw CSV, selects the best model and writes configured outputs.
    Run(RunArgs),
    /// Cleans a raw CSV and stores the cleaned rows and fitted artifact.
    Preprocess {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long)]
        artifact: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Selects the best model for an already-cleaned CSV.
    Train {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        model: PathBuf,
        #[arg(long)]
        target: Option<String>,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Prints descriptive statistics of a raw CSV.
    Describe {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Applies a stored artifact and model to new raw rows.
    Predict {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        artifact: PathBuf,
        #[arg(long)]
        model: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Raw sales CSV.
    #[arg(long, required_unless_present = "synthetic")]
    input: Option<PathBuf>,
    /// Pipeline TOML.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides `selection.target`.
    #[arg(long)]
    target: Option<String>,
    /// Generates this many synthetic rows instead of reading `--input`.
    #[arg(long, conflicts_with = "input")]
    synthetic: Option<usize>,
    /// Seed for `--synthetic`.
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

#[derive(Debug, Serialize)]
struct PredictionRow {
    row: usize,
    prediction: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    prediction_original_units: Option<f64>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let telemetry = Telemetry {
        log: cli.log,
        event_log: cli.event_log,
    };
    match cli.command {
        Commands::Run(args) => handle_run(args, &telemetry),
        Commands::Preprocess {
            input,
            output,
            artifact,
            config,
        } => handle_preprocess(&input, output, &artifact, config, &telemetry),
        Commands::Train {
            input,
            model,
            target,
            config,
        } => handle_train(&input, model, target, config, &telemetry),
        Commands::Describe { input, config } => {
            let config = load_config(config)?;
            let raw = csv_source(&input, &config).load()?;
            let stats = describe_raw(&raw).context("describing input")?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        Commands::Predict {
            input,
            artifact,
            model,
            config,
        } => handle_predict(&input, &artifact, &model, config, &telemetry),
    }
}

/// Global `--log` / `--event-log` flags.
struct Telemetry {
    log: Option<PathBuf>,
    event_log: Option<PathBuf>,
}

impl Telemetry {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(path) = &self.log {
            config.output.log_path = Some(path.clone());
        }
        if let Some(path) = &self.event_log {
            config.output.event_log = Some(path.clone());
        }
    }

    fn build(&self, config: &PipelineConfig) -> Result<Option<LearningTelemetry>> {
        let log = self.log.as_ref().or(config.output.log_path.as_ref());
        let events = self.event_log.as_ref().or(config.output.event_log.as_ref());
        if log.is_none() && events.is_none() {
            return Ok(None);
        }
        let mut builder = LearningTelemetry::builder("cli").min_level(config.output.log_level);
        if let Some(path) = log {
            builder = builder.log_path(path);
        }
        if let Some(path) = events {
            builder = builder.event_publisher(Arc::new(FileEventPublisher::new(path)?));
        }
        builder.build().map(Some)
    }
}

fn load_config(path: Option<PathBuf>) -> Result<PipelineConfig> {
    path.map_or_else(|| Ok(PipelineConfig::default()), PipelineConfig::load)
}

fn csv_source(input: &Path, config: &PipelineConfig) -> CsvDatasetSource {
    CsvDatasetSource::new(input)
        .with_delimiter(config.source.delimiter)
        .with_encoding(config.source.encoding)
}

fn handle_run(args: RunArgs, telemetry: &Telemetry) -> Result<()> {
    let mut config = load_config(args.config)?;
    if let Some(target) = args.target {
        config.selection.target = target;
    }
    config.validate()?;
    telemetry.apply(&mut config);
    let pipeline = SalesPipeline::from_config(config)?;

    let outcome = match (args.synthetic, args.input) {
        (Some(rows), _) => pipeline.run(&synthetic_sales(rows, args.seed))?,
        (None, Some(input)) => pipeline.run(&csv_source(&input, pipeline.config()))?,
        (None, None) => anyhow::bail!("either --input or --synthetic is required"),
    };
    let report = outcome.summary();
    for line in report.summary() {
        eprintln!("{line}");
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "run_id": outcome.run_id,
            "rows_loaded": outcome.rows_loaded,
            "rows_cleaned": outcome.rows_cleaned,
            "duplicates_removed": outcome.duplicates_removed,
            "selection": report,
        }))?
    );
    Ok(())
}

fn handle_preprocess(
    input: &Path,
    output: PathBuf,
    artifact: &Path,
    config: Option<PathBuf>,
    telemetry: &Telemetry,
) -> Result<()> {
    let config = load_config(config)?;
    let telemetry = telemetry.build(&config)?;
    let raw = csv_source(input, &config)
        .load()
        .with_context(|| format!("reading {}", input.display()))?;
    let mut preprocessor = Preprocessor::new().with_date_formats(config.preprocess.date_formats.clone());
    if let Some(telemetry) = &telemetry {
        preprocessor = preprocessor.with_telemetry(telemetry.clone());
    }
    let processed = preprocessor.fit_process(&raw)?;
    CsvDatasetSink::new(output).write(&processed.dataset)?;
    save_artifact(artifact, &processed.artifact)?;
    println!("{}", serde_json::to_string_pretty(&processed.report)?);
    Ok(())
}

fn handle_train(
    input: &Path,
    model: PathBuf,
    target: Option<String>,
    config: Option<PathBuf>,
    telemetry: &Telemetry,
) -> Result<()> {
    let mut config = load_config(config)?;
    if let Some(target) = target {
        config.selection.target = target;
    }
    config.validate()?;
    let telemetry = telemetry.build(&config)?;
    let dataset = CsvCleanedSource::new(input)
        .load()
        .with_context(|| format!("reading cleaned dataset {}", input.display()))?;
    let mut selector = ModelSelector::new(config.selector_settings());
    if let Some(telemetry) = &telemetry {
        selector = selector.with_telemetry(telemetry);
    }
    let selection = selector.select_best(&dataset, &config.selection.target)?;
    JsonModelSink::new(model).save(&selection.model)?;
    let report = SelectionReport::from_selection(&selection);
    for line in report.summary() {
        eprintln!("{line}");
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn handle_predict(
    input: &Path,
    artifact: &Path,
    model: &Path,
    config: Option<PathBuf>,
    telemetry: &Telemetry,
) -> Result<()> {
    let config = load_config(config)?;
    let telemetry = telemetry.build(&config)?;
    let artifact = load_artifact(artifact)
        .with_context(|| format!("reading artifact {}", artifact.display()))?;
    let model = load_model(model).with_context(|| format!("reading model {}", model.display()))?;
    let raw = csv_source(input, &config).load()?;
    let (dataset, report) = artifact.transform_with_telemetry(&raw, telemetry.as_ref())?;
    if report.unknown_labels > 0 {
        if let Some(telemetry) = &telemetry {
            let _ = telemetry.log(
                LogLevel::Warn,
                "unknown_labels_at_prediction",
                json!({ "count": report.unknown_labels }),
            );
        }
    }
    let predictions = model.predict_dataset(&dataset)?;
    for (row, prediction) in predictions.iter().enumerate() {
        let line = PredictionRow {
            row,
            prediction: *prediction,
            prediction_original_units: artifact.normalization.invert(model.target(), *prediction),
        };
        println!("{}", serde_json::to_string(&line)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn run_rejects_input_with_synthetic() {
        let err = Cli::try_parse_from([
            "salesforge",
            "run",
            "--input",
            "sales.csv",
            "--synthetic",
            "50",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
        assert!(Cli::try_parse_from(["salesforge", "run"]).is_err());
    }

    #[test]
    fn global_log_flag_reaches_subcommands() {
        let cli = Cli::try_parse_from([
            "salesforge",
            "describe",
            "--input",
            "sales.csv",
            "--log",
            "run.jsonl",
        ])
        .unwrap();
        assert_eq!(cli.log, Some(PathBuf::from("run.jsonl")));
        assert!(matches!(cli.command, Commands::Describe { .. }));
    }

    #[test]
    fn preprocess_writes_cleaned_rows_and_artifact() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("sales.csv");
        fs::write(
            &input,
            "Store,Category,Units_Sold,Unit_Price,Date\n\
             A,Toys,3,2.5,2023-01-02\n\
             B,Food,,4.0,2023-01-03\n\
             A,Food,7,NA,2023-02-10\n\
             C,Toys,1,9.5,bad\n\
             A,Toys,3,2.5,2023-01-02\n",
        )
        .unwrap();
        let output = dir.path().join("cleaned.csv");
        let artifact = dir.path().join("artifact.json");
        let log = dir.path().join("run.jsonl");
        let telemetry = Telemetry {
            log: Some(log.clone()),
            event_log: None,
        };

        handle_preprocess(&input, output.clone(), &artifact, None, &telemetry).unwrap();

        let cleaned = CsvCleanedSource::new(&output).load().unwrap();
        assert_eq!(cleaned.len(), 4);
        let raw = csv_source(&input, &PipelineConfig::default()).load().unwrap();
        let (replayed, _) = load_artifact(&artifact).unwrap().transform(&raw).unwrap();
        assert_eq!(replayed.len(), 5);
        assert!(!shared_logging::read_records(&log).unwrap().is_empty());
    }

    #[test]
    fn telemetry_is_skipped_without_paths() {
        let telemetry = Telemetry {
            log: None,
            event_log: None,
        };
        assert!(telemetry.build(&PipelineConfig::default()).unwrap().is_none());
    }
}
