#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Salesforge learning stack: raw sales records in, cleaned feature frame and
//! best-performing regression model out.

/// Fixed raw schema and raw record ingestion.
#[path = "../schema.rs"]
pub mod schema;

/// Typed error taxonomy (schema, data quality, training).
#[path = "../errors.rs"]
pub mod errors;

/// Structured logging and event emission.
#[path = "../telemetry.rs"]
pub mod telemetry;

/// TOML pipeline configuration.
#[path = "../config.rs"]
pub mod config;

/// Ordered cleaning, encoding and normalization.
#[path = "../preprocess/mod.rs"]
pub mod preprocess;

/// Regression estimators.
#[path = "../models/mod.rs"]
pub mod models;

/// Grid search, cross-validation and best-model selection.
#[path = "../selection/mod.rs"]
pub mod selection;

/// Summary payloads handed to reporting sinks.
#[path = "../reporting.rs"]
pub mod reporting;

/// Dataset, report and model collaborators.
#[path = "../sinks.rs"]
pub mod sinks;

/// End-to-end pipeline runtime.
#[path = "../runtime.rs"]
pub mod runtime;

pub use config::PipelineConfig;
pub use errors::{DataQualityError, PipelineError, PipelineResult, SchemaError, TrainingError};
pub use models::{HyperParams, ModelFamily, TrainedModel};
pub use preprocess::{
    frame::{CleanedDataset, ColumnData},
    scale::NormalizationParams,
    PreprocessArtifact, Preprocessed, Preprocessor,
};
pub use reporting::DatasetReport;
pub use runtime::{PipelineOutcome, SalesPipeline};
pub use schema::{synthetic_sales, RawDataset, RawRecord};
pub use selection::{
    metrics::EvaluationResult, reporter::SelectionReport, ModelSelector, Selection,
    SelectorSettings,
};
pub use telemetry::{LearningTelemetry, LearningTelemetryBuilder};
