use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use shared_logging::LogLevel;

use crate::{
    preprocess::dates::DEFAULT_DATE_FORMATS,
    schema::{DATE, TOTAL_SALES},
    selection::{split::DEFAULT_SEED, SelectorSettings},
    sinks::TextEncoding,
};

/// Pipeline settings loaded from TOML. Every field has a default, so an empty
/// document reproduces the stock pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Input decoding.
    #[serde(default)]
    pub source: SourceConfig,
    /// Cleaning options.
    #[serde(default)]
    pub preprocess: PreprocessConfig,
    /// Model selection options.
    #[serde(default)]
    pub selection: SelectionConfig,
    /// Output locations.
    #[serde(default)]
    pub output: OutputConfig,
}

/// How raw CSV input is read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Field delimiter.
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// Byte encoding of the file.
    #[serde(default)]
    pub encoding: TextEncoding,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            encoding: TextEncoding::default(),
        }
    }
}

/// Cleaning options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// `chrono` formats tried in order when parsing `Date`.
    #[serde(default = "default_date_formats")]
    pub date_formats: Vec<String>,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            date_formats: default_date_formats(),
        }
    }
}

/// Model selection options. The candidate catalogue itself is fixed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Column to predict.
    #[serde(default = "default_target")]
    pub target: String,
    /// Columns never used as features.
    #[serde(default = "default_excluded")]
    pub excluded: Vec<String>,
    /// Held-out fraction.
    #[serde(default = "default_test_ratio")]
    pub test_ratio: f64,
    /// Split seed.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Cross-validation folds.
    #[serde(default = "default_folds")]
    pub folds: usize,
    /// Score grid points in parallel.
    #[serde(default = "default_true")]
    pub parallel: bool,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            target: default_target(),
            excluded: default_excluded(),
            test_ratio: default_test_ratio(),
            seed: default_seed(),
            folds: default_folds(),
            parallel: default_true(),
        }
    }
}

/// Where results are written. Unset paths disable that output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Cleaned dataset CSV.
    #[serde(default)]
    pub cleaned_csv: Option<PathBuf>,
    /// Fitted preprocessing artifact (JSON).
    #[serde(default)]
    pub artifact: Option<PathBuf>,
    /// Winning model (JSON).
    #[serde(default)]
    pub model: Option<PathBuf>,
    /// Directory receiving report payloads.
    #[serde(default)]
    pub report_dir: Option<PathBuf>,
    /// JSON-lines run log.
    #[serde(default)]
    pub log_path: Option<PathBuf>,
    /// JSON-lines event log.
    #[serde(default)]
    pub event_log: Option<PathBuf>,
    /// Minimum level written to the run log.
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            cleaned_csv: None,
            artifact: None,
            model: None,
            report_dir: None,
            log_path: None,
            event_log: None,
            log_level: default_log_level(),
        }
    }
}

impl PipelineConfig {
    /// Loads and validates a TOML file. Relative output paths resolve
    /// against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config {}", path.display()))?;
        let mut config = Self::from_toml(&raw).with_context(|| format!("parsing {}", path.display()))?;
        let base = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        config.output.resolve_relative(&base);
        Ok(config)
    }

    /// Parses and validates a TOML document.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the pipeline can't run with.
    pub fn validate(&self) -> Result<()> {
        let selection = &self.selection;
        if !(selection.test_ratio > 0.0 && selection.test_ratio < 1.0) {
            bail!("selection.test_ratio must be in (0, 1), got {}", selection.test_ratio);
        }
        if selection.folds < 2 {
            bail!("selection.folds must be at least 2, got {}", selection.folds);
        }
        if selection.target.trim().is_empty() {
            bail!("selection.target must not be empty");
        }
        if selection.excluded.contains(&selection.target) {
            bail!("selection.target `{}` is also excluded", selection.target);
        }
        if !self.source.delimiter.is_ascii() {
            bail!("source.delimiter must be a single ASCII character");
        }
        Ok(())
    }

    /// Selector settings derived from `[selection]`.
    #[must_use]
    pub fn selector_settings(&self) -> SelectorSettings {
        SelectorSettings {
            test_ratio: self.selection.test_ratio,
            seed: self.selection.seed,
            folds: self.selection.folds,
            excluded: self.selection.excluded.clone(),
            parallel: self.selection.parallel,
        }
    }
}

impl OutputConfig {
    fn resolve_relative(&mut self, base: &Path) {
        for path in [
            &mut self.cleaned_csv,
            &mut self.artifact,
            &mut self.model,
            &mut self.report_dir,
            &mut self.log_path,
            &mut self.event_log,
        ]
        .into_iter()
        .flatten()
        {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

const fn default_delimiter() -> char {
    ','
}

fn default_date_formats() -> Vec<String> {
    DEFAULT_DATE_FORMATS.iter().map(|f| (*f).to_owned()).collect()
}

fn default_target() -> String {
    TOTAL_SALES.to_owned()
}

fn default_excluded() -> Vec<String> {
    vec![DATE.to_owned()]
}

const fn default_test_ratio() -> f64 {
    0.2
}

const fn default_seed() -> u64 {
    DEFAULT_SEED
}

const fn default_folds() -> usize {
    5
}

const fn default_true() -> bool {
    true
}

const fn default_log_level() -> LogLevel {
    LogLevel::Info
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_document_matches_stock_settings() {
        let config = PipelineConfig::from_toml("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.selector_settings(), SelectorSettings::default());
        assert_eq!(config.source.delimiter, ',');
        assert_eq!(config.preprocess.date_formats.len(), DEFAULT_DATE_FORMATS.len());
    }

    #[test]
    fn overrides_apply_per_section() {
        let config = PipelineConfig::from_toml(
            r#"
            [source]
            delimiter = ";"
            encoding = "latin1"

            [selection]
            folds = 3
            parallel = false

            [output]
            log_level = "DEBUG"
            "#,
        )
        .unwrap();
        assert_eq!(config.source.delimiter, ';');
        assert_eq!(config.source.encoding, TextEncoding::Latin1);
        assert_eq!(config.selection.folds, 3);
        assert!(!config.selection.parallel);
        assert!((config.selection.test_ratio - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.output.log_level, LogLevel::Debug);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        assert!(PipelineConfig::from_toml("[selection]\ntest_ratio = 1.5").is_err());
        assert!(PipelineConfig::from_toml("[selection]\nfolds = 1").is_err());
        assert!(PipelineConfig::from_toml("[selection]\ntarget = \"Date\"").is_err());
    }

    #[test]
    fn relative_output_paths_follow_the_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        fs::write(&path, "[output]\nmodel = \"out/model.json\"\n").unwrap();
        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.output.model, Some(dir.path().join("out/model.json")));
    }
}
