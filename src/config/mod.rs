pub mod toml_config;

use crate::core::scorer::DEFAULT_THRESHOLD;
use crate::domain::model::{InputFormat, InvalidRecordPolicy, OutputFormat};
use crate::domain::ports::ConfigProvider;
use crate::utils::error::{Result, RiskError};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use toml_config::TomlConfig;

pub const DEFAULT_ARTIFACT_PATH: &str = "ml/cardio_model.json";
pub const DEFAULT_OUTPUT_PATH: &str = "./output";
pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_MIN_AGE_YEARS: u32 = 5;

#[cfg(feature = "cli")]
use clap::Parser;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Default, Serialize, Deserialize, Parser)]
#[command(name = "cardio-risk")]
#[command(about = "Cardiovascular risk assessment for batches of clinical observations")]
pub struct CliConfig {
    /// TOML configuration file; flags below override it
    #[arg(short, long)]
    pub config: Option<String>,

    /// Model artifact (JSON tree ensemble)
    #[arg(long)]
    pub model: Option<String>,

    /// Optional model metadata side file
    #[arg(long)]
    pub metadata: Option<String>,

    /// Observations to assess (.csv or .json)
    #[arg(short, long)]
    pub input: Option<String>,

    /// Input format, when it cannot be inferred from the extension
    #[arg(long)]
    pub format: Option<String>,

    #[arg(long)]
    pub output_path: Option<String>,

    /// Comma-separated output formats (json, csv)
    #[arg(long, value_delimiter = ',')]
    pub output_formats: Vec<String>,

    /// Probability at or above which the label is 1
    #[arg(long)]
    pub threshold: Option<f64>,

    #[arg(long)]
    pub concurrency: Option<usize>,

    /// skip (default) or fail
    #[arg(long)]
    pub on_invalid: Option<String>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit JSON log lines")]
    pub json_logs: bool,
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub artifact_path: String,
    pub metadata_path: Option<String>,
    pub threshold: f64,
    pub input_path: String,
    pub input_format: Option<InputFormat>,
    pub output_path: String,
    pub output_formats: Vec<OutputFormat>,
    pub concurrent_assessments: usize,
    pub min_age_years: u32,
    pub on_invalid_record: InvalidRecordPolicy,
    pub verbose: bool,
    pub json_logs: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            artifact_path: DEFAULT_ARTIFACT_PATH.to_string(),
            metadata_path: None,
            threshold: DEFAULT_THRESHOLD,
            input_path: String::new(),
            input_format: None,
            output_path: DEFAULT_OUTPUT_PATH.to_string(),
            output_formats: vec![OutputFormat::Json],
            concurrent_assessments: DEFAULT_CONCURRENCY,
            min_age_years: DEFAULT_MIN_AGE_YEARS,
            on_invalid_record: InvalidRecordPolicy::Skip,
            verbose: false,
            json_logs: false,
        }
    }
}

pub fn parse_input_format(value: &str) -> Result<InputFormat> {
    match value.to_ascii_lowercase().as_str() {
        "csv" => Ok(InputFormat::Csv),
        "json" => Ok(InputFormat::Json),
        _ => Err(RiskError::InvalidConfigValueError {
            field: "input.format".to_string(),
            value: value.to_string(),
            reason: "Valid formats: csv, json".to_string(),
        }),
    }
}

pub fn parse_output_format(value: &str) -> Result<OutputFormat> {
    match value.to_ascii_lowercase().as_str() {
        "json" => Ok(OutputFormat::Json),
        "csv" => Ok(OutputFormat::Csv),
        _ => Err(RiskError::InvalidConfigValueError {
            field: "output.formats".to_string(),
            value: value.to_string(),
            reason: "Valid formats: json, csv".to_string(),
        }),
    }
}

pub fn parse_policy(value: &str) -> Result<InvalidRecordPolicy> {
    match value.to_ascii_lowercase().as_str() {
        "skip" => Ok(InvalidRecordPolicy::Skip),
        "fail" => Ok(InvalidRecordPolicy::Fail),
        _ => Err(RiskError::InvalidConfigValueError {
            field: "processing.on_invalid_record".to_string(),
            value: value.to_string(),
            reason: "Valid values: skip, fail".to_string(),
        }),
    }
}

impl AppConfig {
    pub fn from_toml(file: &TomlConfig) -> Self {
        let mut config = AppConfig {
            artifact_path: file.model.artifact_path.clone(),
            metadata_path: file.model.metadata_path.clone(),
            verbose: file.verbose(),
            json_logs: file.json_logs(),
            ..AppConfig::default()
        };
        if let Some(threshold) = file.model.threshold {
            config.threshold = threshold;
        }
        if let Some(input) = &file.input {
            config.input_path = input.path.clone();
            config.input_format = input.format;
        }
        if let Some(output) = &file.output {
            config.output_path = output.path.clone();
            if let Some(formats) = &output.formats {
                config.output_formats = formats.clone();
            }
        }
        if let Some(processing) = &file.processing {
            if let Some(n) = processing.concurrent_assessments {
                config.concurrent_assessments = n;
            }
            if let Some(age) = processing.min_age_years {
                config.min_age_years = age;
            }
            if let Some(policy) = processing.on_invalid_record {
                config.on_invalid_record = policy;
            }
        }
        config
    }

    /// Config file first, then command-line overrides.
    #[cfg(feature = "cli")]
    pub fn resolve(cli: &CliConfig) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => {
                let file = TomlConfig::from_file(path)?;
                file.validate()?;
                AppConfig::from_toml(&file)
            }
            None => AppConfig::default(),
        };

        if let Some(model) = &cli.model {
            config.artifact_path = model.clone();
        }
        if let Some(metadata) = &cli.metadata {
            config.metadata_path = Some(metadata.clone());
        }
        if let Some(input) = &cli.input {
            config.input_path = input.clone();
        }
        if let Some(format) = &cli.format {
            config.input_format = Some(parse_input_format(format)?);
        }
        if let Some(output) = &cli.output_path {
            config.output_path = output.clone();
        }
        if !cli.output_formats.is_empty() {
            config.output_formats = cli
                .output_formats
                .iter()
                .map(|f| parse_output_format(f))
                .collect::<Result<Vec<_>>>()?;
        }
        if let Some(threshold) = cli.threshold {
            config.threshold = threshold;
        }
        if let Some(n) = cli.concurrency {
            config.concurrent_assessments = n;
        }
        if let Some(policy) = &cli.on_invalid {
            config.on_invalid_record = parse_policy(policy)?;
        }
        config.verbose |= cli.verbose;
        config.json_logs |= cli.json_logs;
        Ok(config)
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_path("model.artifact_path", &self.artifact_path)?;
        if let Some(metadata) = &self.metadata_path {
            validation::validate_path("model.metadata_path", metadata)?;
        }
        validation::validate_range("model.threshold", self.threshold, 0.0, 1.0)?;

        if self.input_path.trim().is_empty() {
            return Err(RiskError::MissingConfigError {
                field: "input.path".to_string(),
            });
        }
        validation::validate_path("input.path", &self.input_path)?;
        if self.input_format.is_none() {
            validation::validate_file_extension("input.path", &self.input_path, &["csv", "json"])?;
        }

        validation::validate_path("output.path", &self.output_path)?;
        if self.output_formats.is_empty() {
            return Err(RiskError::InvalidConfigValueError {
                field: "output.formats".to_string(),
                value: "[]".to_string(),
                reason: "At least one output format is required".to_string(),
            });
        }
        validation::validate_positive_number(
            "processing.concurrent_assessments",
            self.concurrent_assessments,
            1,
        )?;
        Ok(())
    }
}

impl ConfigProvider for AppConfig {
    fn artifact_path(&self) -> &str {
        &self.artifact_path
    }

    fn metadata_path(&self) -> Option<&str> {
        self.metadata_path.as_deref()
    }

    fn threshold(&self) -> f64 {
        self.threshold
    }

    fn input_path(&self) -> &str {
        &self.input_path
    }

    fn input_format(&self) -> InputFormat {
        self.input_format
            .or_else(|| InputFormat::from_path(&self.input_path))
            .unwrap_or(InputFormat::Csv)
    }

    fn output_path(&self) -> &str {
        &self.output_path
    }

    fn output_formats(&self) -> &[OutputFormat] {
        &self.output_formats
    }

    fn concurrent_assessments(&self) -> usize {
        self.concurrent_assessments
    }

    fn min_age_years(&self) -> u32 {
        self.min_age_years
    }

    fn on_invalid_record(&self) -> InvalidRecordPolicy {
        self.on_invalid_record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> AppConfig {
        AppConfig {
            input_path: "checkups.csv".to_string(),
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_defaults_validate_once_input_is_set() {
        assert!(matches!(
            AppConfig::default().validate(),
            Err(RiskError::MissingConfigError { .. })
        ));
        let config = valid();
        assert!(config.validate().is_ok());
        assert_eq!(config.input_format(), InputFormat::Csv);
        assert_eq!(config.min_age_years(), 5);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = valid();
        config.threshold = 1.2;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.concurrent_assessments = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.input_path = "checkups.xlsx".to_string();
        assert!(config.validate().is_err());
        config.input_format = Some(InputFormat::Csv);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_applies_sections() {
        let file = TomlConfig::from_toml_str(
            r#"
[model]
artifact_path = "models/m.json"
threshold = 0.35

[input]
path = "in.json"

[processing]
concurrent_assessments = 2
"#,
        )
        .unwrap();
        let config = AppConfig::from_toml(&file);
        assert_eq!(config.artifact_path, "models/m.json");
        assert_eq!(config.threshold, 0.35);
        assert_eq!(config.input_format(), InputFormat::Json);
        assert_eq!(config.concurrent_assessments, 2);
        assert_eq!(config.output_formats, vec![OutputFormat::Json]);
    }

    #[cfg(feature = "cli")]
    #[test]
    fn test_cli_overrides_defaults() {
        let cli = CliConfig::parse_from([
            "cardio-risk",
            "--input",
            "obs.json",
            "--threshold",
            "0.6",
            "--output-formats",
            "json,csv",
            "--on-invalid",
            "fail",
        ]);
        let config = AppConfig::resolve(&cli).unwrap();
        assert_eq!(config.threshold, 0.6);
        assert_eq!(config.output_formats, vec![OutputFormat::Json, OutputFormat::Csv]);
        assert_eq!(config.on_invalid_record, InvalidRecordPolicy::Fail);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_helpers_reject_unknown_values() {
        assert!(parse_input_format("xml").is_err());
        assert!(parse_output_format("parquet").is_err());
        assert!(parse_policy("retry").is_err());
        assert_eq!(parse_policy("SKIP").unwrap(), InvalidRecordPolicy::Skip);
    }
}
