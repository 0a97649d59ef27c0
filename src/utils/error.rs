use thiserror::Error;

#[derive(Error, Debug)]
pub enum RiskError {
    #[error("Invalid input for '{field}': {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Model unavailable: {message}")]
    ModelUnavailable { message: String },

    #[error("Attribution explainer unavailable: {reason}")]
    ExplainerUnavailable { reason: String },

    #[error("Computation error: {message}")]
    ComputationError { message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    Model,
    Computation,
    Configuration,
    Io,
    Processing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskError {
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        RiskError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn model_unavailable(message: impl Into<String>) -> Self {
        RiskError::ModelUnavailable {
            message: message.into(),
        }
    }

    pub fn computation(message: impl Into<String>) -> Self {
        RiskError::ComputationError {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            RiskError::InvalidInput { .. } => ErrorCategory::Input,
            RiskError::ModelUnavailable { .. } | RiskError::ExplainerUnavailable { .. } => {
                ErrorCategory::Model
            }
            RiskError::ComputationError { .. } => ErrorCategory::Computation,
            RiskError::IoError(_) => ErrorCategory::Io,
            RiskError::SerializationError(_)
            | RiskError::CsvError(_)
            | RiskError::ProcessingError { .. } => ErrorCategory::Processing,
            RiskError::ConfigError { .. }
            | RiskError::ConfigValidationError { .. }
            | RiskError::InvalidConfigValueError { .. }
            | RiskError::MissingConfigError { .. } => ErrorCategory::Configuration,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            RiskError::ExplainerUnavailable { .. } => ErrorSeverity::Low,
            RiskError::InvalidInput { .. } | RiskError::ComputationError { .. } => {
                ErrorSeverity::Medium
            }
            RiskError::ModelUnavailable { .. } => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    /// Serving must not continue after a fatal error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RiskError::ModelUnavailable { .. })
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            RiskError::InvalidInput { .. } => {
                "Check that all nine observation fields are present and within their ranges"
            }
            RiskError::ModelUnavailable { .. } => {
                "Fix or replace the model artifact, then restart the process"
            }
            RiskError::ExplainerUnavailable { .. } => {
                "Re-export the model with node cover statistics to enable attributions"
            }
            RiskError::ComputationError { .. } => {
                "Inspect the observation and the model artifact for non-finite values"
            }
            RiskError::IoError(_) => "Check that the file exists and the path is readable/writable",
            RiskError::SerializationError(_) | RiskError::CsvError(_) => {
                "Check the input file format"
            }
            RiskError::ConfigError { .. }
            | RiskError::ConfigValidationError { .. }
            | RiskError::InvalidConfigValueError { .. }
            | RiskError::MissingConfigError { .. } => "Review the configuration file and CLI flags",
            RiskError::ProcessingError { .. } => "Re-run with --verbose for details",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            RiskError::InvalidInput { field, reason } => {
                format!("Observation field '{}' is invalid: {}", field, reason)
            }
            RiskError::ModelUnavailable { .. } => {
                "The risk model could not be loaded; assessments are not possible".to_string()
            }
            RiskError::MissingConfigError { field } => {
                format!("Required setting '{}' is missing", field)
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RiskError>;
