//! Error types for the report pipeline.
//!
//! Every step of a run returns [`ReportError`]. Configuration problems are
//! gathered into a single [`ConfigError`] listing all of them.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, ReportError>;

/// Every missing or unparsable configuration value found during loading.
#[derive(Error, Debug, Clone, Default, PartialEq, Eq)]
#[error("{}", render(.missing, .invalid))]
pub struct ConfigError {
    /// Required variables that were absent or blank.
    pub missing: Vec<String>,
    /// `(variable, reason)` pairs for values that could not be parsed.
    pub invalid: Vec<(String, String)>,
}

impl ConfigError {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.invalid.is_empty()
    }

    pub fn missing(&mut self, var: &str) {
        self.missing.push(var.to_string());
    }

    pub fn invalid(&mut self, var: &str, reason: impl Into<String>) {
        self.invalid.push((var.to_string(), reason.into()));
    }

    /// `Ok(())` when nothing was recorded, otherwise the collected error.
    pub fn into_result(self) -> std::result::Result<(), ConfigError> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

fn render(missing: &[String], invalid: &[(String, String)]) -> String {
    let mut parts = Vec::new();
    if !missing.is_empty() {
        parts.push(format!("missing environment variables: {}", missing.join(", ")));
    }
    for (var, reason) in invalid {
        parts.push(format!("invalid {var}: {reason}"));
    }
    parts.join("; ")
}

/// Errors that end a pipeline run.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("data source error: {message}")]
    DataSource {
        message: String,
        status: Option<u16>,
    },

    /// Fewer usable rows than the business rules require.
    #[error("not enough tweets: found {found}, at least {required} required")]
    NotEnoughTweets { found: usize, required: usize },

    #[error("AI service error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    AiService {
        message: String,
        status: Option<u16>,
        body: Option<String>,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ReportError {
    /// Stable category name used in logs and run summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            ReportError::Configuration(_) => "ConfigurationError",
            ReportError::DataSource { .. } | ReportError::NotEnoughTweets { .. } => {
                "DataSourceError"
            }
            ReportError::AiService { .. } => "AIServiceError",
            ReportError::Io { .. } => "IOError",
        }
    }

    pub(crate) fn data_source(message: impl Into<String>) -> Self {
        ReportError::DataSource {
            message: message.into(),
            status: None,
        }
    }

    pub(crate) fn ai_service(message: impl Into<String>) -> Self {
        ReportError::AiService {
            message: message.into(),
            status: None,
            body: None,
        }
    }

    /// HTTP status carried by the error, when the failure came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ReportError::DataSource { status, .. } | ReportError::AiService { status, .. } => {
                *status
            }
            _ => None,
        }
    }
}
