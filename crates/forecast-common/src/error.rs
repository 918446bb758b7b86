//! Error types shared by the forecast runner crates.

use thiserror::Error;

/// Result type alias using ForecastError.
pub type Result<T> = std::result::Result<T, ForecastError>;

/// Primary error type for field, request and archive operations.
#[derive(Debug, Error)]
pub enum ForecastError {
    // === Configuration Errors ===
    #[error("Invalid configuration for '{field}': {message}")]
    Config { field: String, message: String },

    // === Expected Conditions ===
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Request is empty after filtering: {0}")]
    EmptyRequest(String),

    // === Data Integrity Errors ===
    #[error("{}", combinations_message("The following", .what, .missing, ("is not available", "are not available")))]
    MissingCombinations { what: String, missing: Vec<String> },

    #[error("{}", combinations_message("Unexpected", .what, .extra, ("returned", "returned")))]
    UnexpectedCombinations { what: String, extra: Vec<String> },

    #[error("Field {field} has different values for {key}: {}", .values.join(", "))]
    ArchiveConflict {
        field: String,
        key: String,
        values: Vec<String>,
    },

    #[error("Hindcast date mismatch: field date {date} does not match reference date {reference_date} (hdate={hdate})")]
    HindcastMismatch {
        date: i64,
        reference_date: i64,
        hdate: String,
    },

    #[error("{kind} values found in field {field}")]
    NonFinite { kind: &'static str, field: String },

    #[error("Data integrity error: {0}")]
    Integrity(String),

    // === Infrastructure Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ForecastError {
    /// Shorthand for a configuration error naming the offending field.
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        ForecastError::Config {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Whether this error must abort the run.
    ///
    /// Missing parameters and empty filtered requests are reported to the
    /// caller as ordinary results; everything else terminates.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ForecastError::MissingParameter(_) | ForecastError::EmptyRequest(_)
        )
    }
}

fn combinations_message(
    prefix: &str,
    what: &str,
    items: &[String],
    (singular, plural): (&str, &str),
) -> String {
    match items {
        [single] => format!("{} {} parameter '{}' {}", prefix, what, single, singular),
        many => format!(
            "{} {} parameters [{}] {}",
            prefix,
            what,
            many.join(", "),
            plural
        ),
    }
}
