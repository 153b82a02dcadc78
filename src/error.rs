//! Error taxonomy for the ingest pipeline.
//!
//! Errors fall into two groups. Chain-aborting errors (malformed input,
//! rule cycles, I/O and configuration failures) travel straight to the
//! terminal consumer. Per-record errors raised inside a stage are handed to
//! the upstream cursor, which decides whether they become fatal.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while building or running a pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// An input line could not be turned into a record.
    #[error("Error parsing line {line_number}: {reason}\n{line}")]
    Parse {
        line_number: u64,
        line: String,
        reason: String,
    },

    /// More than the allowed number of geo rules applied to one location.
    #[error(
        "more than {limit} geographic location rules applied to {start:?}; the rule set contains a cycle"
    )]
    RuleCycle { start: [String; 4], limit: usize },

    /// A stage needed a field the record does not carry.
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    /// A field holds a value a stage cannot work with.
    #[error("Invalid value {value:?} for field {field}: {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// A geo substitution rule file line is malformed.
    #[error("{}:{line_number}: {reason}", path.display())]
    RuleFile {
        path: PathBuf,
        line_number: usize,
        reason: String,
    },

    /// An annotation file line is malformed.
    #[error("{}:{line_number}: {reason}", path.display())]
    AnnotationFile {
        path: PathBuf,
        line_number: usize,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl PipelineError {
    /// Whether the error ends the whole chain without consulting upstream
    /// cursors.
    pub fn aborts_chain(&self) -> bool {
        !matches!(
            self,
            PipelineError::MissingField { .. }
                | PipelineError::InvalidValue { .. }
                | PipelineError::Json(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
