//! Error types for cog-tabulate

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while segmenting, transforming, writing or combining trial data
#[derive(Debug, Error)]
pub enum CogError {
    #[error("Run data may not be changed after it has been finalized (set {0})")]
    RunFrozen(i64),

    #[error("Run data has already been finalized (set {0})")]
    AlreadyFinalized(i64),

    #[error("Trial arrived before any run was started: {0}")]
    NoOpenRun(String),

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Unmapped survey question: {0}")]
    UnmappedQuestion(String),

    #[error("File name does not match the task file pattern: {0}")]
    UnmatchedFileName(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Trial order violation: {0}")]
    TrialOrder(String),

    #[error("Invalid set number: {0}")]
    InvalidSetNumber(String),

    #[error("Unexpected trial type in {experiment} export: {trial_type}")]
    UnexpectedTrialType { experiment: String, trial_type: String },

    #[error("Unexpected column in {experiment} export: {column}")]
    UnexpectedColumn { experiment: String, column: String },

    #[error("Date parse error: {0}")]
    DateParseError(String),

    #[error("Invalid session label: {0}")]
    InvalidSession(String),

    #[error("Invalid configuration in {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("Experiment store error during {operation}: {message}")]
    Store { operation: String, message: String },

    #[error("Data platform error during {operation}: {message}")]
    Platform { operation: String, message: String },

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CogError {
    /// Whether this error signals malformed upstream data that must abort the batch.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            CogError::RunFrozen(_)
                | CogError::AlreadyFinalized(_)
                | CogError::NoOpenRun(_)
                | CogError::UnknownTask(_)
                | CogError::UnmappedQuestion(_)
                | CogError::UnmatchedFileName(_)
                | CogError::MissingField(_)
                | CogError::TrialOrder(_)
                | CogError::InvalidSetNumber(_)
                | CogError::UnexpectedTrialType { .. }
                | CogError::UnexpectedColumn { .. }
        )
    }

    /// Whether this error came from a remote collaborator and may be skipped over.
    pub fn is_remote(&self) -> bool {
        matches!(self, CogError::Store { .. } | CogError::Platform { .. })
    }

    pub(crate) fn store(operation: impl Into<String>, message: impl ToString) -> Self {
        CogError::Store {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn platform(operation: impl Into<String>, message: impl ToString) -> Self {
        CogError::Platform {
            operation: operation.into(),
            message: message.to_string(),
        }
    }
}
