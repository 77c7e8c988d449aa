//! Error taxonomy for the upload pipeline.
//!
//! Per-file and per-task errors are values carried in reports and task
//! records; only [`StartError`] and [`SelectionError`] are returned to the
//! caller as failures.

use crate::services::validator::format_file_size;
use std::time::Duration;
use thiserror::Error;

/// Why a candidate file was refused entry into the selection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error(
        "File too large ({}). Maximum size is {}",
        format_file_size(*.size),
        format_file_size(*.max)
    )]
    TooLarge { size: u64, max: u64 },
    #[error("Invalid file type. Supported formats: {}", .allowed.join(", "))]
    InvalidType { allowed: Vec<String> },
    #[error("File is empty")]
    Empty,
}

/// Why a patient identifier was rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PatientIdError {
    #[error("patient ID is empty")]
    Empty,
    #[error("patient ID is {len} characters long (maximum {max})")]
    TooLong { len: usize, max: usize },
    #[error("patient ID contains forbidden character {0:?}")]
    ForbiddenCharacter(char),
}

/// Why `start` returned without a summary. The precondition failures
/// create no task.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("No files selected")]
    EmptySelection,
    #[error("Please enter a valid Patient ID")]
    InvalidPatientId(#[source] PatientIdError),
    #[error("Upload already in progress")]
    Busy,
    /// The batch driver was cancelled, e.g. by runtime shutdown.
    #[error("Upload interrupted: {0}")]
    Interrupted(String),
}

/// Failures of selection edits.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("Upload already in progress")]
    Busy,
    #[error("no file at position {index} (selection holds {len})")]
    OutOfRange { index: usize, len: usize },
}

/// Terminal failure of a single upload task. The `Display` output is the
/// reason shown next to the file.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    /// No response could be obtained from the endpoint.
    #[error("Network error")]
    Network { detail: String },
    /// The endpoint answered with a non-200 status.
    #[error("HTTP {0}")]
    Http(u16),
    /// A 200 response whose body could not be understood.
    #[error("Invalid response")]
    InvalidResponse,
    /// A 200 response explicitly reporting failure.
    #[error("{0}")]
    Rejected(String),
    #[error("Timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("Cannot read file: {0}")]
    Unreadable(String),
    #[error("Upload task aborted: {0}")]
    Aborted(String),
}

pub type SelectionResult<T> = Result<T, SelectionError>;

pub type StartResult<T> = Result<T, StartError>;
