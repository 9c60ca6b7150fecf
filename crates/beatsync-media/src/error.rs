//! Error types for external tool invocations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while running external tools.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Processor not found: {0}")]
    ProcessorNotFound(String),

    #[error("Processor script not found: {0}")]
    ScriptNotFound(PathBuf),

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Processor exited with non-zero status")]
    ProcessorFailed {
        stderr: String,
        exit_code: Option<i32>,
    },

    #[error("Processor succeeded but produced no output at {0}")]
    MissingOutput(PathBuf),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),
}

/// Coarse classification of a failed processing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The processor ran past its budget and was killed.
    Timeout,
    /// The processor exited non-zero.
    ProcessError,
    /// The processor exited zero without writing its output.
    MissingOutput,
    /// Anything else (spawn failure, I/O).
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::ProcessError => "process_error",
            FailureKind::MissingOutput => "missing_output",
            FailureKind::Internal => "internal",
        }
    }
}

impl MediaError {
    /// Create a processor failure error.
    pub fn processor_failed(stderr: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self::ProcessorFailed {
            stderr: stderr.into(),
            exit_code,
        }
    }

    /// Classify this error for reporting.
    pub fn kind(&self) -> FailureKind {
        match self {
            MediaError::Timeout(_) => FailureKind::Timeout,
            MediaError::ProcessorFailed { .. } => FailureKind::ProcessError,
            MediaError::MissingOutput(_) => FailureKind::MissingOutput,
            _ => FailureKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(MediaError::Timeout(600).kind(), FailureKind::Timeout);
        assert_eq!(
            MediaError::processor_failed("boom", Some(1)).kind(),
            FailureKind::ProcessError
        );
        assert_eq!(
            MediaError::MissingOutput(PathBuf::from("out.mp4")).kind(),
            FailureKind::MissingOutput
        );
        assert_eq!(
            MediaError::InvalidVideo("x".into()).kind(),
            FailureKind::Internal
        );
    }
}
