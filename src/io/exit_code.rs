//! Exit codes for CLI operations following Unix conventions.
//!
//! # Exit Code Semantics
//!
//! - `0`: Success - no violations at or above the failure threshold
//! - `1`: General error - unspecified failure
//! - `2`: Blocking - violations at or above the failure threshold were found
//! - `4-6`: Specific recoverable errors
//! - `126-255`: Reserved by shell

use crate::analysis::{CheckReport, Severity};
use crate::error::CheckError;

/// Standard exit codes for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Run completed without blocking violations (code 0)
    Success = 0,

    /// Unspecified error occurred (code 1)
    GeneralError = 1,

    /// Violations at or above `fail_on` were reported (code 2)
    BlockingError = 2,

    /// Failed to parse files (code 4)
    ParseError = 4,

    /// File I/O error (code 5)
    IoError = 5,

    /// Configuration error (code 6)
    ConfigError = 6,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}

impl ExitCode {
    /// Exit code for a finished run.
    ///
    /// Blocking violations win over per-file failures; a run whose only
    /// problems are unreadable or unparsable files maps to the failure kind.
    pub fn from_report(report: &CheckReport, fail_on: Severity) -> Self {
        if report.count_at_least(fail_on) > 0 {
            return ExitCode::BlockingError;
        }

        match report.failures.first() {
            None => ExitCode::Success,
            Some(failure) if failure.code == "FILE_READ_ERROR" => ExitCode::IoError,
            Some(_) => ExitCode::ParseError,
        }
    }

    /// Convert a `CheckError` to the appropriate exit code.
    pub fn from_error(error: &CheckError) -> Self {
        match error {
            CheckError::Parse { .. } => ExitCode::ParseError,
            CheckError::FileRead { .. } | CheckError::PathNotFound { .. } => ExitCode::IoError,
            CheckError::ConfigError { .. } => ExitCode::ConfigError,
            CheckError::Analysis { .. } | CheckError::General(_) => ExitCode::GeneralError,
        }
    }

    #[must_use]
    pub fn is_blocking(&self) -> bool {
        matches!(self, ExitCode::BlockingError)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }

    /// Get a human-readable description of the exit code.
    pub fn description(&self) -> &str {
        match self {
            ExitCode::Success => "Success",
            ExitCode::GeneralError => "General error",
            ExitCode::BlockingError => "Blocking violations found",
            ExitCode::ParseError => "Parse error",
            ExitCode::IoError => "I/O error",
            ExitCode::ConfigError => "Configuration error",
        }
    }
}
