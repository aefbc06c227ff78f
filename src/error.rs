//! Error types for the transaction checker
//!
//! This module provides structured error types using thiserror for better
//! error handling and actionable error messages. Unrecognized code shapes are
//! never errors: the checker simply tracks less.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for checking files and directories
#[derive(Error, Debug)]
pub enum CheckError {
    /// File system errors
    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse Go file '{path}': {source}")]
    Parse { path: PathBuf, source: ParseError },

    /// Internal analyzer defects. These abort the run.
    #[error("Internal analyzer error in function '{function}' of '{path}': {source}")]
    Analysis {
        path: PathBuf,
        function: String,
        source: AnalysisError,
    },

    #[error("Path '{path}' does not exist")]
    PathNotFound { path: PathBuf },

    /// Configuration errors
    #[error("Invalid configuration: {reason}")]
    ConfigError { reason: String },

    /// General errors for cases where we need to preserve existing behavior
    #[error("{0}")]
    General(String),
}

impl CheckError {
    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::FileRead { .. } => "FILE_READ_ERROR",
            Self::Parse { .. } => "PARSE_ERROR",
            Self::Analysis { .. } => "INTERNAL_ANALYSIS_ERROR",
            Self::PathNotFound { .. } => "PATH_NOT_FOUND",
            Self::ConfigError { .. } => "CONFIG_ERROR",
            Self::General(_) => "GENERAL_ERROR",
        }
        .to_string()
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::FileRead { .. } => vec![
                "Check that the file exists and you have read permissions",
                "Ensure the file is not locked by another process",
            ],
            Self::Parse { .. } => vec![
                "Check that the file is valid UTF-8 Go source",
                "Run 'gofmt -l' on the file to locate syntax problems",
            ],
            Self::Analysis { .. } => vec![
                "This is a bug in txguard, please report it with the offending function",
                "Add the file to .txguardignore to unblock the run",
            ],
            Self::PathNotFound { .. } => vec!["Check the path passed to 'txguard check'"],
            Self::ConfigError { .. } => vec![
                "Run 'txguard config' to inspect the effective settings",
                "Run 'txguard init --force' to regenerate .txguard/settings.toml",
            ],
            Self::General(_) => vec![],
        }
    }
}

/// Errors specific to parsing operations
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Failed to initialize {language} parser: {reason}")]
    ParserInit { language: String, reason: String },

    #[error("Invalid UTF-8 in source file")]
    InvalidUtf8,

    #[error("tree-sitter produced no syntax tree")]
    SyntaxTreeUnavailable,
}

/// Errors raised while walking one function body.
///
/// `ScopeUnderflow` and `UnknownScope` are invariant violations inside the
/// tracker. The step and nesting limits are recoverable and only drop the
/// function.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("scope stack underflow: attempted to pop the function scope")]
    ScopeUnderflow,

    #[error("scope index {index} is not present in the scope arena")]
    UnknownScope { index: usize },

    #[error("step limit of {limit} statements exceeded")]
    StepLimitExceeded { limit: usize },

    #[error("nesting deeper than {limit} levels")]
    NestingLimitExceeded { limit: usize },
}

impl AnalysisError {
    /// Whether the error should abort the whole run rather than one function.
    pub fn is_internal(&self) -> bool {
        !matches!(
            self,
            Self::StepLimitExceeded { .. } | Self::NestingLimitExceeded { .. }
        )
    }
}

/// Result type alias for check operations
pub type CheckResult<T> = Result<T, CheckError>;

/// Result type alias for parse operations
pub type ParseResult<T> = Result<T, ParseError>;

/// Result type alias for the per-function walk
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Helper trait for adding context to errors
pub trait ErrorContext<T> {
    /// Add context to an error
    fn context(self, msg: &str) -> Result<T, CheckError>;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, msg: &str) -> Result<T, CheckError> {
        self.map_err(|e| CheckError::General(format!("{msg}: {e}")))
    }
}
