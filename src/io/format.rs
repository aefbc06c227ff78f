//! Format definitions for CLI output.
//!
//! Provides structured format types for consistent JSON responses
//! consumed by CI jobs and editor integrations.

use crate::error::CheckError;
use crate::io::exit_code::ExitCode;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Output format for CLI commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text (default)
    #[default]
    Text,
    /// JSON for tool integration
    Json,
}

impl OutputFormat {
    /// `--json` wins; otherwise the configured format applies.
    #[must_use]
    pub fn resolve(json: bool, configured: &str) -> Self {
        if json {
            Self::Json
        } else {
            configured.parse().unwrap_or_default()
        }
    }

    #[must_use]
    pub fn is_json(&self) -> bool {
        matches!(self, Self::Json)
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown output format '{other}', expected text or json")),
        }
    }
}

/// Standard JSON response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonResponse<T = serde_json::Value>
where
    T: Serialize,
{
    /// Status: "success", "violations" or "error"
    pub status: String,

    /// Result code (e.g., "OK", "VIOLATIONS", "PARSE_ERROR")
    pub code: String,

    /// Human-readable message
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    /// Error details and suggestions (only for errors)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,

    /// Exit code for shell scripts
    pub exit_code: u8,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

/// Error details for JSON responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub suggestions: Vec<String>,
}

/// Response metadata.
#[derive(Debug, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

impl ResponseMeta {
    /// Metadata stamped with the crate version and the current time.
    pub fn now(execution_time_ms: Option<u64>) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Some(format_utc_timestamp()),
            execution_time_ms,
        }
    }
}

impl<T> JsonResponse<T>
where
    T: Serialize,
{
    /// Wrap a payload; the exit code decides status and code.
    pub fn with_exit(data: T, exit_code: ExitCode, message: &str) -> Self {
        let (status, code) = match exit_code {
            ExitCode::Success => ("success", "OK".to_string()),
            ExitCode::BlockingError => ("violations", "VIOLATIONS".to_string()),
            other => ("error", code_name(other)),
        };
        Self {
            status: status.to_string(),
            code,
            message: message.to_string(),
            data: Some(data),
            error: None,
            exit_code: exit_code as u8,
            meta: None,
        }
    }

    pub fn success(data: T) -> Self {
        Self::with_exit(data, ExitCode::Success, "Operation completed successfully")
    }

    pub fn with_meta(mut self, meta: ResponseMeta) -> Self {
        self.meta = Some(meta);
        self
    }
}

impl JsonResponse<serde_json::Value> {
    /// Create an error response from a `CheckError`.
    pub fn from_error(error: &CheckError) -> Self {
        Self {
            status: "error".to_string(),
            code: error.status_code(),
            message: error.to_string(),
            data: None,
            error: Some(ErrorDetails {
                suggestions: error
                    .recovery_suggestions()
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            }),
            exit_code: ExitCode::from_error(error) as u8,
            meta: None,
        }
    }
}

fn code_name(code: ExitCode) -> String {
    match code {
        ExitCode::Success => "OK",
        ExitCode::GeneralError => "GENERAL_ERROR",
        ExitCode::BlockingError => "VIOLATIONS",
        ExitCode::ParseError => "PARSE_ERROR",
        ExitCode::IoError => "IO_ERROR",
        ExitCode::ConfigError => "CONFIG_ERROR",
    }
    .to_string()
}

/// Format current time as UTC timestamp string ("YYYY-MM-DD HH:MM:SS UTC").
pub fn format_utc_timestamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string()
}
