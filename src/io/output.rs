//! Output management for CLI commands.
//!
//! Handles formatting and display of check reports and errors, providing a
//! unified interface for text and JSON output.

use crate::analysis::{CheckReport, Diagnostic, Severity};
use crate::display::{THEME, create_summary_table};
use crate::error::CheckError;
use crate::io::exit_code::ExitCode;
use crate::io::format::{JsonResponse, OutputFormat, ResponseMeta};
use serde::Serialize;
use std::io::{self, Write};

/// Manages output formatting and display.
pub struct OutputManager {
    format: OutputFormat,
    stdout: Box<dyn Write>,
    stderr: Box<dyn Write>,
}

impl OutputManager {
    /// Create a new output manager with the specified format.
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            stdout: Box::new(io::stdout()),
            stderr: Box::new(io::stderr()),
        }
    }

    /// Create an output manager with custom writers.
    pub fn new_with_writers(
        format: OutputFormat,
        stdout: Box<dyn Write>,
        stderr: Box<dyn Write>,
    ) -> Self {
        Self {
            format,
            stdout,
            stderr,
        }
    }

    /// Print a finished run and return the exit code it maps to.
    ///
    /// Text mode prints one line per violation grouped by file, the files
    /// that could not be checked, then the summary table.
    pub fn report(&mut self, report: &CheckReport, fail_on: Severity) -> io::Result<ExitCode> {
        let code = ExitCode::from_report(report, fail_on);

        match self.format {
            OutputFormat::Json => {
                let message = format!(
                    "{} violations in {} files",
                    report.diagnostics.len(),
                    report.files_checked
                );
                let response = JsonResponse::with_exit(report, code, &message)
                    .with_meta(ResponseMeta::now(Some(report.elapsed_ms)));
                writeln!(self.stdout, "{}", serde_json::to_string_pretty(&response)?)?;
            }
            OutputFormat::Text => {
                let mut current = None;
                for diagnostic in &report.diagnostics {
                    if current.is_some() && current != Some(&diagnostic.file) {
                        writeln!(self.stdout)?;
                    }
                    current = Some(&diagnostic.file);
                    writeln!(self.stdout, "{}", format_diagnostic(diagnostic))?;
                }

                for failure in &report.failures {
                    writeln!(
                        self.stderr,
                        "{}",
                        THEME.warning_with_icon(&format!(
                            "{}: {}",
                            failure.file.display(),
                            failure.message
                        ))
                    )?;
                }

                if !report.diagnostics.is_empty() {
                    writeln!(self.stdout)?;
                }
                writeln!(self.stdout, "{}", create_summary_table(report))?;

                let verdict = if code.is_blocking() {
                    THEME.error_with_icon(&format!(
                        "{} violations at or above {fail_on}",
                        report.count_at_least(fail_on)
                    ))
                } else if report.diagnostics.is_empty() {
                    THEME.success_with_icon("No transaction lifecycle violations")
                } else {
                    THEME.success_with_icon(&format!("No violations at or above {fail_on}"))
                };
                writeln!(self.stdout, "{verdict}")?;
            }
        }

        Ok(code)
    }

    /// Output a serializable value: pretty JSON or its TOML rendering.
    pub fn value<T: Serialize>(&mut self, value: &T, text: &str) -> io::Result<ExitCode> {
        match self.format {
            OutputFormat::Json => {
                let response = JsonResponse::success(value);
                writeln!(self.stdout, "{}", serde_json::to_string_pretty(&response)?)?;
            }
            OutputFormat::Text => writeln!(self.stdout, "{text}")?,
        }
        Ok(ExitCode::Success)
    }

    /// Output an error with suggestions.
    pub fn error(&mut self, error: &CheckError) -> io::Result<ExitCode> {
        match self.format {
            OutputFormat::Json => {
                let response = JsonResponse::from_error(error);
                writeln!(self.stderr, "{}", serde_json::to_string_pretty(&response)?)?;
            }
            OutputFormat::Text => {
                writeln!(self.stderr, "{}", THEME.error_with_icon(&format!("Error: {error}")))?;
                for suggestion in error.recovery_suggestions() {
                    writeln!(self.stderr, "  Suggestion: {suggestion}")?;
                }
            }
        }
        Ok(ExitCode::from_error(error))
    }

    /// Informational message (text mode only).
    pub fn info(&mut self, message: &str) -> io::Result<()> {
        if matches!(self.format, OutputFormat::Text) {
            writeln!(self.stdout, "{message}")?;
        }
        Ok(())
    }
}

/// `path:line:col: severity kind: message (function)` with a one-based column.
pub fn format_diagnostic(diagnostic: &Diagnostic) -> String {
    let violation = &diagnostic.violation;
    format!(
        "{}:{}:{}: {} {}: {} ({})",
        THEME.apply(&THEME.path, diagnostic.file.display()),
        THEME.apply(&THEME.number, diagnostic.range.start_line),
        THEME.apply(&THEME.number, u32::from(diagnostic.range.start_column) + 1),
        THEME.apply(&THEME.severity(violation.severity), violation.severity),
        violation.kind,
        violation.message,
        THEME.apply(&THEME.code, &violation.function),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{FileFailure, Violation, ViolationKind};
    use crate::types::{Range, Span};
    use parking_lot::Mutex;
    use std::path::PathBuf;
    use std::sync::Arc;

    /// Writer whose contents survive the manager.
    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).to_string()
        }
    }

    fn manager(format: OutputFormat) -> (OutputManager, SharedBuffer, SharedBuffer) {
        let stdout = SharedBuffer::default();
        let stderr = SharedBuffer::default();
        let manager = OutputManager::new_with_writers(
            format,
            Box::new(stdout.clone()),
            Box::new(stderr.clone()),
        );
        (manager, stdout, stderr)
    }

    fn sample_report() -> CheckReport {
        CheckReport {
            files_checked: 2,
            functions_checked: 3,
            diagnostics: vec![Diagnostic {
                file: PathBuf::from("store/orders.go"),
                range: Range::new(12, 1, 12, 20),
                violation: Violation::new(
                    "CreateOrder",
                    "tx",
                    ViolationKind::NoCommitRollback,
                    Span::new(100, 119),
                ),
            }],
            failures: vec![FileFailure {
                file: PathBuf::from("broken.go"),
                code: "PARSE_ERROR".to_string(),
                message: "Invalid UTF-8 in source file".to_string(),
            }],
            elapsed_ms: 4,
        }
    }

    #[test]
    fn test_text_report_lines() {
        let (mut manager, stdout, stderr) = manager(OutputFormat::Text);
        let code = manager.report(&sample_report(), Severity::High).unwrap();
        assert_eq!(code, ExitCode::BlockingError);

        let out = stdout.contents();
        assert!(out.contains("store/orders.go:12:2: critical no_commit_rollback:"));
        assert!(out.contains("(CreateOrder)"));
        assert!(out.contains("TOTAL"));
        assert!(stderr.contents().contains("broken.go"));
    }

    #[test]
    fn test_json_report_envelope() {
        let (mut manager, stdout, _) = manager(OutputFormat::Json);
        let code = manager.report(&sample_report(), Severity::Critical).unwrap();
        assert_eq!(code, ExitCode::BlockingError);

        let value: serde_json::Value = serde_json::from_str(&stdout.contents()).unwrap();
        assert_eq!(value["status"], "violations");
        assert_eq!(value["exit_code"], 2);
        let diagnostic = &value["data"]["diagnostics"][0];
        assert_eq!(diagnostic["kind"], "no_commit_rollback");
        assert_eq!(diagnostic["severity"], "critical");
        assert_eq!(diagnostic["variable_name"], "tx");
        assert_eq!(diagnostic["range"]["start_line"], 12);
        assert_eq!(value["meta"]["version"], env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_error_output() {
        let (mut manager, _, stderr) = manager(OutputFormat::Text);
        let error = CheckError::ConfigError {
            reason: "bad fail_on".to_string(),
        };
        let code = manager.error(&error).unwrap();
        assert_eq!(code, ExitCode::ConfigError);
        assert!(stderr.contents().contains("bad fail_on"));
        assert!(stderr.contents().contains("Suggestion:"));
    }
}
