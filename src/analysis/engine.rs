//! Checking driver
//!
//! Parses files, runs the tracker and classifier per function and collects
//! the resulting diagnostics. Files are checked in parallel on a rayon pool;
//! each worker thread owns its own `GoParser` and the only shared state is
//! the `DiagnosticSink`.

use crate::analysis::binding::Recognizers;
use crate::analysis::classifier::classify;
use crate::analysis::scanner::{FunctionUnit, scan};
use crate::analysis::tracker::AnalysisContext;
use crate::analysis::violation::{Severity, Violation};
use crate::config::{AnalysisConfig, Settings};
use crate::error::{AnalysisError, CheckError, CheckResult, ParseError};
use crate::indexing::FileWalker;
use crate::parsing::GoParser;
use crate::types::{LineIndex, Range};
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

/// A violation placed in a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub file: PathBuf,
    pub range: Range,
    #[serde(flatten)]
    pub violation: Violation,
}

/// A file that could not be checked.
#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub file: PathBuf,
    pub code: String,
    pub message: String,
}

/// Results for one file.
#[derive(Debug, Clone, Default)]
pub struct FileReport {
    pub functions: usize,
    pub violations: Vec<Violation>,
    /// Functions dropped after hitting the step or nesting limit.
    pub skipped_functions: Vec<String>,
}

/// Collects diagnostics from worker threads.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diagnostics: Mutex<Vec<Diagnostic>>,
    failures: Mutex<Vec<FileFailure>>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&self, diagnostics: Vec<Diagnostic>) {
        if diagnostics.is_empty() {
            return;
        }
        self.diagnostics.lock().extend(diagnostics);
    }

    pub fn fail(&self, file: &Path, error: &CheckError) {
        self.failures.lock().push(FileFailure {
            file: file.to_path_buf(),
            code: error.status_code(),
            message: error.to_string(),
        });
    }

    pub fn len(&self) -> usize {
        self.diagnostics.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain into diagnostics sorted by file and position.
    pub fn into_sorted(self) -> (Vec<Diagnostic>, Vec<FileFailure>) {
        let mut diagnostics = self.diagnostics.into_inner();
        diagnostics.sort_by(|a, b| {
            a.file
                .cmp(&b.file)
                .then(a.violation.pos.cmp(&b.violation.pos))
                .then(a.violation.variable_name.cmp(&b.violation.variable_name))
        });
        let mut failures = self.failures.into_inner();
        failures.sort_by(|a, b| a.file.cmp(&b.file));
        (diagnostics, failures)
    }
}

/// Diagnostics for one file read from disk.
#[derive(Debug, Clone, Default)]
pub struct FileDiagnostics {
    pub functions: usize,
    pub diagnostics: Vec<Diagnostic>,
}

/// Summary of a whole run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckReport {
    pub files_checked: usize,
    pub functions_checked: usize,
    pub diagnostics: Vec<Diagnostic>,
    pub failures: Vec<FileFailure>,
    pub elapsed_ms: u64,
}

impl CheckReport {
    /// Number of diagnostics at or above `threshold`.
    pub fn count_at_least(&self, threshold: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.violation.severity >= threshold)
            .count()
    }

    pub fn count_of(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.violation.severity == severity)
            .count()
    }
}

/// Transaction lifecycle checker for Go sources.
#[derive(Debug, Clone)]
pub struct TransactionChecker {
    recognizers: Recognizers,
    max_steps: usize,
    max_depth: usize,
}

impl Default for TransactionChecker {
    fn default() -> Self {
        Self::new(&AnalysisConfig::default())
    }
}

impl TransactionChecker {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            recognizers: Recognizers::from_config(config),
            max_steps: config.max_steps_per_function,
            max_depth: config.max_nesting_depth,
        }
    }

    /// A parser lowering with this checker's nesting limit.
    pub fn parser(&self) -> Result<GoParser, ParseError> {
        GoParser::with_max_depth(self.max_depth)
    }

    /// Check one function. Step and nesting limit aborts are returned as
    /// errors so the caller decides whether to skip the function.
    pub fn check_function(
        &self,
        unit: &FunctionUnit<'_>,
    ) -> Result<Vec<Violation>, AnalysisError> {
        let tracked = AnalysisContext::new(&self.recognizers, self.max_steps)
            .with_max_depth(self.max_depth)
            .run(unit)?;
        Ok(classify(unit.name, &tracked))
    }

    /// Check Go source text with a fresh parser.
    pub fn check_source(&self, source: &str) -> CheckResult<Vec<Violation>> {
        let mut parser = self.parser().map_err(|source| CheckError::Parse {
            path: PathBuf::from("<source>"),
            source,
        })?;
        self.check_parsed(&mut parser, Path::new("<source>"), source)
            .map(|report| report.violations)
    }

    /// Check Go source with an existing parser. `path` is used for errors only.
    pub fn check_parsed(
        &self,
        parser: &mut GoParser,
        path: &Path,
        source: &str,
    ) -> CheckResult<FileReport> {
        let file = parser.parse(source).map_err(|source| CheckError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let units = scan(&file);
        let mut report = FileReport {
            functions: units.len(),
            ..FileReport::default()
        };

        for unit in &units {
            match self.check_function(unit) {
                Ok(violations) => report.violations.extend(violations),
                Err(e) if !e.is_internal() => {
                    warn!("{}: skipping function {}: {e}", path.display(), unit.name);
                    report.skipped_functions.push(unit.name.to_string());
                }
                Err(e) => {
                    return Err(CheckError::Analysis {
                        path: path.to_path_buf(),
                        function: unit.name.to_string(),
                        source: e,
                    });
                }
            }
        }

        debug!(
            "{}: {} functions, {} violations",
            path.display(),
            report.functions,
            report.violations.len()
        );
        Ok(report)
    }

    /// Read and check one file, placing each violation in it.
    pub fn check_file(&self, parser: &mut GoParser, path: &Path) -> CheckResult<FileDiagnostics> {
        let bytes = std::fs::read(path).map_err(|source| CheckError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let source = String::from_utf8(bytes).map_err(|_| CheckError::Parse {
            path: path.to_path_buf(),
            source: ParseError::InvalidUtf8,
        })?;

        let report = self.check_parsed(parser, path, &source)?;
        let lines = LineIndex::new(&source);

        Ok(FileDiagnostics {
            functions: report.functions,
            diagnostics: report
                .violations
                .into_iter()
                .map(|violation| Diagnostic {
                    file: path.to_path_buf(),
                    range: lines.range(violation.span()),
                    violation,
                })
                .collect(),
        })
    }

    /// Walk `paths`, check every Go file in parallel and collect the results.
    ///
    /// Unreadable or unparsable files are recorded as failures; an internal
    /// analyzer error aborts the run.
    pub fn check_paths(
        &self,
        paths: &[PathBuf],
        settings: Arc<Settings>,
    ) -> CheckResult<CheckReport> {
        let start = Instant::now();

        for path in paths {
            if !path.exists() {
                return Err(CheckError::PathNotFound { path: path.clone() });
            }
        }

        let walker = FileWalker::new(settings.clone());
        let mut files: Vec<PathBuf> = paths.iter().flat_map(|p| walker.walk(p)).collect();
        files.sort();
        files.dedup();

        let threads = settings.indexing.parallel_threads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| CheckError::General(format!("Failed to start worker pool: {e}")))?;

        info!("checking {} files on {threads} threads", files.len());

        let sink = DiagnosticSink::new();
        let functions = AtomicUsize::new(0);

        let outcome: CheckResult<()> = pool.install(|| {
            files.par_iter().try_for_each_init(
                || self.parser(),
                |parser, path| -> CheckResult<()> {
                    let parser = match parser {
                        Ok(parser) => parser,
                        Err(e) => {
                            return Err(CheckError::General(format!(
                                "Failed to initialize Go parser: {e}"
                            )));
                        }
                    };

                    match self.check_file(parser, path) {
                        Ok(checked) => {
                            functions.fetch_add(checked.functions, Ordering::Relaxed);
                            sink.extend(checked.diagnostics);
                            Ok(())
                        }
                        Err(e @ CheckError::Analysis { .. }) => Err(e),
                        Err(e) => {
                            warn!("{e}");
                            sink.fail(path, &e);
                            Ok(())
                        }
                    }
                },
            )
        });
        outcome?;

        let (diagnostics, failures) = sink.into_sorted();
        let report = CheckReport {
            files_checked: files.len(),
            functions_checked: functions.into_inner(),
            diagnostics,
            failures,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            "checked {} files, {} functions: {} violations, {} failures in {}ms",
            report.files_checked,
            report.functions_checked,
            report.diagnostics.len(),
            report.failures.len(),
            report.elapsed_ms
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::violation::ViolationKind;
    use std::fs;
    use tempfile::TempDir;

    const LEAKY: &str = r#"
package store

func leak(db *sql.DB) error {
    tx, _ := db.Begin()
    tx.Exec("x")
    return nil
}

func ok(db *sql.DB) error {
    tx, err := db.Begin()
    if err != nil {
        return err
    }
    defer tx.Rollback()
    return tx.Commit()
}
"#;

    #[test]
    fn test_check_source() {
        let checker = TransactionChecker::default();
        let violations = checker.check_source(LEAKY).unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::NoCommitRollback);
        assert_eq!(violations[0].function, "leak");
    }

    #[test]
    fn test_step_limit_skips_function_only() {
        let config = AnalysisConfig {
            max_steps_per_function: 3,
            ..AnalysisConfig::default()
        };
        let checker = TransactionChecker::new(&config);
        let mut parser = GoParser::new().unwrap();
        let report = checker
            .check_parsed(&mut parser, Path::new("leaky.go"), LEAKY)
            .unwrap();

        // `leak` fits in three statements, `ok` does not
        assert_eq!(report.functions, 2);
        assert_eq!(report.skipped_functions, vec!["ok".to_string()]);
        assert_eq!(report.violations.len(), 1);
    }

    fn nested_ifs(depth: usize) -> String {
        let mut source = String::from("package store\n\nfunc deep(db *sql.DB, ok bool) {\n");
        for _ in 0..depth {
            source.push_str("if ok {\n");
        }
        source.push_str("tx, _ := db.Begin()\ntx.Exec(\"x\")\n");
        for _ in 0..depth {
            source.push_str("}\n");
        }
        source.push_str("}\n");
        source.push_str(&LEAKY.replacen("package store", "", 1));
        source
    }

    #[test]
    fn test_deep_nesting_skips_function_only() {
        let checker = TransactionChecker::default();
        let mut parser = checker.parser().unwrap();
        let report = checker
            .check_parsed(&mut parser, Path::new("deep.go"), &nested_ifs(1000))
            .unwrap();

        assert_eq!(report.functions, 3);
        assert_eq!(report.skipped_functions, vec!["deep".to_string()]);
        // `leak` from the same file is still reported
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].function, "leak");
    }

    #[test]
    fn test_nesting_within_limit_is_checked() {
        let config = AnalysisConfig {
            max_nesting_depth: 64,
            ..AnalysisConfig::default()
        };
        let checker = TransactionChecker::new(&config);
        let mut parser = checker.parser().unwrap();

        let report = checker
            .check_parsed(&mut parser, Path::new("deep.go"), &nested_ifs(20))
            .unwrap();
        assert!(report.skipped_functions.is_empty());
        assert_eq!(report.violations.len(), 2);

        let report = checker
            .check_parsed(&mut parser, Path::new("deep.go"), &nested_ifs(80))
            .unwrap();
        assert_eq!(report.skipped_functions, vec!["deep".to_string()]);
    }

    #[test]
    fn test_check_paths_collects_diagnostics_and_failures() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("leaky.go"), LEAKY).unwrap();
        fs::write(root.join("clean.go"), "package store\n\nfunc noop() {}\n").unwrap();
        fs::write(root.join("broken.go"), [0x70u8, 0xff, 0xfe]).unwrap();

        let mut settings = Settings::default();
        settings.indexing.parallel_threads = 2;
        let checker = TransactionChecker::new(&settings.analysis);
        let report = checker
            .check_paths(&[root.to_path_buf()], Arc::new(settings))
            .unwrap();

        assert_eq!(report.files_checked, 3);
        assert_eq!(report.functions_checked, 3);
        assert_eq!(report.diagnostics.len(), 1);

        let diagnostic = &report.diagnostics[0];
        assert!(diagnostic.file.ends_with("leaky.go"));
        assert_eq!(diagnostic.range.start_line, 5);
        assert_eq!(diagnostic.range.start_column, 4);

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].code, "PARSE_ERROR");
        assert_eq!(report.count_at_least(Severity::High), 1);
        assert_eq!(report.count_of(Severity::Critical), 1);
    }

    #[test]
    fn test_missing_path_is_an_error() {
        let checker = TransactionChecker::default();
        let result = checker.check_paths(
            &[PathBuf::from("/definitely/not/here")],
            Arc::new(Settings::default()),
        );
        assert!(matches!(result, Err(CheckError::PathNotFound { .. })));
    }

    #[test]
    fn test_sink_sorts_by_file_and_position() {
        let sink = DiagnosticSink::new();
        let make = |file: &str, pos: usize| Diagnostic {
            file: PathBuf::from(file),
            range: Range::default(),
            violation: Violation::new(
                "f",
                "tx",
                ViolationKind::NoCommit,
                crate::types::Span::new(pos, pos + 2),
            ),
        };
        sink.extend(vec![make("b.go", 1), make("a.go", 9)]);
        sink.extend(vec![make("a.go", 3)]);
        assert_eq!(sink.len(), 3);

        let (sorted, failures) = sink.into_sorted();
        let order: Vec<_> = sorted
            .iter()
            .map(|d| (d.file.to_string_lossy().to_string(), d.violation.pos))
            .collect();
        assert_eq!(
            order,
            vec![
                ("a.go".to_string(), 3),
                ("a.go".to_string(), 9),
                ("b.go".to_string(), 1)
            ]
        );
        assert!(failures.is_empty());
    }
}
