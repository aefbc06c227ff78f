//! Directory-level checks over the Go fixtures.

use crate::common::TestProject;
use std::sync::Arc;
use txguard::io::{ExitCode, OutputFormat, OutputManager};
use txguard::{CheckReport, Settings, Severity, TransactionChecker, ViolationKind};

fn run(project: &TestProject, configure: impl FnOnce(&mut Settings)) -> CheckReport {
    let mut settings = Settings::default();
    configure(&mut settings);
    let checker = TransactionChecker::new(&settings.analysis);
    checker
        .check_paths(&[project.path().to_path_buf()], Arc::new(settings))
        .expect("check_paths failed")
}

fn fixture_project() -> TestProject {
    let project = TestProject::new();
    project.add_fixture("orders.go");
    project.add_fixture("ledger.go");
    project.add_fixture("ledger_test.go");
    project
}

fn summary(report: &CheckReport) -> Vec<(String, String, ViolationKind)> {
    report
        .diagnostics
        .iter()
        .map(|d| {
            (
                d.file
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
                d.violation.function.clone(),
                d.violation.kind,
            )
        })
        .collect()
}

#[test]
fn test_fixture_project_violations() {
    let project = fixture_project();
    let report = run(&project, |_| {});

    assert_eq!(report.files_checked, 3);
    assert_eq!(report.functions_checked, 11);
    assert!(report.failures.is_empty());

    let expected = vec![
        ("ledger_test.go", "TestingFixture", ViolationKind::NoCommitRollback),
        ("orders.go", "CreateOrder", ViolationKind::NoCommitRollback),
        ("orders.go", "ArchiveOrders", ViolationKind::ConditionalCommit),
        ("orders.go", "Reindex", ViolationKind::GoroutineCapture),
        ("orders.go", "Purge", ViolationKind::FatalWithoutDefer),
    ];
    let expected: Vec<_> = expected
        .into_iter()
        .map(|(f, func, kind)| (f.to_string(), func.to_string(), kind))
        .collect();
    assert_eq!(summary(&report), expected);
}

#[test]
fn test_diagnostic_points_at_acquisition() {
    let project = fixture_project();
    let report = run(&project, |_| {});

    let create = report
        .diagnostics
        .iter()
        .find(|d| d.violation.function == "CreateOrder")
        .expect("CreateOrder diagnostic");
    assert_eq!(create.range.start_line, 16);
    assert_eq!(create.range.start_column, 1);
    assert_eq!(create.violation.variable_name, "tx");
}

#[test]
fn test_skip_test_files_setting() {
    let project = fixture_project();
    let report = run(&project, |s| s.analysis.skip_test_files = true);

    assert_eq!(report.files_checked, 2);
    assert!(
        report
            .diagnostics
            .iter()
            .all(|d| !d.file.ends_with("ledger_test.go"))
    );
}

#[test]
fn test_ignore_file_and_patterns() {
    let project = fixture_project();
    project.add_file(".txguardignore", "orders.go\n");
    project.add_file(
        "vendor/github.com/acme/db/leak.go",
        "package db\n\nfunc leak(db *DB) {\n    tx, _ := db.Begin()\n    tx.Exec(\"x\")\n}\n",
    );

    let report = run(&project, |_| {});
    assert_eq!(report.files_checked, 2);
    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(report.diagnostics[0].violation.function, "TestingFixture");

    let report = run(&project, |s| s.indexing.ignore_patterns.clear());
    assert!(
        report
            .diagnostics
            .iter()
            .any(|d| d.violation.function == "leak")
    );
}

#[test]
fn test_results_do_not_depend_on_thread_count() {
    let project = fixture_project();
    for i in 0..8 {
        project.add_fixture_as("orders.go", &format!("pkg{i}/orders.go"));
    }

    let single = run(&project, |s| s.indexing.parallel_threads = 1);
    let many = run(&project, |s| s.indexing.parallel_threads = 4);

    assert_eq!(single.diagnostics, many.diagnostics);
    assert_eq!(single.functions_checked, many.functions_checked);
    assert_eq!(single.diagnostics.len(), 5 + 8 * 4);
}

#[test]
fn test_unparsable_file_does_not_stop_the_run() {
    let project = fixture_project();
    std::fs::write(project.path().join("latin1.go"), b"package store\n// caf\xe9\n")
        .expect("write latin1.go");

    let report = run(&project, |_| {});
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].code, "PARSE_ERROR");
    assert_eq!(report.diagnostics.len(), 5);
    assert_eq!(
        ExitCode::from_report(&report, Severity::High),
        ExitCode::BlockingError
    );
}

#[test]
fn test_exit_code_follows_fail_on() {
    let project = TestProject::new();
    project.add_file(
        "ack.go",
        r#"package store

func Ack(db *sql.DB) error {
    tx, err := db.Begin()
    if err != nil {
        return err
    }
    defer tx.Rollback()
    tx.Exec("UPDATE jobs SET acked = 1")
    return nil
}
"#,
    );

    let report = run(&project, |_| {});
    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(report.diagnostics[0].violation.kind, ViolationKind::NoCommit);
    assert_eq!(report.count_of(Severity::Medium), 1);
    assert_eq!(ExitCode::from_report(&report, Severity::High), ExitCode::Success);
    assert_eq!(
        ExitCode::from_report(&report, Severity::Medium),
        ExitCode::BlockingError
    );
}

#[test]
fn test_json_output_of_fixture_run() {
    let project = fixture_project();
    let report = run(&project, |_| {});

    let buffer = tempfile::NamedTempFile::new().expect("temp file");
    let writer = buffer.reopen().expect("reopen temp file");
    let mut output = OutputManager::new_with_writers(
        OutputFormat::Json,
        Box::new(writer),
        Box::new(std::io::sink()),
    );
    let code = output.report(&report, Severity::Critical).expect("write report");
    assert_eq!(code, ExitCode::BlockingError);
    drop(output);

    let json = std::fs::read_to_string(buffer.path()).expect("read output");
    let value: serde_json::Value = serde_json::from_str(&json).expect("valid JSON");
    assert_eq!(value["exit_code"], 2);
    assert_eq!(value["data"]["files_checked"], 3);
    let diagnostics = value["data"]["diagnostics"].as_array().expect("array");
    assert_eq!(diagnostics.len(), 5);
    assert!(diagnostics.iter().all(|d| d["variable_name"] == "tx"));
    assert_eq!(diagnostics[0]["kind"], "no_commit_rollback");
    assert_eq!(diagnostics[0]["severity"], "critical");
}
