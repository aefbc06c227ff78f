#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use txguard::{TransactionChecker, Violation, ViolationKind};

pub struct TestProject {
    pub dir: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn add_file(&self, path: &str, content: &str) -> PathBuf {
        let file_path = self.dir.path().join(path);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        fs::write(&file_path, content).expect("Failed to write file");
        file_path
    }

    /// Copy a file from `tests/fixtures/go` into the project.
    pub fn add_fixture(&self, name: &str) -> PathBuf {
        let content = fs::read_to_string(fixture(name)).expect("Failed to read fixture");
        self.add_file(name, &content)
    }

    /// Copy a fixture under a different relative path.
    pub fn add_fixture_as(&self, name: &str, path: &str) -> PathBuf {
        let content = fs::read_to_string(fixture(name)).expect("Failed to read fixture");
        self.add_file(path, &content)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/go")
        .join(name)
}

/// Check a single function `run` with the given body and default settings.
pub fn check_body(body: &str) -> Vec<Violation> {
    let source = format!(
        "package main\n\nfunc run(db *sql.DB, cond bool) error {{\n{body}\n}}\n"
    );
    check(&source)
}

pub fn check(source: &str) -> Vec<Violation> {
    TransactionChecker::default()
        .check_source(source)
        .expect("check_source failed")
}

pub fn kinds(violations: &[Violation]) -> Vec<ViolationKind> {
    violations.iter().map(|v| v.kind).collect()
}
