//! Settings files driving the checker.

use crate::common::{TestProject, kinds};
use txguard::{Settings, Severity, TransactionChecker, ViolationKind};

fn checker_from(toml: &str) -> (TransactionChecker, Settings) {
    let project = TestProject::new();
    let path = project.add_file(".txguard/settings.toml", toml);
    let settings = Settings::load_from(&path).expect("settings should load");
    (TransactionChecker::new(&settings.analysis), settings)
}

#[test]
fn test_custom_acquire_method() {
    let (checker, _) = checker_from("[analysis]\nacquire_methods = [\"StartTx\"]\n");

    let violations = checker
        .check_source(
            r#"
package repo

func Save(store *Store) {
    tx := store.StartTx()
    tx.Put("k", "v")
}
"#,
        )
        .expect("check");
    assert_eq!(kinds(&violations), vec![ViolationKind::NoCommitRollback]);

    // Without the setting the call is not an acquisition
    let violations = TransactionChecker::default()
        .check_source(
            r#"
package repo

func Save(store *Store) {
    tx := store.StartTx()
    tx.Put("k", "v")
}
"#,
        )
        .expect("check");
    assert!(violations.is_empty());
}

#[test]
fn test_custom_finalizers_and_abort_calls() {
    let (checker, _) = checker_from(
        r#"
[analysis]
commit_methods = ["Commit", "Apply"]
rollback_methods = ["Discard"]
fatal_functions = ["klog.Exit"]
"#,
    );

    let clean = checker
        .check_source(
            r#"
package repo

func Apply(db *DB) error {
    tx, err := db.Begin()
    if err != nil {
        return err
    }
    defer tx.Discard()
    return tx.Apply()
}
"#,
        )
        .expect("check");
    assert!(clean.is_empty(), "unexpected: {clean:?}");

    let fatal = checker
        .check_source(
            r#"
package repo

func Apply(db *DB, broken bool) error {
    tx, _ := db.Begin()
    if broken {
        klog.Exit("broken")
    }
    if err := tx.Apply(); err != nil {
        tx.Discard()
        return err
    }
    return nil
}
"#,
        )
        .expect("check");
    assert_eq!(kinds(&fatal), vec![ViolationKind::FatalWithoutDefer]);
}

#[test]
fn test_custom_callback_helper() {
    let (checker, _) = checker_from("[analysis]\ncallback_helpers = [\"Within\"]\n");

    let violations = checker
        .check_source(
            r#"
package repo

func Run(db *DB) error {
    tx, _ := db.Begin()
    return Within(tx, apply)
}
"#,
        )
        .expect("check");
    assert!(violations.is_empty(), "unexpected: {violations:?}");
}

#[test]
fn test_output_section() {
    let (_, settings) = checker_from("[output]\nformat = \"json\"\nfail_on = \"medium\"\n");
    assert_eq!(settings.output.format, "json");
    assert_eq!(settings.output.fail_on, Severity::Medium);
}

#[test]
fn test_init_writes_loadable_template() {
    let project = TestProject::new();
    let path = Settings::init_config_file(project.path(), false).expect("init");
    let settings = Settings::load_from(&path).expect("load template");

    assert_eq!(settings.version, 1);
    assert_eq!(settings.output.fail_on, Severity::High);
    assert_eq!(
        settings.indexing.ignore_patterns,
        vec!["vendor/**".to_string(), "*.pb.go".to_string()]
    );
    let ignore =
        std::fs::read_to_string(project.path().join(".txguardignore")).expect("ignore file");
    assert!(ignore.contains("vendor/"));
}
