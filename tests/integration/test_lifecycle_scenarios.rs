//! End-to-end lifecycle scenarios through `TransactionChecker::check_source`.

use crate::common::{check, check_body, kinds};
use txguard::{Severity, ViolationKind};

#[test]
fn test_unfinalized_transaction_is_critical() {
    let violations = check_body(
        r#"
    tx, _ := db.Begin()
    tx.Exec("INSERT INTO t VALUES (1)")
    return err
"#,
    );

    assert_eq!(violations.len(), 1);
    let violation = &violations[0];
    assert_eq!(violation.kind, ViolationKind::NoCommitRollback);
    assert_eq!(violation.severity, Severity::Critical);
    assert_eq!(violation.variable_name, "tx");
    assert_eq!(violation.function, "run");
}

#[test]
fn test_deferred_rollback_then_commit_is_clean() {
    let violations = check_body(
        r#"
    tx, _ := db.Begin()
    defer tx.Rollback()
    tx.Exec("INSERT INTO t VALUES (1)")
    return tx.Commit()
"#,
    );
    assert!(violations.is_empty(), "unexpected: {violations:?}");
}

#[test]
fn test_goroutine_capture_without_defer() {
    let violations = check_body(
        r#"
    tx, _ := db.Begin()
    go func() {
        tx.Exec("INSERT INTO t VALUES (1)")
        tx.Commit()
    }()
    return nil
"#,
    );

    assert_eq!(kinds(&violations), vec![ViolationKind::GoroutineCapture]);
    assert_eq!(violations[0].severity, Severity::High);
}

#[test]
fn test_goroutine_capture_with_defer() {
    let violations = check_body(
        r#"
    tx, _ := db.Begin()
    defer tx.Rollback()
    go func() {
        tx.Exec("INSERT INTO t VALUES (1)")
        tx.Commit()
    }()
    return nil
"#,
    );
    assert!(
        !kinds(&violations).contains(&ViolationKind::GoroutineCapture),
        "unexpected: {violations:?}"
    );
}

#[test]
fn test_commit_launched_as_goroutine() {
    let violations = check_body(
        r#"
    tx, _ := db.Begin()
    tx.Exec("INSERT INTO t VALUES (1)")
    go tx.Commit()
    return nil
"#,
    );
    assert_eq!(kinds(&violations), vec![ViolationKind::GoroutineCapture]);

    let violations = check_body(
        r#"
    tx, _ := db.Begin()
    defer tx.Rollback()
    go tx.Commit()
    return nil
"#,
    );
    assert!(violations.is_empty(), "unexpected: {violations:?}");
}

#[test]
fn test_grouped_var_declarations_are_tracked() {
    let violations = check_body(
        r#"
    tx, _ := db.Begin()
    defer tx.Rollback()
    var (
        rows = 2
        cerr = tx.Commit()
    )
    _ = rows
    return cerr
"#,
    );
    assert!(violations.is_empty(), "unexpected: {violations:?}");

    let violations = check_body(
        r#"
    var (
        label = "orders"
        tx    = db.MustBegin()
    )
    tx.Exec(label)
    return nil
"#,
    );
    assert_eq!(kinds(&violations), vec![ViolationKind::NoCommitRollback]);
}

#[test]
fn test_deeply_nested_function_does_not_abort_the_file() {
    let mut body = String::new();
    for _ in 0..1000 {
        body.push_str("if cond {\n");
    }
    body.push_str("return nil\n");
    for _ in 0..1000 {
        body.push_str("}\n");
    }
    let source = format!(
        "package main\n\nfunc deep(cond bool) error {{\n{body}return nil\n}}\n\n\
         func leak(db *sql.DB) {{\n    tx, _ := db.Begin()\n    tx.Exec(\"x\")\n}}\n"
    );

    let violations = check(&source);
    assert_eq!(kinds(&violations), vec![ViolationKind::NoCommitRollback]);
    assert_eq!(violations[0].function, "leak");
}

#[test]
fn test_commit_on_one_branch_only() {
    let violations = check_body(
        r#"
    tx, _ := db.Begin()
    if cond {
        tx.Commit()
    }
    return nil
"#,
    );

    assert_eq!(kinds(&violations), vec![ViolationKind::ConditionalCommit]);
    assert_eq!(violations[0].severity, Severity::Medium);
}

#[test]
fn test_independent_bindings_are_reported_separately() {
    let violations = check_body(
        r#"
    tx1, _ := db.Begin()
    tx1.Exec("INSERT INTO a VALUES (1)")

    tx2, err := db.Begin()
    if err != nil {
        return err
    }
    defer tx2.Rollback()
    tx2.Exec("INSERT INTO b VALUES (1)")
    return tx2.Commit()
"#,
    );

    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].kind, ViolationKind::NoCommitRollback);
    assert_eq!(violations[0].variable_name, "tx1");
}

#[test]
fn test_safe_code_after_defer_adds_nothing() {
    let base = r#"
    tx, err := db.Begin()
    if err != nil {
        return err
    }
    defer tx.Rollback()
"#;
    let tail = "    return tx.Commit()\n";

    let extra = r#"
    if cond {
        panic("boom")
    }
    switch {
    case cond:
        if err := tx.Commit(); err != nil {
            return err
        }
    }
    go func() {
        tx.Exec("SELECT 1")
    }()
    if cond {
        log.Fatal("stop")
    }
    if cond {
        return nil
    }
"#;

    assert!(check_body(&format!("{base}{tail}")).is_empty());
    let violations = check_body(&format!("{base}{extra}{tail}"));
    assert!(violations.is_empty(), "unexpected: {violations:?}");
}

#[test]
fn test_returned_handle_is_callers_problem() {
    let violations = check(
        r#"
package store

func open(db *sql.DB) (*sql.Tx, error) {
    tx, err := db.Begin()
    if err != nil {
        return nil, err
    }
    return tx, nil
}
"#,
    );
    assert!(violations.is_empty(), "unexpected: {violations:?}");
}

#[test]
fn test_callback_helper_takes_ownership() {
    let violations = check_body(
        r#"
    tx, _ := db.Begin()
    return WithTransaction(tx, func(tx *sql.Tx) error {
        _, err := tx.Exec("DELETE FROM t")
        return err
    })
"#,
    );
    assert!(violations.is_empty(), "unexpected: {violations:?}");
}

#[test]
fn test_test_entrypoints_are_skipped_but_lookalikes_are_not() {
    let violations = check(
        r#"
package store

func TestLeak(t *testing.T) {
    tx, _ := db.Begin()
    tx.Exec("x")
}

func BenchmarkLeak(b *testing.B) {
    tx, _ := db.Begin()
    tx.Exec("x")
}

func ExampleLeak() {
    tx, _ := db.Begin()
    tx.Exec("x")
}

func TestingLeak(db *sql.DB) {
    tx, _ := db.Begin()
    tx.Exec("x")
}

func (s *Suite) TestLeak(t *testing.T) {
    tx, _ := s.db.Begin()
    tx.Exec("x")
}
"#,
    );

    let functions: Vec<_> = violations.iter().map(|v| v.function.as_str()).collect();
    assert_eq!(functions, vec!["TestingLeak", "TestLeak"]);
    assert!(
        violations
            .iter()
            .all(|v| v.kind == ViolationKind::NoCommitRollback)
    );
}

#[test]
fn test_sqlx_and_context_acquisitions() {
    let violations = check_body(
        r#"
    a, _ := db.BeginTx(ctx, nil)
    a.Exec("x")
    b := db.MustBegin()
    b.Exec("x")
    c, _ := db.Beginx()
    c.Exec("x")
    return nil
"#,
    );

    let names: Vec<_> = violations.iter().map(|v| v.variable_name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
    assert!(
        violations
            .iter()
            .all(|v| v.kind == ViolationKind::NoCommitRollback)
    );
}

#[test]
fn test_var_declaration_acquisition() {
    let violations = check_body(
        r#"
    var tx = db.MustBegin()
    tx.Exec("x")
    return nil
"#,
    );
    assert_eq!(kinds(&violations), vec![ViolationKind::NoCommitRollback]);
}

#[test]
fn test_blank_binding_is_not_tracked() {
    let violations = check_body(
        r#"
    _, err := db.Begin()
    return err
"#,
    );
    assert!(violations.is_empty());
}

#[test]
fn test_violation_positions_follow_source_order() {
    let violations = check_body(
        r#"
    first, _ := db.Begin()
    first.Exec("x")
    second, _ := db.Begin()
    second.Exec("x")
    return nil
"#,
    );

    assert_eq!(violations.len(), 2);
    assert!(violations[0].pos < violations[1].pos);
    assert!(violations.iter().all(|v| v.pos < v.end));
}
