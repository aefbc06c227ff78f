//! Violation records produced by the classifier
//!
//! `ViolationKind` identifiers are matched verbatim by downstream consumers
//! (editor diagnostics, CI exit-code mapping), so their serialized form is fixed.

use crate::types::Span;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ordered from least to most severe so that `>=` expresses thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!(
                "unknown severity '{other}', expected one of: low, medium, high, critical"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    NoCommitRollback,
    NoRollback,
    NoCommit,
    ShadowedTransaction,
    VariableReassignment,
    GoroutineCapture,
    FatalWithoutDefer,
    PanicWithoutDefer,
    CommitInLoop,
    CommitInSwitch,
    CommitInSelect,
    ConditionalCommit,
    EarlyReturn,
    CommitErrorIgnored,
}

impl ViolationKind {
    pub const ALL: [ViolationKind; 14] = [
        ViolationKind::NoCommitRollback,
        ViolationKind::NoRollback,
        ViolationKind::NoCommit,
        ViolationKind::ShadowedTransaction,
        ViolationKind::VariableReassignment,
        ViolationKind::GoroutineCapture,
        ViolationKind::FatalWithoutDefer,
        ViolationKind::PanicWithoutDefer,
        ViolationKind::CommitInLoop,
        ViolationKind::CommitInSwitch,
        ViolationKind::CommitInSelect,
        ViolationKind::ConditionalCommit,
        ViolationKind::EarlyReturn,
        ViolationKind::CommitErrorIgnored,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::NoCommitRollback => "no_commit_rollback",
            ViolationKind::NoRollback => "no_rollback",
            ViolationKind::NoCommit => "no_commit",
            ViolationKind::ShadowedTransaction => "shadowed_transaction",
            ViolationKind::VariableReassignment => "variable_reassignment",
            ViolationKind::GoroutineCapture => "goroutine_capture",
            ViolationKind::FatalWithoutDefer => "fatal_without_defer",
            ViolationKind::PanicWithoutDefer => "panic_without_defer",
            ViolationKind::CommitInLoop => "commit_in_loop",
            ViolationKind::CommitInSwitch => "commit_in_switch",
            ViolationKind::CommitInSelect => "commit_in_select",
            ViolationKind::ConditionalCommit => "conditional_commit",
            ViolationKind::EarlyReturn => "early_return",
            ViolationKind::CommitErrorIgnored => "commit_error_ignored",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            ViolationKind::NoCommitRollback => Severity::Critical,
            ViolationKind::NoRollback
            | ViolationKind::ShadowedTransaction
            | ViolationKind::VariableReassignment
            | ViolationKind::GoroutineCapture
            | ViolationKind::FatalWithoutDefer
            | ViolationKind::EarlyReturn => Severity::High,
            ViolationKind::NoCommit
            | ViolationKind::PanicWithoutDefer
            | ViolationKind::CommitInLoop
            | ViolationKind::CommitInSwitch
            | ViolationKind::CommitInSelect
            | ViolationKind::ConditionalCommit => Severity::Medium,
            ViolationKind::CommitErrorIgnored => Severity::Low,
        }
    }

    /// Whether the violation is positioned on the offending statement rather
    /// than on the acquisition.
    pub fn anchors_on_statement(&self) -> bool {
        matches!(
            self,
            ViolationKind::CommitInLoop
                | ViolationKind::CommitInSwitch
                | ViolationKind::CommitInSelect
                | ViolationKind::CommitErrorIgnored
        )
    }

    fn describe(&self, var: &str) -> String {
        match self {
            ViolationKind::NoCommitRollback => {
                format!("transaction '{var}' is never committed or rolled back")
            }
            ViolationKind::NoRollback => format!(
                "transaction '{var}' is committed but never rolled back on failure paths"
            ),
            ViolationKind::NoCommit => {
                format!("transaction '{var}' is rolled back but never committed")
            }
            ViolationKind::ShadowedTransaction => format!(
                "transaction '{var}' is shadowed by a new transaction in a nested scope; \
                 the outer handle may never be finalized"
            ),
            ViolationKind::VariableReassignment => format!(
                "transaction variable '{var}' is reassigned before the previous transaction \
                 is finalized"
            ),
            ViolationKind::GoroutineCapture => format!(
                "transaction '{var}' is captured by a goroutine without a deferred rollback"
            ),
            ViolationKind::FatalWithoutDefer => format!(
                "process exits while transaction '{var}' is open and no rollback is deferred"
            ),
            ViolationKind::PanicWithoutDefer => format!(
                "panic while transaction '{var}' is open and no rollback is deferred"
            ),
            ViolationKind::CommitInLoop => format!(
                "transaction '{var}' is committed inside a loop it was not started in"
            ),
            ViolationKind::CommitInSwitch => format!(
                "transaction '{var}' is only committed in some switch cases"
            ),
            ViolationKind::CommitInSelect => format!(
                "transaction '{var}' is only committed in some select cases"
            ),
            ViolationKind::ConditionalCommit => {
                format!("transaction '{var}' is only committed on one conditional branch")
            }
            ViolationKind::EarlyReturn => format!(
                "function returns before transaction '{var}' is committed or rolled back"
            ),
            ViolationKind::CommitErrorIgnored => {
                format!("error returned by committing transaction '{var}' is discarded")
            }
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViolationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ViolationKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown violation kind '{s}'"))
    }
}

/// One reported defect for one transaction binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub function: String,
    pub variable_name: String,
    pub kind: ViolationKind,
    pub severity: Severity,
    pub message: String,
    pub pos: usize,
    pub end: usize,
}

impl Violation {
    pub fn new(function: &str, variable_name: &str, kind: ViolationKind, span: Span) -> Self {
        Self {
            function: function.to_string(),
            variable_name: variable_name.to_string(),
            kind,
            severity: kind.severity(),
            message: kind.describe(variable_name),
            pos: span.start,
            end: span.end,
        }
    }

    pub fn span(&self) -> Span {
        Span::new(self.pos, self.end)
    }
}
