//! Static checker for database transaction lifecycles in Go code.
//!
//! Go sources are parsed with tree-sitter, every function body is walked once
//! to record what happens to each transaction handle, and the recorded events
//! are classified into [`Violation`]s.
//!
//! ```no_run
//! use txguard::TransactionChecker;
//!
//! let checker = TransactionChecker::default();
//! let violations = checker.check_source("package main\n").unwrap();
//! assert!(violations.is_empty());
//! ```

pub mod analysis;
pub mod config;
pub mod display;
pub mod error;
pub mod indexing;
pub mod io;
pub mod parsing;
pub mod syntax;
pub mod types;

// Explicit exports for better API clarity
pub use analysis::{
    CheckReport, Diagnostic, Severity, TransactionChecker, Violation, ViolationKind,
};
pub use config::Settings;
pub use error::{AnalysisError, CheckError, CheckResult, ParseError, ParseResult};
pub use indexing::FileWalker;
pub use parsing::GoParser;
pub use types::{Range, Span};
