//! Transaction lifecycle analysis
//!
//! Data flows one way through the submodules:
//! `scanner` picks the functions, `tracker` walks each body while `scope` and
//! `binding` record what happens to every transaction handle, `classifier`
//! turns the recorded events into `Violation`s and `engine` drives the whole
//! thing across files.

pub mod binding;
pub mod classifier;
pub mod engine;
pub mod scanner;
pub mod scope;
pub mod tracker;
pub mod violation;

pub use binding::{AcquisitionKind, EventKind, LifecycleEvent, Recognizers, TransactionBinding};
pub use classifier::classify;
pub use engine::{
    CheckReport, Diagnostic, DiagnosticSink, FileDiagnostics, FileFailure, FileReport,
    TransactionChecker,
};
pub use scanner::{FunctionUnit, is_test_entrypoint, scan};
pub use scope::{Scope, ScopeId, ScopeKind, ScopeTree};
pub use tracker::{AnalysisContext, Tracked};
pub use violation::{Severity, Violation, ViolationKind};
