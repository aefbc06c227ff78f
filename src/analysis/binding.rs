//! Transaction bindings, their lifecycle events and the API recognizers
//!
//! A binding is one local variable holding a transaction handle. The tracker
//! appends events to it while walking; the classifier reads them afterwards.

use crate::analysis::scope::{ScopeId, ScopeKind, ScopeTree};
use crate::config::AnalysisConfig;
use crate::syntax::Expr;
use crate::types::Span;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(pub usize);

/// Which acquisition call produced the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AcquisitionKind {
    Begin,
    BeginTx,
    BeginTxx,
    Beginx,
    MustBegin,
    MustBeginTx,
    /// A method configured through `analysis.acquire_methods`.
    Custom,
}

impl AcquisitionKind {
    pub fn from_method(method: &str) -> Option<Self> {
        match method {
            "Begin" => Some(Self::Begin),
            "BeginTx" => Some(Self::BeginTx),
            "BeginTxx" => Some(Self::BeginTxx),
            "Beginx" => Some(Self::Beginx),
            "MustBegin" => Some(Self::MustBegin),
            "MustBeginTx" => Some(Self::MustBeginTx),
            _ => None,
        }
    }

    /// `MustBegin*` panics instead of returning an error.
    pub fn returns_error(&self) -> bool {
        !matches!(self, Self::MustBegin | Self::MustBeginTx)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbortKind {
    /// Process exit or `Goexit`; deferred calls of this goroutine may still run.
    Fatal,
    Panic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    DirectCommit,
    DirectRollback,
    DeferredCommit,
    DeferredRollback,
    FatalExit(AbortKind),
    GoroutineCapture,
    EarlyReturn,
    Reassignment,
    Shadowing,
}

impl EventKind {
    pub fn is_commit(&self) -> bool {
        matches!(self, Self::DirectCommit | Self::DeferredCommit)
    }

    pub fn is_rollback(&self) -> bool {
        matches!(self, Self::DirectRollback | Self::DeferredRollback)
    }

    pub fn is_direct_finalization(&self) -> bool {
        matches!(self, Self::DirectCommit | Self::DirectRollback)
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::DeferredCommit | Self::DeferredRollback)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub kind: EventKind,
    /// Span of the statement that triggered the event.
    pub span: Span,
    /// Scope the statement sits in. Deferred events use the scope of the
    /// `defer` statement, not the deferred literal's body.
    pub scope: ScopeId,
    pub loop_depth: u32,
    /// Inside a function literal that is not deferred.
    pub in_closure: bool,
    /// Commit result assigned to `_`.
    pub error_discarded: bool,
}

#[derive(Debug, Clone)]
pub struct TransactionBinding {
    pub id: BindingId,
    pub name: String,
    /// Scope whose stack frame owns the variable.
    pub home: ScopeId,
    /// Scope the acquisition statement ran in.
    pub acquired_in: ScopeId,
    pub acquisition: Span,
    pub err_var: Option<String>,
    pub events: Vec<LifecycleEvent>,
    pub escaped: bool,
    /// End offset of a `x.f = tx` store, if one was seen.
    pub field_store_end: Option<usize>,
    pub last_mention: usize,
    /// Replaced by a later acquisition into the same variable.
    pub retired: bool,
}

impl TransactionBinding {
    pub fn new(
        id: BindingId,
        name: &str,
        home: ScopeId,
        acquired_in: ScopeId,
        acquisition: Span,
    ) -> Self {
        Self {
            id,
            name: name.to_string(),
            home,
            acquired_in,
            acquisition,
            err_var: None,
            events: Vec::new(),
            escaped: false,
            field_store_end: None,
            last_mention: acquisition.end,
            retired: false,
        }
    }

    pub fn has(&self, kind: EventKind) -> bool {
        self.events.iter().any(|e| e.kind == kind)
    }

    pub fn has_commit(&self) -> bool {
        self.events.iter().any(|e| e.kind.is_commit())
    }

    pub fn has_rollback(&self) -> bool {
        self.events.iter().any(|e| e.kind.is_rollback())
    }

    /// Escaped through a return, a helper call, or a field store with no
    /// later local use.
    pub fn is_escaped(&self) -> bool {
        self.escaped
            || self
                .field_store_end
                .is_some_and(|end| self.last_mention <= end)
    }

    /// A deferred rollback registered in the acquiring scope or one of its
    /// parents. Runs on every exit path after the acquisition.
    pub fn has_safety_net(&self, scopes: &ScopeTree) -> bool {
        scopes.ancestors(self.acquired_in).any(|scope| {
            scopes
                .get(scope)
                .is_ok_and(|s| s.defers.iter().any(|d| d.rolls_back(self.id)))
        })
    }

    /// Every path through `scope` finalizes this binding directly.
    pub fn finalizes(&self, scopes: &ScopeTree, scope: ScopeId) -> bool {
        if self
            .events
            .iter()
            .any(|e| e.kind.is_direct_finalization() && !e.in_closure && e.scope == scope)
        {
            return true;
        }

        let Ok(current) = scopes.get(scope) else {
            return false;
        };

        let plain_child = current.children.iter().any(|child| {
            scopes.kind(*child) == Some(ScopeKind::Block) && self.finalizes(scopes, *child)
        });
        if plain_child {
            return true;
        }

        scopes.constructs_owned_by(scope).any(|construct| {
            construct.has_fallback
                && !construct.arms.is_empty()
                && construct.arms.iter().all(|arm| self.arm_ok(scopes, *arm))
        })
    }

    /// Arm either finalizes the binding or never falls through.
    pub fn arm_ok(&self, scopes: &ScopeTree, arm: ScopeId) -> bool {
        self.finalizes(scopes, arm) || scopes.get(arm).is_ok_and(|s| s.terminated)
    }

    /// Finalized by direct calls in some scope on the current stack.
    pub fn finalized_on_path(&self, scopes: &ScopeTree) -> bool {
        scopes.stack().iter().any(|scope| self.finalizes(scopes, *scope))
    }

    /// Finalized on the current path, or covered by a defer registered in a
    /// scope on the stack.
    pub fn guarded_on_path(&self, scopes: &ScopeTree) -> bool {
        self.finalized_on_path(scopes)
            || self
                .events
                .iter()
                .any(|e| e.kind.is_deferred() && scopes.is_on_stack(e.scope))
    }
}

/// Name sets used to recognize transaction APIs and abort primitives.
#[derive(Debug, Clone)]
pub struct Recognizers {
    acquire: HashSet<String>,
    commit: HashSet<String>,
    rollback: HashSet<String>,
    fatal: HashSet<String>,
    panic: HashSet<String>,
    callback_helpers: HashSet<String>,
}

impl Default for Recognizers {
    fn default() -> Self {
        Self::from_config(&AnalysisConfig::default())
    }
}

impl Recognizers {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        let set = |names: &[String]| names.iter().cloned().collect::<HashSet<_>>();
        Self {
            acquire: set(&config.acquire_methods),
            commit: set(&config.commit_methods),
            rollback: set(&config.rollback_methods),
            fatal: set(&config.fatal_functions),
            panic: set(&config.panic_functions),
            callback_helpers: set(&config.callback_helpers),
        }
    }

    /// Recognize `R.M(...)` where `M` starts a transaction and `R` is an
    /// identifier, a selector chain or a call.
    pub fn acquisition(&self, expr: &Expr) -> Option<AcquisitionKind> {
        let (receiver, method) = expr.method_call()?;
        let receiver_ok = match receiver {
            Expr::Ident { name, .. } => name != "_",
            Expr::Selector { .. } => receiver.qualified_name().is_some(),
            Expr::Call { .. } => true,
            _ => false,
        };
        if !receiver_ok {
            return None;
        }

        AcquisitionKind::from_method(method).or_else(|| {
            self.acquire
                .contains(method)
                .then_some(AcquisitionKind::Custom)
        })
    }

    pub fn is_commit(&self, method: &str) -> bool {
        self.commit.contains(method)
    }

    pub fn is_rollback(&self, method: &str) -> bool {
        self.rollback.contains(method)
    }

    /// Classify a call to an abort primitive.
    pub fn abort_kind(&self, call: &Expr) -> Option<AbortKind> {
        let Expr::Call { func, .. } = call else {
            return None;
        };

        if let Some(name) = func.qualified_name() {
            if self.fatal.contains(&name) {
                return Some(AbortKind::Fatal);
            }
            if self.panic.contains(&name) {
                return Some(AbortKind::Panic);
            }
        }

        match func.as_ref() {
            Expr::Selector { field, .. } if field.starts_with("Fatal") => Some(AbortKind::Fatal),
            _ => None,
        }
    }

    /// A helper that runs a callback inside a transaction: a configured name,
    /// or any call given a function literal whose parameter is a `Tx`.
    pub fn is_callback_helper(&self, call: &Expr) -> bool {
        let Expr::Call { func, args, .. } = call else {
            return false;
        };

        let callee = match func.as_ref() {
            Expr::Ident { name, .. } => Some(name.as_str()),
            Expr::Selector { field, .. } => Some(field.as_str()),
            _ => None,
        };
        if callee.is_some_and(|name| self.callback_helpers.contains(name)) {
            return true;
        }

        args.iter().any(|arg| match arg {
            Expr::FuncLit { params, .. } => params
                .iter()
                .any(|p| p.type_text.trim_end().ends_with("Tx")),
            _ => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::scope::ConstructKind;
    use crate::syntax::Param;

    fn ident(name: &str) -> Expr {
        Expr::Ident {
            name: name.to_string(),
            span: Span::default(),
        }
    }

    fn method_call(receiver: Expr, method: &str, args: Vec<Expr>) -> Expr {
        Expr::Call {
            func: Box::new(Expr::Selector {
                operand: Box::new(receiver),
                field: method.to_string(),
                span: Span::default(),
            }),
            args,
            span: Span::default(),
        }
    }

    fn event(kind: EventKind, scope: ScopeId) -> LifecycleEvent {
        LifecycleEvent {
            kind,
            span: Span::default(),
            scope,
            loop_depth: 0,
            in_closure: false,
            error_discarded: false,
        }
    }

    #[test]
    fn test_acquisition_receiver_shapes() {
        let r = Recognizers::default();

        assert_eq!(
            r.acquisition(&method_call(ident("db"), "Begin", vec![])),
            Some(AcquisitionKind::Begin)
        );
        let chained = Expr::Selector {
            operand: Box::new(ident("s")),
            field: "db".to_string(),
            span: Span::default(),
        };
        assert_eq!(
            r.acquisition(&method_call(chained, "BeginTxx", vec![])),
            Some(AcquisitionKind::BeginTxx)
        );
        let called = Expr::Call {
            func: Box::new(ident("conn")),
            args: vec![],
            span: Span::default(),
        };
        assert_eq!(
            r.acquisition(&method_call(called, "MustBegin", vec![])),
            Some(AcquisitionKind::MustBegin)
        );

        // Unknown receiver shape and unknown method
        let composite = Expr::Composite {
            elements: vec![],
            span: Span::default(),
        };
        assert_eq!(r.acquisition(&method_call(composite, "Begin", vec![])), None);
        assert_eq!(r.acquisition(&method_call(ident("db"), "Query", vec![])), None);
    }

    #[test]
    fn test_must_begin_returns_no_error() {
        assert!(AcquisitionKind::Begin.returns_error());
        assert!(AcquisitionKind::Custom.returns_error());
        assert!(!AcquisitionKind::MustBegin.returns_error());
        assert!(!AcquisitionKind::MustBeginTx.returns_error());
    }

    #[test]
    fn test_safety_net_needs_defer_on_the_acquiring_path() {
        let mut scopes = ScopeTree::new();
        let branch = scopes.push(ScopeKind::IfBranch).unwrap();
        scopes.add_defer().unwrap();
        scopes.note_deferred_rollback(branch, BindingId(0)).unwrap();
        scopes.pop().unwrap();

        // Defer inside a branch does not cover a handle acquired before it
        let outer = TransactionBinding::new(
            BindingId(0),
            "tx",
            scopes.root(),
            scopes.root(),
            Span::default(),
        );
        assert!(!outer.has_safety_net(&scopes));

        let inner = TransactionBinding::new(BindingId(0), "tx", branch, branch, Span::default());
        assert!(inner.has_safety_net(&scopes));

        let other = TransactionBinding::new(BindingId(1), "tx2", branch, branch, Span::default());
        assert!(!other.has_safety_net(&scopes));
    }

    #[test]
    fn test_custom_acquire_methods() {
        let config = AnalysisConfig {
            acquire_methods: vec!["StartTransaction".to_string()],
            ..AnalysisConfig::default()
        };
        let r = Recognizers::from_config(&config);
        assert_eq!(
            r.acquisition(&method_call(ident("pool"), "StartTransaction", vec![])),
            Some(AcquisitionKind::Custom)
        );
    }

    #[test]
    fn test_abort_kinds() {
        let r = Recognizers::default();
        assert_eq!(
            r.abort_kind(&method_call(ident("log"), "Fatalf", vec![])),
            Some(AbortKind::Fatal)
        );
        assert_eq!(
            r.abort_kind(&method_call(ident("logger"), "Fatal", vec![])),
            Some(AbortKind::Fatal)
        );
        assert_eq!(
            r.abort_kind(&method_call(ident("os"), "Exit", vec![])),
            Some(AbortKind::Fatal)
        );
        let panic_call = Expr::Call {
            func: Box::new(ident("panic")),
            args: vec![],
            span: Span::default(),
        };
        assert_eq!(r.abort_kind(&panic_call), Some(AbortKind::Panic));
        assert_eq!(r.abort_kind(&method_call(ident("log"), "Println", vec![])), None);
    }

    #[test]
    fn test_callback_helper_detection() {
        let r = Recognizers::default();
        assert!(r.is_callback_helper(&method_call(ident("store"), "WithTx", vec![ident("tx")])));

        let literal = Expr::FuncLit {
            params: vec![Param::new(Some("tx"), "*sql.Tx")],
            body: Default::default(),
            span: Span::default(),
        };
        assert!(r.is_callback_helper(&method_call(ident("repo"), "Run", vec![literal])));
        assert!(!r.is_callback_helper(&method_call(ident("repo"), "Run", vec![ident("tx")])));
    }

    #[test]
    fn test_finalizes_through_covered_construct() {
        let mut scopes = ScopeTree::new();
        let construct = scopes.open_construct(ConstructKind::If, true, Span::default());
        let then = scopes.push_arm(ScopeKind::IfBranch, construct).unwrap();
        scopes.pop().unwrap();
        let otherwise = scopes.push_arm(ScopeKind::ElseBranch, construct).unwrap();
        scopes.mark_terminated().unwrap();
        scopes.pop().unwrap();

        let mut binding = TransactionBinding::new(
            BindingId(0),
            "tx",
            scopes.root(),
            scopes.root(),
            Span::default(),
        );
        binding.events.push(event(EventKind::DirectCommit, then));

        // Else arm returns, then arm commits
        assert!(binding.finalizes(&scopes, scopes.root()));
        assert!(binding.arm_ok(&scopes, otherwise));
        assert!(binding.finalized_on_path(&scopes));
    }

    #[test]
    fn test_missing_fallback_does_not_finalize() {
        let mut scopes = ScopeTree::new();
        let construct = scopes.open_construct(ConstructKind::Switch, false, Span::default());
        let case = scopes.push_arm(ScopeKind::SwitchCase, construct).unwrap();
        scopes.pop().unwrap();

        let mut binding = TransactionBinding::new(
            BindingId(0),
            "tx",
            scopes.root(),
            scopes.root(),
            Span::default(),
        );
        binding.events.push(event(EventKind::DirectCommit, case));

        assert!(!binding.finalizes(&scopes, scopes.root()));
        assert!(binding.has_commit());
        assert!(!binding.has_rollback());
    }

    #[test]
    fn test_safety_net_and_field_store_escape() {
        let mut scopes = ScopeTree::new();
        let mut binding = TransactionBinding::new(
            BindingId(0),
            "tx",
            scopes.root(),
            scopes.root(),
            Span::new(0, 10),
        );
        assert!(!binding.has_safety_net(&scopes));
        scopes.add_defer().unwrap();
        scopes.note_deferred_rollback(scopes.root(), BindingId(0)).unwrap();
        binding.events.push(event(EventKind::DeferredRollback, scopes.root()));
        assert!(binding.has_safety_net(&scopes));
        assert!(binding.guarded_on_path(&scopes));

        binding.field_store_end = Some(40);
        binding.last_mention = 38;
        assert!(binding.is_escaped());
        binding.last_mention = 55;
        assert!(!binding.is_escaped());
    }
}
