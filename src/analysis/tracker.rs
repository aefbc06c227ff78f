//! Statement walk for one function body
//!
//! `AnalysisContext` owns everything the walk needs: the scope tree, the
//! binding table and a step budget. It is built fresh for every function and
//! consumed by [`AnalysisContext::run`], so nothing leaks between functions.
//!
//! Reachability is approximated structurally. A binding counts as finalized
//! on the current path when some scope on the scope stack finalizes it (see
//! [`TransactionBinding::finalizes`]); no control-flow graph is built.

use crate::analysis::binding::{
    AbortKind, AcquisitionKind, BindingId, EventKind, LifecycleEvent, Recognizers,
    TransactionBinding,
};
use crate::analysis::scanner::FunctionUnit;
use crate::analysis::scope::{ConstructId, ConstructKind, ScopeId, ScopeKind, ScopeTree};
use crate::error::{AnalysisError, AnalysisResult};
use crate::syntax::{Block, CaseClause, DEFAULT_MAX_NESTING, Else, Expr, IfStmt, Param, Stmt};
use crate::types::Span;
use tracing::debug;

/// Result of walking one function.
#[derive(Debug, Clone)]
pub struct Tracked {
    pub scopes: ScopeTree,
    pub bindings: Vec<TransactionBinding>,
}

/// A `go` statement currently being walked.
#[derive(Debug, Clone, Copy)]
struct GoFrame {
    scope: ScopeId,
    span: Span,
}

/// An acquisition waiting for its `if err != nil` check.
#[derive(Debug, Clone)]
struct PendingGuard {
    binding: BindingId,
    err_var: String,
}

pub struct AnalysisContext<'r> {
    recognizers: &'r Recognizers,
    scopes: ScopeTree,
    bindings: Vec<TransactionBinding>,
    steps: usize,
    max_steps: usize,
    max_depth: usize,
    /// Span of the statement being walked.
    stmt_span: Span,
    /// Depth of non-deferred function literals.
    closure_depth: usize,
    /// Scope of the `defer` whose literal body is being walked.
    defer_scope: Option<ScopeId>,
    go_frames: Vec<GoFrame>,
    /// Bindings whose acquisition error branch is being walked.
    guarded: Vec<BindingId>,
    pending_guards: Vec<PendingGuard>,
    /// Walking the right side of `_ = ...`.
    discarding: bool,
}

impl<'r> AnalysisContext<'r> {
    pub fn new(recognizers: &'r Recognizers, max_steps: usize) -> Self {
        Self {
            recognizers,
            scopes: ScopeTree::new(),
            bindings: Vec::new(),
            steps: 0,
            max_steps,
            max_depth: DEFAULT_MAX_NESTING,
            stmt_span: Span::default(),
            closure_depth: 0,
            defer_scope: None,
            go_frames: Vec::new(),
            guarded: Vec::new(),
            pending_guards: Vec::new(),
            discarding: false,
        }
    }

    /// Bound the scope stack depth.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Walk `unit` and hand back the scope tree and every binding seen.
    pub fn run(mut self, unit: &FunctionUnit<'_>) -> AnalysisResult<Tracked> {
        debug!("tracking function {}", unit.name);

        if unit.nesting_exceeded {
            return Err(AnalysisError::NestingLimitExceeded {
                limit: self.max_depth,
            });
        }

        if let Some(receiver) = unit.receiver {
            self.declare_param(receiver)?;
        }
        for param in unit.params {
            self.declare_param(param)?;
        }

        self.walk_stmts(&unit.body.stmts)?;

        for binding in &self.bindings {
            debug!(
                "binding {} in {}: {} events, escaped={}",
                binding.name,
                unit.name,
                binding.events.len(),
                binding.is_escaped()
            );
        }

        Ok(Tracked {
            scopes: self.scopes,
            bindings: self.bindings,
        })
    }

    fn declare_param(&mut self, param: &Param) -> AnalysisResult<()> {
        match param.name.as_deref() {
            Some(name) if name != "_" => self.scopes.declare(name),
            _ => Ok(()),
        }
    }

    fn step(&mut self) -> AnalysisResult<()> {
        self.steps += 1;
        if self.steps > self.max_steps {
            return Err(AnalysisError::StepLimitExceeded {
                limit: self.max_steps,
            });
        }
        Ok(())
    }

    // ---- scopes -------------------------------------------------------

    fn check_depth(&self) -> AnalysisResult<()> {
        if self.scopes.depth() >= self.max_depth {
            return Err(AnalysisError::NestingLimitExceeded {
                limit: self.max_depth,
            });
        }
        Ok(())
    }

    fn enter(&mut self, kind: ScopeKind) -> AnalysisResult<ScopeId> {
        self.check_depth()?;
        self.scopes.push(kind)
    }

    fn enter_arm(&mut self, kind: ScopeKind, construct: ConstructId) -> AnalysisResult<ScopeId> {
        self.check_depth()?;
        self.scopes.push_arm(kind, construct)
    }

    fn walk_scoped(&mut self, kind: ScopeKind, stmts: &[Stmt]) -> AnalysisResult<ScopeId> {
        let id = self.enter(kind)?;
        self.walk_stmts(stmts)?;
        self.scopes.pop()?;
        Ok(id)
    }

    fn walk_arm(
        &mut self,
        kind: ScopeKind,
        construct: ConstructId,
        stmts: &[Stmt],
    ) -> AnalysisResult<()> {
        self.enter_arm(kind, construct)?;
        self.walk_stmts(stmts)?;
        self.scopes.pop()?;
        Ok(())
    }

    // ---- statements ---------------------------------------------------

    fn walk_stmts(&mut self, stmts: &[Stmt]) -> AnalysisResult<()> {
        for stmt in stmts {
            let pending = std::mem::take(&mut self.pending_guards);
            match stmt {
                Stmt::If(if_stmt) => {
                    self.step()?;
                    self.stmt_span = if_stmt.span;
                    self.walk_if(if_stmt, pending)?;
                }
                _ => self.walk_stmt(stmt)?,
            }
        }
        Ok(())
    }

    fn walk_stmt(&mut self, stmt: &Stmt) -> AnalysisResult<()> {
        self.step()?;
        self.stmt_span = stmt.span();

        match stmt {
            Stmt::ShortVarDecl { left, right, span } => {
                self.walk_exprs(right)?;
                self.declaration(left, right, *span, true)
            }

            Stmt::VarDecl {
                names,
                values,
                span,
            } => {
                self.walk_exprs(values)?;
                let left: Vec<Expr> = names
                    .iter()
                    .map(|name| Expr::Ident {
                        name: name.clone(),
                        span: *span,
                    })
                    .collect();
                self.declaration(&left, values, *span, true)
            }

            Stmt::Assign { left, right, span } => self.assignment(left, right, *span),

            Stmt::Expr { expr, .. } => self.walk_expr(expr),

            Stmt::Return { values, .. } => self.walk_return(values),

            Stmt::Defer { call, span } => self.walk_defer(call, *span),

            Stmt::Go { call, span } => self.walk_go(call, *span),

            Stmt::If(if_stmt) => self.walk_if(if_stmt, Vec::new()),

            Stmt::For {
                init,
                cond,
                post,
                body,
                ..
            } => {
                if let Some(init) = init {
                    self.walk_stmt(init)?;
                }
                if let Some(cond) = cond {
                    self.walk_expr(cond)?;
                }
                self.enter(ScopeKind::LoopBody)?;
                self.walk_stmts(&body.stmts)?;
                if let Some(post) = post {
                    self.walk_stmt(post)?;
                }
                self.scopes.pop()?;
                Ok(())
            }

            Stmt::Range {
                left,
                declares,
                right,
                body,
                ..
            } => {
                self.walk_expr(right)?;
                self.enter(ScopeKind::LoopBody)?;
                if *declares {
                    for name in left.iter().filter_map(Expr::as_ident) {
                        if name != "_" {
                            self.scopes.declare(name)?;
                        }
                    }
                } else {
                    self.walk_exprs(left)?;
                }
                self.walk_stmts(&body.stmts)?;
                self.scopes.pop()?;
                Ok(())
            }

            Stmt::Switch {
                init,
                tag,
                cases,
                span,
            } => {
                if let Some(init) = init {
                    self.walk_stmt(init)?;
                }
                if let Some(tag) = tag {
                    self.walk_expr(tag)?;
                }
                self.walk_cases(ConstructKind::Switch, cases, *span)
            }

            Stmt::Select { cases, span } => self.walk_cases(ConstructKind::Select, cases, *span),

            Stmt::Block(block) => self.walk_scoped(ScopeKind::Block, &block.stmts).map(|_| ()),

            Stmt::Seq { stmts, .. } => self.walk_stmts(stmts),

            Stmt::Labeled { stmt, .. } => self.walk_stmt(stmt),

            Stmt::IncDec { operand, .. } => self.walk_expr(operand),

            Stmt::Send { channel, value, .. } => {
                self.walk_expr(channel)?;
                self.walk_expr(value)
            }

            Stmt::Branch { .. } | Stmt::Empty { .. } => Ok(()),

            Stmt::Unsupported { kind, .. } => {
                debug!("skipping unsupported statement {kind}");
                Ok(())
            }
        }
    }

    fn walk_if(&mut self, stmt: &IfStmt, mut pending: Vec<PendingGuard>) -> AnalysisResult<()> {
        if let Some(init) = &stmt.init {
            self.walk_stmt(init)?;
            pending.append(&mut self.pending_guards);
        }
        self.stmt_span = stmt.span;
        self.walk_expr(&stmt.cond)?;

        let guarded: Vec<BindingId> = pending
            .into_iter()
            .filter(|guard| mentions(&stmt.cond, &guard.err_var))
            .map(|guard| guard.binding)
            .collect();

        let construct =
            self.scopes
                .open_construct(ConstructKind::If, stmt.otherwise.is_some(), stmt.span);

        let guard_len = self.guarded.len();
        self.guarded.extend(guarded);
        let result = self.walk_arm(ScopeKind::IfBranch, construct, &stmt.then.stmts);
        self.guarded.truncate(guard_len);
        result?;

        match stmt.otherwise.as_deref() {
            Some(Else::Block(block)) => {
                self.walk_arm(ScopeKind::ElseBranch, construct, &block.stmts)?;
            }
            Some(Else::If(nested)) => {
                self.enter_arm(ScopeKind::ElseBranch, construct)?;
                self.step()?;
                self.walk_if(nested, Vec::new())?;
                self.scopes.pop()?;
            }
            None => {}
        }

        Ok(())
    }

    fn walk_cases(
        &mut self,
        kind: ConstructKind,
        cases: &[CaseClause],
        span: Span,
    ) -> AnalysisResult<()> {
        let has_default = cases.iter().any(|c| c.is_default);
        let construct = self.scopes.open_construct(kind, has_default, span);
        let arm_kind = match kind {
            ConstructKind::Select => ScopeKind::SelectCase,
            _ => ScopeKind::SwitchCase,
        };

        for case in cases {
            self.enter_arm(arm_kind, construct)?;
            self.stmt_span = case.span;
            self.walk_exprs(&case.values)?;
            if let Some(comm) = &case.comm {
                self.walk_stmt(comm)?;
            }
            self.walk_stmts(&case.body)?;
            self.scopes.pop()?;
        }

        Ok(())
    }

    /// `:=` and `var` declarations.
    fn declaration(
        &mut self,
        left: &[Expr],
        right: &[Expr],
        span: Span,
        declares: bool,
    ) -> AnalysisResult<()> {
        let acquisition = match right {
            [call] => self.recognizers.acquisition(call),
            _ => None,
        };

        for (index, target) in left.iter().enumerate() {
            let Some(name) = target.as_ident() else {
                continue;
            };
            if name == "_" {
                continue;
            }

            match acquisition {
                Some(kind) if index == 0 => {
                    let err_var = error_target(left, kind);
                    self.acquire(name, err_var, kind, span, declares)?;
                }
                _ => {
                    if declares {
                        self.scopes.declare(name)?;
                    }
                }
            }
        }

        Ok(())
    }

    fn assignment(&mut self, left: &[Expr], right: &[Expr], span: Span) -> AnalysisResult<()> {
        // `_ = tx.Commit()`
        let discards = left.len() == 1 && left[0].is_blank();
        self.discarding = discards;
        let walked = self.walk_exprs(right);
        self.discarding = false;
        walked?;

        // Field store `x.f = tx`
        for (target, value) in left.iter().zip(right) {
            if !matches!(target, Expr::Selector { .. }) {
                continue;
            }
            if let Some(id) = value.as_ident().and_then(|name| self.resolve(name)) {
                let end = span.end;
                self.binding_mut(id).field_store_end = Some(end);
            }
        }

        // Plain acquisitions into existing variables
        if let [call] = right {
            if let Some(kind) = self.recognizers.acquisition(call) {
                if let Some(name) = left.first().and_then(Expr::as_ident) {
                    if name != "_" {
                        let err_var = error_target(left, kind);
                        self.acquire(name, err_var, kind, span, false)?;
                    }
                }
                return Ok(());
            }
        }

        for target in left {
            if !target.is_blank() && !matches!(target, Expr::Ident { .. }) {
                self.walk_expr(target)?;
            }
        }

        Ok(())
    }

    fn acquire(
        &mut self,
        name: &str,
        err_var: Option<String>,
        kind: AcquisitionKind,
        span: Span,
        declares: bool,
    ) -> AnalysisResult<()> {
        let current = self.scopes.current();
        let existing = self.resolve(name);

        if let Some(err) = &err_var {
            if declares {
                self.scopes.declare(err)?;
            }
        }

        let id = match existing {
            Some(id) if declares && self.bindings[id.0].home != current => {
                if !self.bindings[id.0].finalized_on_path(&self.scopes) {
                    self.push_event(id, EventKind::Shadowing)?;
                }
                self.new_binding(name, current, current, span)
            }
            Some(id) => self.reacquire(id, span)?,
            None => {
                let home = if declares {
                    current
                } else {
                    self.scopes.declaring_scope(name).unwrap_or(current)
                };
                self.new_binding(name, home, current, span)
            }
        };

        debug!("acquired transaction {name} via {kind:?}");

        let binding = self.binding_mut(id);
        if err_var.is_some() {
            binding.err_var = err_var.clone();
        }
        if let Some(err_var) = err_var {
            self.pending_guards.push(PendingGuard {
                binding: id,
                err_var,
            });
        }

        Ok(())
    }

    /// A second acquisition into a variable that already holds a binding.
    fn reacquire(&mut self, id: BindingId, span: Span) -> AnalysisResult<BindingId> {
        let current = self.scopes.current();
        let binding = &self.bindings[id.0];

        if binding.finalized_on_path(&self.scopes) || binding.is_escaped() {
            let (name, home) = (binding.name.clone(), binding.home);
            self.binding_mut(id).retired = true;
            return Ok(self.new_binding(&name, home, current, span));
        }

        if !self.scopes.is_on_stack(binding.acquired_in) {
            // Acquired on a sibling branch that has already been left
            let merged = self.scopes.common_ancestor(binding.acquired_in, current);
            self.binding_mut(id).acquired_in = merged;
            return Ok(id);
        }

        self.push_event(id, EventKind::Reassignment)?;
        Ok(id)
    }

    fn new_binding(
        &mut self,
        name: &str,
        home: ScopeId,
        acquired_in: ScopeId,
        span: Span,
    ) -> BindingId {
        let id = BindingId(self.bindings.len());
        self.bindings
            .push(TransactionBinding::new(id, name, home, acquired_in, span));
        id
    }

    fn walk_return(&mut self, values: &[Expr]) -> AnalysisResult<()> {
        let in_closure = self.scopes.in_closure();
        if !in_closure {
            for value in values {
                for id in self.escaping(value) {
                    debug!("transaction {} escapes through return", self.bindings[id.0].name);
                    self.binding_mut(id).escaped = true;
                }
            }
        }

        self.walk_exprs(values)?;

        if in_closure {
            return Ok(());
        }

        for id in self.exposed_bindings() {
            self.push_event(id, EventKind::EarlyReturn)?;
        }
        self.scopes.mark_terminated()
    }

    /// Bindings a `return` or abort could leak: visible, active, not
    /// guarded on this path and not inside their own error check.
    fn exposed_bindings(&self) -> Vec<BindingId> {
        self.bindings
            .iter()
            .filter(|b| !b.retired && !b.is_escaped())
            .filter(|b| self.resolve(&b.name) == Some(b.id))
            .filter(|b| !self.guarded.contains(&b.id))
            .filter(|b| !b.guarded_on_path(&self.scopes))
            .map(|b| b.id)
            .collect()
    }

    /// Bindings handed out by a returned expression.
    fn escaping(&self, value: &Expr) -> Vec<BindingId> {
        match value {
            Expr::Ident { name, .. } => self.resolve(name).into_iter().collect(),
            Expr::Unary { op, operand, .. } if op == "&" => self.escaping(operand),
            Expr::Composite { elements, .. } => {
                elements.iter().flat_map(|e| self.escaping(e)).collect()
            }
            Expr::KeyValue { value, .. } => self.escaping(value),
            _ => Vec::new(),
        }
    }

    fn walk_defer(&mut self, call: &Expr, span: Span) -> AnalysisResult<()> {
        self.scopes.add_defer()?;
        let scope = self.scopes.current();

        let Expr::Call { func, args, .. } = call else {
            return self.walk_expr(call);
        };

        match func.as_ref() {
            Expr::FuncLit { params, body, .. } => {
                self.walk_exprs(args)?;
                let outer = self.defer_scope.replace(scope);
                let result = self.walk_literal(ScopeKind::Closure, params, body);
                self.defer_scope = outer;
                result
            }
            _ => {
                if let Some((receiver, method)) = call.method_call() {
                    if let Some(id) = receiver.as_ident().and_then(|n| self.resolve(n)) {
                        let kind = if self.recognizers.is_commit(method) {
                            EventKind::DeferredCommit
                        } else {
                            EventKind::DeferredRollback
                        };
                        self.push_deferred(id, kind, scope)?;
                    }
                } else {
                    // `defer cleanup(tx)`
                    for arg in args {
                        let target = match arg {
                            Expr::Unary { op, operand, .. } if op == "&" => operand.as_ref(),
                            other => other,
                        };
                        if let Some(id) = target.as_ident().and_then(|n| self.resolve(n)) {
                            self.push_deferred(id, EventKind::DeferredRollback, scope)?;
                        }
                    }
                }
                self.walk_expr(func)?;
                self.walk_exprs(args)
            }
        }
    }

    fn walk_go(&mut self, call: &Expr, span: Span) -> AnalysisResult<()> {
        let Expr::Call { func, args, .. } = call else {
            return self.walk_expr(call);
        };

        // Handles passed as arguments are shared with the goroutine
        if self.defer_scope.is_none() {
            for arg in args {
                if let Some(id) = arg.as_ident().and_then(|n| self.resolve(n)) {
                    self.capture(id, span)?;
                }
            }
        }
        self.walk_exprs(args)?;

        match func.as_ref() {
            Expr::FuncLit { params, body, .. } => {
                self.in_goroutine(span, |this| this.walk_literal_body(params, body))
            }
            // `go tx.Commit()` finalizes on the new goroutine
            other => self.in_goroutine(span, |this| {
                this.finalize_through(call)?;
                this.walk_expr(other)
            }),
        }
    }

    fn in_goroutine<F>(&mut self, span: Span, walk: F) -> AnalysisResult<()>
    where
        F: FnOnce(&mut Self) -> AnalysisResult<()>,
    {
        let scope = self.enter(ScopeKind::Goroutine)?;
        self.go_frames.push(GoFrame { scope, span });
        self.closure_depth += 1;
        let result = walk(self);
        self.closure_depth -= 1;
        self.go_frames.pop();
        result?;
        self.scopes.pop()?;
        Ok(())
    }

    fn capture(&mut self, id: BindingId, span: Span) -> AnalysisResult<()> {
        let already = self.bindings[id.0]
            .events
            .iter()
            .any(|e| e.kind == EventKind::GoroutineCapture && e.span == span);
        if already {
            return Ok(());
        }
        debug!("transaction {} captured by goroutine", self.bindings[id.0].name);
        self.push_event_at(id, EventKind::GoroutineCapture, span, self.scopes.current())
    }

    /// Walk a non-`go` function literal in its own scope.
    fn walk_literal(
        &mut self,
        kind: ScopeKind,
        params: &[Param],
        body: &Block,
    ) -> AnalysisResult<()> {
        self.enter(kind)?;
        if self.defer_scope.is_none() {
            self.closure_depth += 1;
        }
        let result = self.walk_literal_body(params, body);
        if self.defer_scope.is_none() {
            self.closure_depth -= 1;
        }
        result?;
        self.scopes.pop()?;
        Ok(())
    }

    fn walk_literal_body(&mut self, params: &[Param], body: &Block) -> AnalysisResult<()> {
        for param in params {
            self.declare_param(param)?;
        }
        let outer_guards = std::mem::take(&mut self.guarded);
        let outer_span = self.stmt_span;
        let result = self.walk_stmts(&body.stmts);
        self.guarded = outer_guards;
        self.stmt_span = outer_span;
        result
    }

    // ---- expressions --------------------------------------------------

    fn walk_exprs(&mut self, exprs: &[Expr]) -> AnalysisResult<()> {
        for expr in exprs {
            self.walk_expr(expr)?;
        }
        Ok(())
    }

    fn walk_expr(&mut self, expr: &Expr) -> AnalysisResult<()> {
        match expr {
            Expr::Ident { name, span } => {
                if let Some(id) = self.resolve(name) {
                    self.mention(id, *span)?;
                }
                Ok(())
            }

            Expr::Call { func, args, .. } => self.walk_call(expr, func, args),

            Expr::Selector { operand, .. } => self.walk_expr(operand),

            Expr::FuncLit { params, body, .. } => {
                let outer = self.defer_scope.take();
                let result = self.walk_literal(ScopeKind::Closure, params, body);
                self.defer_scope = outer;
                result
            }

            Expr::Composite { elements, .. } => self.walk_exprs(elements),

            Expr::KeyValue { key, value, .. } => {
                // Struct field keys are names, not references
                if !matches!(key.as_ref(), Expr::Ident { .. }) {
                    self.walk_expr(key)?;
                }
                self.walk_expr(value)
            }

            Expr::Unary { operand, .. } => self.walk_expr(operand),

            Expr::Literal { .. } => Ok(()),

            Expr::Other { children, .. } => self.walk_exprs(children),
        }
    }

    /// Commit or rollback called on a tracked handle.
    fn finalize_through(&mut self, call: &Expr) -> AnalysisResult<()> {
        if let Some((receiver, method)) = call.method_call() {
            if let Some(id) = receiver.as_ident().and_then(|n| self.resolve(n)) {
                let commit = self.recognizers.is_commit(method);
                if commit || self.recognizers.is_rollback(method) {
                    self.finalize(id, commit)?;
                }
            }
        }
        Ok(())
    }

    fn walk_call(&mut self, call: &Expr, func: &Expr, args: &[Expr]) -> AnalysisResult<()> {
        self.finalize_through(call)?;

        // Delegation to a transaction-scoped helper
        if self.recognizers.is_callback_helper(call) {
            let mut passed: Vec<BindingId> = Vec::new();
            for arg in args {
                if let Some(id) = arg.as_ident().and_then(|n| self.resolve(n)) {
                    passed.push(id);
                }
            }
            for id in &passed {
                if passed.iter().filter(|p| *p == id).count() == 1 {
                    debug!("transaction {} delegated to callback helper", self.bindings[id.0].name);
                    self.binding_mut(*id).escaped = true;
                }
            }
        }

        self.walk_expr(func)?;
        let discarding = std::mem::replace(&mut self.discarding, false);
        let walked = self.walk_exprs(args);
        self.discarding = discarding;
        walked?;

        if let Some(abort) = self.recognizers.abort_kind(call) {
            self.abort(abort)?;
        }

        Ok(())
    }

    fn finalize(&mut self, id: BindingId, commit: bool) -> AnalysisResult<()> {
        match self.defer_scope {
            Some(scope) => {
                let kind = if commit {
                    EventKind::DeferredCommit
                } else {
                    EventKind::DeferredRollback
                };
                self.push_deferred(id, kind, scope)
            }
            None => {
                let kind = if commit {
                    EventKind::DirectCommit
                } else {
                    EventKind::DirectRollback
                };
                self.push_event(id, kind)?;
                if commit && self.discarding {
                    if let Some(event) = self.binding_mut(id).events.last_mut() {
                        event.error_discarded = true;
                    }
                }
                Ok(())
            }
        }
    }

    fn abort(&mut self, kind: AbortKind) -> AnalysisResult<()> {
        if self.scopes.in_closure() {
            return Ok(());
        }
        for id in self.exposed_bindings() {
            self.push_event(id, EventKind::FatalExit(kind))?;
        }
        self.scopes.mark_terminated()
    }

    fn mention(&mut self, id: BindingId, span: Span) -> AnalysisResult<()> {
        {
            let binding = self.binding_mut(id);
            binding.last_mention = binding.last_mention.max(span.end);
        }

        if self.defer_scope.is_some() {
            return Ok(());
        }
        let home = self.bindings[id.0].home;
        let frames: Vec<GoFrame> = self
            .go_frames
            .iter()
            .copied()
            .filter(|frame| !self.scopes.is_ancestor(frame.scope, home))
            .collect();
        for frame in frames {
            self.capture(id, frame.span)?;
        }
        Ok(())
    }

    // ---- bindings -----------------------------------------------------

    /// Innermost visible binding named `name`. Plain locals and parameters
    /// declared closer in hide outer bindings.
    fn resolve(&self, name: &str) -> Option<BindingId> {
        for scope in self.scopes.stack().iter().rev() {
            let found = self
                .bindings
                .iter()
                .rev()
                .find(|b| b.name == name && b.home == *scope && !b.retired);
            if let Some(binding) = found {
                return Some(binding.id);
            }
            if self.scopes.declares(*scope, name) {
                return None;
            }
        }
        None
    }

    fn binding_mut(&mut self, id: BindingId) -> &mut TransactionBinding {
        &mut self.bindings[id.0]
    }

    fn push_event(&mut self, id: BindingId, kind: EventKind) -> AnalysisResult<()> {
        let span = self.stmt_span;
        let scope = self.scopes.current();
        self.push_event_at(id, kind, span, scope)
    }

    fn push_deferred(
        &mut self,
        id: BindingId,
        kind: EventKind,
        scope: ScopeId,
    ) -> AnalysisResult<()> {
        if kind == EventKind::DeferredRollback {
            self.scopes.note_deferred_rollback(scope, id)?;
        }
        let span = self.stmt_span;
        self.push_event_at(id, kind, span, scope)
    }

    fn push_event_at(
        &mut self,
        id: BindingId,
        kind: EventKind,
        span: Span,
        scope: ScopeId,
    ) -> AnalysisResult<()> {
        let loop_depth = self.scopes.get(scope)?.loop_depth;
        let in_closure = self.closure_depth > 0;
        self.binding_mut(id).events.push(LifecycleEvent {
            kind,
            span,
            scope,
            loop_depth,
            in_closure,
            error_discarded: false,
        });
        Ok(())
    }
}

/// Error variable of `tx, err := R.Begin()`. `MustBegin*` has none.
fn error_target(left: &[Expr], kind: AcquisitionKind) -> Option<String> {
    if !kind.returns_error() {
        return None;
    }
    left.get(1)
        .and_then(Expr::as_ident)
        .filter(|n| *n != "_")
        .map(str::to_string)
}

/// Whether `name` appears as an identifier anywhere in `expr`.
fn mentions(expr: &Expr, name: &str) -> bool {
    match expr {
        Expr::Ident { name: ident, .. } => ident == name,
        Expr::Call { func, args, .. } => {
            mentions(func, name) || args.iter().any(|a| mentions(a, name))
        }
        Expr::Selector { operand, .. } => mentions(operand, name),
        Expr::Composite { elements, .. } => elements.iter().any(|e| mentions(e, name)),
        Expr::KeyValue { key, value, .. } => mentions(key, name) || mentions(value, name),
        Expr::Unary { operand, .. } => mentions(operand, name),
        Expr::Other { children, .. } => children.iter().any(|c| mentions(c, name)),
        Expr::FuncLit { .. } | Expr::Literal { .. } => false,
    }
}
