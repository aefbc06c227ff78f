//! Lexical scope tracking for one function body
//!
//! Scopes live in an arena indexed by `ScopeId`; the walk keeps a stack of
//! ids for the scopes it is currently inside. Parents are plain indices, so a
//! popped scope stays readable for the classifier after the walk ends.

use crate::analysis::binding::BindingId;
use crate::error::{AnalysisError, AnalysisResult};
use crate::types::Span;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstructId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Function,
    Block,
    IfBranch,
    ElseBranch,
    SwitchCase,
    SelectCase,
    LoopBody,
    Closure,
    Goroutine,
}

impl ScopeKind {
    /// Function literal bodies, whether launched with `go` or not.
    pub fn is_closure(&self) -> bool {
        matches!(self, ScopeKind::Closure | ScopeKind::Goroutine)
    }
}

/// Branching statement whose arms are sibling scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstructKind {
    If,
    Switch,
    Select,
}

#[derive(Debug, Clone)]
pub struct Construct {
    pub kind: ConstructKind,
    pub owner: ScopeId,
    pub arms: Vec<ScopeId>,
    /// `else` or `default` present.
    pub has_fallback: bool,
    pub span: Span,
}

/// A `defer` statement registered directly in a scope.
#[derive(Debug, Clone, Default)]
pub struct DeferRecord {
    /// Bindings the deferred call rolls back.
    pub rollbacks: Vec<BindingId>,
}

impl DeferRecord {
    pub fn rolls_back(&self, binding: BindingId) -> bool {
        self.rollbacks.contains(&binding)
    }
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    pub kind: ScopeKind,
    pub loop_depth: u32,
    pub defers: Vec<DeferRecord>,
    pub children: Vec<ScopeId>,
    /// Set when this scope is one arm of a branching construct.
    pub arm_of: Option<ConstructId>,
    /// Non-transaction locals and parameters declared here.
    pub declared: HashSet<String>,
    /// Control never falls out of the end of this scope (return or abort seen).
    pub terminated: bool,
}

#[derive(Debug, Clone)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
    constructs: Vec<Construct>,
    stack: Vec<ScopeId>,
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeTree {
    /// Create a tree holding only the function scope.
    pub fn new() -> Self {
        let root = Scope {
            parent: None,
            kind: ScopeKind::Function,
            loop_depth: 0,
            defers: Vec::new(),
            children: Vec::new(),
            arm_of: None,
            declared: HashSet::new(),
            terminated: false,
        };
        Self {
            scopes: vec![root],
            constructs: Vec::new(),
            stack: vec![ScopeId(0)],
        }
    }

    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn current(&self) -> ScopeId {
        self.stack.last().copied().unwrap_or(ScopeId(0))
    }

    /// Scopes currently entered, outermost first.
    pub fn stack(&self) -> &[ScopeId] {
        &self.stack
    }

    /// Number of scopes entered, the function scope included.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn get(&self, id: ScopeId) -> AnalysisResult<&Scope> {
        self.scopes
            .get(id.0)
            .ok_or(AnalysisError::UnknownScope { index: id.0 })
    }

    fn get_mut(&mut self, id: ScopeId) -> AnalysisResult<&mut Scope> {
        self.scopes
            .get_mut(id.0)
            .ok_or(AnalysisError::UnknownScope { index: id.0 })
    }

    pub fn construct(&self, id: ConstructId) -> Option<&Construct> {
        self.constructs.get(id.0)
    }

    pub fn kind(&self, id: ScopeId) -> Option<ScopeKind> {
        self.scopes.get(id.0).map(|s| s.kind)
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Enter a new scope nested in the current one.
    pub fn push(&mut self, kind: ScopeKind) -> AnalysisResult<ScopeId> {
        let parent = self.current();
        let parent_depth = self.get(parent)?.loop_depth;
        let id = ScopeId(self.scopes.len());

        self.scopes.push(Scope {
            parent: Some(parent),
            kind,
            loop_depth: parent_depth + u32::from(kind == ScopeKind::LoopBody),
            defers: Vec::new(),
            children: Vec::new(),
            arm_of: None,
            declared: HashSet::new(),
            terminated: false,
        });
        self.get_mut(parent)?.children.push(id);
        self.stack.push(id);

        Ok(id)
    }

    /// Enter a scope that is one arm of `construct`.
    pub fn push_arm(
        &mut self,
        kind: ScopeKind,
        construct: ConstructId,
    ) -> AnalysisResult<ScopeId> {
        let id = self.push(kind)?;
        self.get_mut(id)?.arm_of = Some(construct);
        if let Some(c) = self.constructs.get_mut(construct.0) {
            c.arms.push(id);
        }
        Ok(id)
    }

    /// Leave the current scope. The function scope can never be popped.
    pub fn pop(&mut self) -> AnalysisResult<ScopeId> {
        if self.stack.len() <= 1 {
            return Err(AnalysisError::ScopeUnderflow);
        }
        self.stack.pop().ok_or(AnalysisError::ScopeUnderflow)
    }

    /// Register a branching construct owned by the current scope.
    pub fn open_construct(
        &mut self,
        kind: ConstructKind,
        has_fallback: bool,
        span: Span,
    ) -> ConstructId {
        let id = ConstructId(self.constructs.len());
        self.constructs.push(Construct {
            kind,
            owner: self.current(),
            arms: Vec::new(),
            has_fallback,
            span,
        });
        id
    }

    pub fn constructs_owned_by(&self, scope: ScopeId) -> impl Iterator<Item = &Construct> {
        self.constructs.iter().filter(move |c| c.owner == scope)
    }

    pub fn declare(&mut self, name: &str) -> AnalysisResult<()> {
        let current = self.current();
        self.get_mut(current)?.declared.insert(name.to_string());
        Ok(())
    }

    pub fn declares(&self, scope: ScopeId, name: &str) -> bool {
        self.scopes
            .get(scope.0)
            .is_some_and(|s| s.declared.contains(name))
    }

    /// Innermost scope on the stack that declares `name` as a plain local.
    pub fn declaring_scope(&self, name: &str) -> Option<ScopeId> {
        self.stack
            .iter()
            .rev()
            .copied()
            .find(|id| self.declares(*id, name))
    }

    pub fn mark_terminated(&mut self) -> AnalysisResult<()> {
        let current = self.current();
        self.get_mut(current)?.terminated = true;
        Ok(())
    }

    pub fn add_defer(&mut self) -> AnalysisResult<()> {
        let current = self.current();
        self.get_mut(current)?.defers.push(DeferRecord::default());
        Ok(())
    }

    /// Record that the most recent defer registered in `scope` rolls
    /// `binding` back.
    pub fn note_deferred_rollback(
        &mut self,
        scope: ScopeId,
        binding: BindingId,
    ) -> AnalysisResult<()> {
        let record = self.get_mut(scope)?.defers.last_mut();
        if let Some(record) = record {
            if !record.rolls_back(binding) {
                record.rollbacks.push(binding);
            }
        }
        Ok(())
    }

    /// Inside a function literal, deferred, launched with `go` or plain.
    pub fn in_closure(&self) -> bool {
        self.stack
            .iter()
            .any(|id| self.kind(*id).is_some_and(|kind| kind.is_closure()))
    }

    pub fn is_on_stack(&self, id: ScopeId) -> bool {
        self.stack.contains(&id)
    }

    /// `id` followed by its parents up to the function scope.
    pub fn ancestors(&self, id: ScopeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: Some(id),
        }
    }

    /// True when `ancestor` is `id` or one of its parents.
    pub fn is_ancestor(&self, ancestor: ScopeId, id: ScopeId) -> bool {
        self.ancestors(id).any(|s| s == ancestor)
    }

    pub fn common_ancestor(&self, a: ScopeId, b: ScopeId) -> ScopeId {
        self.ancestors(a)
            .find(|s| self.is_ancestor(*s, b))
            .unwrap_or(self.root())
    }

    /// Scopes from `id` upwards, stopping before `stop`. Walks to the root
    /// when `stop` is not an ancestor.
    pub fn path_below(&self, id: ScopeId, stop: ScopeId) -> impl Iterator<Item = ScopeId> + '_ {
        self.ancestors(id).take_while(move |s| *s != stop)
    }
}

pub struct Ancestors<'a> {
    tree: &'a ScopeTree,
    next: Option<ScopeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = ScopeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.tree.scopes.get(current.0).and_then(|s| s.parent);
        Some(current)
    }
}
