//! Violation classifier
//!
//! Maps each binding's recorded events to at most one violation, first match
//! wins:
//!
//! 1. escaped bindings are skipped
//! 2. no commit and no rollback at all: `no_commit_rollback`
//! 3. `shadowed_transaction`, then `variable_reassignment`
//! 4. with a deferred rollback in the acquiring scope only `no_commit` remains
//! 5. otherwise goroutine capture, abort calls, loop and branch commits,
//!    missing rollback, missing commit, early return
//! 6. `commit_error_ignored` when nothing above applied

use crate::analysis::binding::{AbortKind, EventKind, LifecycleEvent, TransactionBinding};
use crate::analysis::scope::{ConstructKind, ScopeTree};
use crate::analysis::tracker::Tracked;
use crate::analysis::violation::{Violation, ViolationKind};
use crate::types::Span;

/// Classify every binding of one tracked function.
pub fn classify(function: &str, tracked: &Tracked) -> Vec<Violation> {
    tracked
        .bindings
        .iter()
        .filter_map(|binding| {
            classify_binding(binding, &tracked.scopes)
                .map(|(kind, span)| Violation::new(function, &binding.name, kind, span))
        })
        .collect()
}

fn classify_binding(
    binding: &TransactionBinding,
    scopes: &ScopeTree,
) -> Option<(ViolationKind, Span)> {
    if binding.is_escaped() {
        return None;
    }

    let at_acquisition = |kind: ViolationKind| Some((kind, binding.acquisition));

    if !binding.has_commit() && !binding.has_rollback() {
        return at_acquisition(ViolationKind::NoCommitRollback);
    }
    if binding.has(EventKind::Shadowing) {
        return at_acquisition(ViolationKind::ShadowedTransaction);
    }
    if binding.has(EventKind::Reassignment) {
        return at_acquisition(ViolationKind::VariableReassignment);
    }

    if binding.has_safety_net(scopes) {
        if !binding.has_commit() {
            return at_acquisition(ViolationKind::NoCommit);
        }
        return discarded_commit(binding);
    }

    if binding.has(EventKind::GoroutineCapture) {
        return at_acquisition(ViolationKind::GoroutineCapture);
    }
    if binding.has(EventKind::FatalExit(AbortKind::Fatal)) {
        return at_acquisition(ViolationKind::FatalWithoutDefer);
    }
    if binding.has(EventKind::FatalExit(AbortKind::Panic)) {
        return at_acquisition(ViolationKind::PanicWithoutDefer);
    }
    if let Some(commit) = commit_in_loop(binding, scopes) {
        return Some((ViolationKind::CommitInLoop, commit.span));
    }
    if let Some(found) = branch_commit(binding, scopes) {
        return Some(found);
    }
    if !binding.has_rollback() {
        return at_acquisition(ViolationKind::NoRollback);
    }
    if !binding.has_commit() {
        return at_acquisition(ViolationKind::NoCommit);
    }
    if binding.has(EventKind::EarlyReturn) {
        return at_acquisition(ViolationKind::EarlyReturn);
    }

    discarded_commit(binding)
}

fn direct_commits(binding: &TransactionBinding) -> impl Iterator<Item = &LifecycleEvent> {
    binding
        .events
        .iter()
        .filter(|e| e.kind == EventKind::DirectCommit && !e.in_closure)
}

/// The event runs inside more loops than the acquisition did.
fn crosses_loop(binding: &TransactionBinding, scopes: &ScopeTree, event: &LifecycleEvent) -> bool {
    let acquired_at = scopes
        .get(binding.acquired_in)
        .map_or(0, |scope| scope.loop_depth);
    event.loop_depth > acquired_at
}

/// A commit inside a loop the transaction was not started in, with no commit
/// after the loop.
fn commit_in_loop<'b>(
    binding: &'b TransactionBinding,
    scopes: &ScopeTree,
) -> Option<&'b LifecycleEvent> {
    let in_loop = direct_commits(binding).find(|e| crosses_loop(binding, scopes, e))?;
    let committed_after = direct_commits(binding)
        .any(|e| in_loop.span.precedes(e.span) && !crosses_loop(binding, scopes, e));
    (!committed_after).then_some(in_loop)
}

/// A commit that only some arms of an `if`/`switch`/`select` reach.
fn branch_commit(
    binding: &TransactionBinding,
    scopes: &ScopeTree,
) -> Option<(ViolationKind, Span)> {
    if binding.finalizes(scopes, binding.acquired_in) {
        return None;
    }

    direct_commits(binding).find_map(|event| {
        let construct = scopes
            .path_below(event.scope, binding.acquired_in)
            .filter_map(|s| scopes.get(s).ok().and_then(|scope| scope.arm_of))
            .filter_map(|id| scopes.construct(id))
            .find(|c| {
                !(c.has_fallback && c.arms.iter().all(|arm| binding.arm_ok(scopes, *arm)))
            })?;

        let kind = match construct.kind {
            ConstructKind::If => ViolationKind::ConditionalCommit,
            ConstructKind::Switch => ViolationKind::CommitInSwitch,
            ConstructKind::Select => ViolationKind::CommitInSelect,
        };
        let span = if kind.anchors_on_statement() {
            event.span
        } else {
            binding.acquisition
        };
        Some((kind, span))
    })
}

fn discarded_commit(binding: &TransactionBinding) -> Option<(ViolationKind, Span)> {
    binding
        .events
        .iter()
        .find(|e| e.kind == EventKind::DirectCommit && e.error_discarded)
        .map(|e| (ViolationKind::CommitErrorIgnored, e.span))
}
