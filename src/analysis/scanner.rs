//! Function scanner
//!
//! Enumerates the functions and methods of a parsed file and drops Go test
//! entrypoints. Every remaining function with a body becomes a `FunctionUnit`.

use crate::syntax::{Block, FuncDecl, Param, SourceFile};
use crate::types::Span;

/// One function or method handed to the tracker.
#[derive(Debug, Clone, Copy)]
pub struct FunctionUnit<'a> {
    pub name: &'a str,
    pub receiver: Option<&'a Param>,
    pub params: &'a [Param],
    pub body: &'a Block,
    pub span: Span,
    pub nesting_exceeded: bool,
}

impl<'a> FunctionUnit<'a> {
    /// `None` for declarations without a body (assembly stubs, `//go:linkname`).
    pub fn from_decl(decl: &'a FuncDecl) -> Option<Self> {
        let body = decl.body.as_ref()?;
        Some(Self {
            name: &decl.name,
            receiver: decl.receiver.as_ref(),
            params: &decl.params,
            body,
            span: decl.span,
            nesting_exceeded: decl.nesting_exceeded,
        })
    }
}

/// Functions of `file` to analyze, in declaration order.
pub fn scan(file: &SourceFile) -> Vec<FunctionUnit<'_>> {
    file.functions
        .iter()
        .filter(|decl| {
            let skip = is_test_entrypoint(decl);
            if skip {
                tracing::debug!("skipping test entrypoint {}", decl.name);
            }
            !skip
        })
        .filter_map(FunctionUnit::from_decl)
        .collect()
}

/// Go's `go test` entrypoint rule: a recognized prefix followed by the end of
/// the name or a character that is not a lowercase letter, no receiver, and
/// the matching `testing` signature.
pub fn is_test_entrypoint(decl: &FuncDecl) -> bool {
    if decl.is_method() {
        return false;
    }

    if decl.name == "TestMain" {
        return single_param_of(&decl.params, "*testing.M");
    }

    let expected = [
        ("Test", Some("*testing.T")),
        ("Benchmark", Some("*testing.B")),
        ("Fuzz", Some("*testing.F")),
        ("Example", None),
    ];

    expected.iter().any(|(prefix, param)| {
        has_entry_prefix(&decl.name, prefix)
            && match param {
                Some(ty) => single_param_of(&decl.params, ty),
                None => decl.params.is_empty(),
            }
    })
}

fn has_entry_prefix(name: &str, prefix: &str) -> bool {
    match name.strip_prefix(prefix) {
        Some(rest) => rest.chars().next().is_none_or(|c| !c.is_lowercase()),
        None => false,
    }
}

fn single_param_of(params: &[Param], ty: &str) -> bool {
    match params {
        [param] => normalize_type(&param.type_text) == ty,
        _ => false,
    }
}

fn normalize_type(type_text: &str) -> String {
    type_text.chars().filter(|c| !c.is_whitespace()).collect()
}
