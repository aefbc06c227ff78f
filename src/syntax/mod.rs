//! Closed syntax tree consumed by the transaction checker
//!
//! The Go parser lowers tree-sitter nodes into these types. Only the constructs
//! the lifecycle tracker reasons about get their own variant; everything else is
//! kept as `Expr::Other` (children preserved so identifier mentions stay visible)
//! or `Stmt::Unsupported` (skipped by the tracker).

use crate::types::Span;

/// Default bound on statement and expression nesting, for lowering and for
/// the tracker's scope stack.
pub const DEFAULT_MAX_NESTING: usize = 128;

/// One parsed Go file.
#[derive(Debug, Clone, Default)]
pub struct SourceFile {
    pub package: Option<String>,
    pub functions: Vec<FuncDecl>,
}

/// A top-level function or method declaration.
#[derive(Debug, Clone)]
pub struct FuncDecl {
    pub name: String,
    pub receiver: Option<Param>,
    pub params: Vec<Param>,
    pub body: Option<Block>,
    pub span: Span,
    /// Lowering stopped at the nesting limit, so `body` is incomplete.
    pub nesting_exceeded: bool,
}

impl FuncDecl {
    pub fn is_method(&self) -> bool {
        self.receiver.is_some()
    }
}

/// A single parameter. Grouped declarations (`a, b int`) are split into one
/// `Param` per name sharing the same type text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: Option<String>,
    pub type_text: String,
}

impl Param {
    pub fn new(name: Option<&str>, type_text: &str) -> Self {
        Self {
            name: name.map(str::to_string),
            type_text: type_text.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    /// `a, b := x, y`
    ShortVarDecl {
        left: Vec<Expr>,
        right: Vec<Expr>,
        span: Span,
    },
    /// `var a, b = x, y` (one statement per `var_spec`)
    VarDecl {
        names: Vec<String>,
        values: Vec<Expr>,
        span: Span,
    },
    /// `a, b = x, y` and compound forms such as `a += x`
    Assign {
        left: Vec<Expr>,
        right: Vec<Expr>,
        span: Span,
    },
    Expr {
        expr: Expr,
        span: Span,
    },
    Return {
        values: Vec<Expr>,
        span: Span,
    },
    Defer {
        call: Expr,
        span: Span,
    },
    Go {
        call: Expr,
        span: Span,
    },
    If(IfStmt),
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        post: Option<Box<Stmt>>,
        body: Block,
        span: Span,
    },
    Range {
        left: Vec<Expr>,
        declares: bool,
        right: Expr,
        body: Block,
        span: Span,
    },
    /// Expression and type switches.
    Switch {
        init: Option<Box<Stmt>>,
        tag: Option<Expr>,
        cases: Vec<CaseClause>,
        span: Span,
    },
    Select {
        cases: Vec<CaseClause>,
        span: Span,
    },
    Block(Block),
    /// Statements that share the enclosing scope, such as the specs of a
    /// grouped `var` under a label.
    Seq {
        stmts: Vec<Stmt>,
        span: Span,
    },
    Labeled {
        label: String,
        stmt: Box<Stmt>,
        span: Span,
    },
    IncDec {
        operand: Expr,
        span: Span,
    },
    Send {
        channel: Expr,
        value: Expr,
        span: Span,
    },
    /// `break`, `continue`, `goto`, `fallthrough`
    Branch {
        span: Span,
    },
    /// Declarations without runtime effect and empty statements.
    Empty {
        span: Span,
    },
    Unsupported {
        kind: String,
        span: Span,
    },
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::ShortVarDecl { span, .. }
            | Stmt::VarDecl { span, .. }
            | Stmt::Assign { span, .. }
            | Stmt::Expr { span, .. }
            | Stmt::Return { span, .. }
            | Stmt::Defer { span, .. }
            | Stmt::Go { span, .. }
            | Stmt::For { span, .. }
            | Stmt::Range { span, .. }
            | Stmt::Switch { span, .. }
            | Stmt::Select { span, .. }
            | Stmt::Seq { span, .. }
            | Stmt::Labeled { span, .. }
            | Stmt::IncDec { span, .. }
            | Stmt::Send { span, .. }
            | Stmt::Branch { span }
            | Stmt::Empty { span }
            | Stmt::Unsupported { span, .. } => *span,
            Stmt::If(stmt) => stmt.span,
            Stmt::Block(block) => block.span,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IfStmt {
    pub init: Option<Box<Stmt>>,
    pub cond: Expr,
    pub then: Block,
    pub otherwise: Option<Box<Else>>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum Else {
    Block(Block),
    If(IfStmt),
}

/// A `case`/`default` clause of a switch or select.
#[derive(Debug, Clone)]
pub struct CaseClause {
    pub is_default: bool,
    /// Case values for expression switches; empty for type switches.
    pub values: Vec<Expr>,
    /// The send/receive operation of a select case.
    pub comm: Option<Box<Stmt>>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Ident {
        name: String,
        span: Span,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        span: Span,
    },
    Selector {
        operand: Box<Expr>,
        field: String,
        span: Span,
    },
    FuncLit {
        params: Vec<Param>,
        body: Block,
        span: Span,
    },
    Composite {
        elements: Vec<Expr>,
        span: Span,
    },
    KeyValue {
        key: Box<Expr>,
        value: Box<Expr>,
        span: Span,
    },
    Unary {
        op: String,
        operand: Box<Expr>,
        span: Span,
    },
    Literal {
        span: Span,
    },
    Other {
        kind: String,
        children: Vec<Expr>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Ident { span, .. }
            | Expr::Call { span, .. }
            | Expr::Selector { span, .. }
            | Expr::FuncLit { span, .. }
            | Expr::Composite { span, .. }
            | Expr::KeyValue { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Literal { span }
            | Expr::Other { span, .. } => *span,
        }
    }

    pub fn as_ident(&self) -> Option<&str> {
        match self {
            Expr::Ident { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.as_ident() == Some("_")
    }

    /// Dotted name of an identifier or selector chain (`log.Fatal`, `s.db`).
    /// Returns `None` for anything containing calls, indexing or literals.
    pub fn qualified_name(&self) -> Option<String> {
        match self {
            Expr::Ident { name, .. } => Some(name.clone()),
            Expr::Selector { operand, field, .. } => operand
                .qualified_name()
                .map(|prefix| format!("{prefix}.{field}")),
            _ => None,
        }
    }

    /// For a call `recv.method(...)`, the receiver expression and method name.
    pub fn method_call(&self) -> Option<(&Expr, &str)> {
        match self {
            Expr::Call { func, .. } => match func.as_ref() {
                Expr::Selector { operand, field, .. } => Some((operand.as_ref(), field.as_str())),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn call_args(&self) -> &[Expr] {
        match self {
            Expr::Call { args, .. } => args,
            _ => &[],
        }
    }
}
