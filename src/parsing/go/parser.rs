//! Go parser implementation
//!
//! Uses tree-sitter-go crate’s LANGUAGE constant (converted via .into()).
//!
//! Note: This parser uses ABI-15 (upgraded from ABI-14).
//! When migrating or updating the parser, ensure compatibility with ABI-15 features.
//!
//! The parser lowers the concrete syntax tree into [`crate::syntax`]. Only
//! function and method declarations are kept at the top level; their bodies are
//! lowered statement by statement.

use crate::error::{ParseError, ParseResult};
use crate::syntax::{
    Block, CaseClause, DEFAULT_MAX_NESTING, Else, Expr, FuncDecl, IfStmt, Param, SourceFile, Stmt,
};
use crate::types::Span;
use std::cell::Cell;
use tree_sitter::{Node, Parser};

/// Go language parser
pub struct GoParser {
    parser: Parser,
    max_depth: usize,
}

impl GoParser {
    /// Create a new Go parser
    pub fn new() -> ParseResult<Self> {
        Self::with_max_depth(DEFAULT_MAX_NESTING)
    }

    /// Create a parser that stops lowering below `max_depth` nested statements
    /// and expressions. Functions cut off this way are marked
    /// `nesting_exceeded`.
    pub fn with_max_depth(max_depth: usize) -> ParseResult<Self> {
        let mut parser = Parser::new();
        let lang = tree_sitter_go::LANGUAGE;
        parser
            .set_language(&lang.into())
            .map_err(|e| ParseError::ParserInit {
                language: "Go".to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self { parser, max_depth })
    }

    /// Parse Go source code and lower every function and method declaration.
    ///
    /// Syntax errors do not fail the parse: tree-sitter recovers and the
    /// recovered regions lower to `Stmt::Unsupported`.
    pub fn parse(&mut self, code: &str) -> ParseResult<SourceFile> {
        let tree = self
            .parser
            .parse(code, None)
            .ok_or(ParseError::SyntaxTreeUnavailable)?;
        let root = tree.root_node();

        if root.has_error() {
            tracing::debug!("Go source contains syntax errors, continuing with recovered tree");
        }

        let lowering = Lowering {
            code,
            max_depth: self.max_depth,
            depth: Cell::new(0),
            exceeded: Cell::new(false),
        };
        let mut file = SourceFile::default();

        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            match child.kind() {
                "package_clause" => {
                    file.package = child
                        .named_child(0)
                        .map(|name| lowering.text(name).to_string());
                }
                "function_declaration" | "method_declaration" => {
                    if let Some(func) = lowering.function(child) {
                        file.functions.push(func);
                    }
                }
                _ => {}
            }
        }

        Ok(file)
    }

    /// Parse raw bytes, rejecting invalid UTF-8.
    pub fn parse_bytes(&mut self, bytes: &[u8]) -> ParseResult<SourceFile> {
        let code = std::str::from_utf8(bytes).map_err(|_| ParseError::InvalidUtf8)?;
        self.parse(code)
    }
}

/// Borrowed view over the source text used while lowering one tree.
struct Lowering<'a> {
    code: &'a str,
    max_depth: usize,
    depth: Cell<usize>,
    /// Set once the current function hit `max_depth`.
    exceeded: Cell<bool>,
}

fn span(node: Node) -> Span {
    Span::new(node.start_byte(), node.end_byte())
}

impl<'a> Lowering<'a> {
    fn text(&self, node: Node) -> &'a str {
        &self.code[node.byte_range()]
    }

    fn function(&self, node: Node) -> Option<FuncDecl> {
        let name_node = node.child_by_field_name("name")?;
        self.exceeded.set(false);
        let receiver = node
            .child_by_field_name("receiver")
            .and_then(|list| self.parameters(list).into_iter().next());
        let params = node
            .child_by_field_name("parameters")
            .map(|list| self.parameters(list))
            .unwrap_or_default();
        let body = node.child_by_field_name("body").map(|b| self.block(b));
        let name = self.text(name_node).to_string();

        if self.exceeded.get() {
            tracing::debug!("{name}: nesting deeper than {} levels", self.max_depth);
        }

        Some(FuncDecl {
            name,
            receiver,
            params,
            body,
            span: span(node),
            nesting_exceeded: self.exceeded.get(),
        })
    }

    /// Enter one nesting level. Returns false, and marks the function, when
    /// the limit is reached.
    fn descend(&self) -> bool {
        let depth = self.depth.get();
        if depth >= self.max_depth {
            self.exceeded.set(true);
            return false;
        }
        self.depth.set(depth + 1);
        true
    }

    fn ascend(&self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }

    /// Flatten a `parameter_list` into one `Param` per declared name.
    fn parameters(&self, list: Node) -> Vec<Param> {
        let mut params = Vec::new();
        let mut cursor = list.walk();

        for decl in list.named_children(&mut cursor) {
            if !matches!(
                decl.kind(),
                "parameter_declaration" | "variadic_parameter_declaration"
            ) {
                continue;
            }

            let type_text = decl
                .child_by_field_name("type")
                .map(|t| self.text(t))
                .unwrap_or_default();
            let type_text = if decl.kind() == "variadic_parameter_declaration" {
                format!("...{type_text}")
            } else {
                type_text.to_string()
            };

            let mut name_cursor = decl.walk();
            let names: Vec<&str> = decl
                .children_by_field_name("name", &mut name_cursor)
                .map(|n| self.text(n))
                .collect();

            if names.is_empty() {
                params.push(Param::new(None, &type_text));
            } else {
                for name in names {
                    params.push(Param::new(Some(name), &type_text));
                }
            }
        }

        params
    }

    fn block(&self, node: Node) -> Block {
        Block {
            stmts: self.statements_of(node),
            span: span(node),
        }
    }

    /// Statements directly inside a block or case clause. Handles both the
    /// visible `statement_list` wrapper and grammars that inline statements.
    fn statements_of(&self, node: Node) -> Vec<Stmt> {
        let mut stmts = Vec::new();
        let mut cursor = node.walk();

        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "statement_list" => {
                    let mut inner = child.walk();
                    for stmt in child.named_children(&mut inner) {
                        if stmt.kind() != "comment" {
                            self.push_statement(stmt, &mut stmts);
                        }
                    }
                }
                "comment" => {}
                _ => self.push_statement(child, &mut stmts),
            }
        }

        stmts
    }

    /// Lower one statement node. A grouped `var ( ... )` becomes one
    /// `VarDecl` per spec.
    fn push_statement(&self, node: Node, stmts: &mut Vec<Stmt>) {
        if node.kind() == "var_declaration" {
            stmts.extend(self.var_specs(node));
        } else {
            stmts.push(self.statement(node));
        }
    }

    fn statement(&self, node: Node) -> Stmt {
        if !self.descend() {
            return Stmt::Unsupported {
                kind: node.kind().to_string(),
                span: span(node),
            };
        }
        let stmt = self.lower_statement(node);
        self.ascend();
        stmt
    }

    fn lower_statement(&self, node: Node) -> Stmt {
        let sp = span(node);

        match node.kind() {
            "block" => Stmt::Block(self.block(node)),

            "short_var_declaration" => Stmt::ShortVarDecl {
                left: self.expression_list(node.child_by_field_name("left")),
                right: self.expression_list(node.child_by_field_name("right")),
                span: sp,
            },

            "assignment_statement" => Stmt::Assign {
                left: self.expression_list(node.child_by_field_name("left")),
                right: self.expression_list(node.child_by_field_name("right")),
                span: sp,
            },

            "var_declaration" => self.var_declaration(node),

            "expression_statement" => match node.named_child(0) {
                Some(expr) => Stmt::Expr {
                    expr: self.expression(expr),
                    span: sp,
                },
                None => Stmt::Empty { span: sp },
            },

            "return_statement" => Stmt::Return {
                values: self.expression_list(node.named_child(0)),
                span: sp,
            },

            "defer_statement" | "go_statement" => {
                let call = match node.named_child(0) {
                    Some(expr) => self.expression(expr),
                    None => return Stmt::Unsupported {
                        kind: node.kind().to_string(),
                        span: sp,
                    },
                };
                if node.kind() == "defer_statement" {
                    Stmt::Defer { call, span: sp }
                } else {
                    Stmt::Go { call, span: sp }
                }
            }

            "if_statement" => match self.if_statement(node) {
                Some(stmt) => Stmt::If(stmt),
                None => Stmt::Unsupported {
                    kind: node.kind().to_string(),
                    span: sp,
                },
            },

            "for_statement" => self.for_statement(node),

            "expression_switch_statement" => Stmt::Switch {
                init: self.boxed_statement(node.child_by_field_name("initializer")),
                tag: node
                    .child_by_field_name("value")
                    .map(|v| self.expression(v)),
                cases: self.case_clauses(node),
                span: sp,
            },

            "type_switch_statement" => Stmt::Switch {
                init: self.boxed_statement(node.child_by_field_name("initializer")),
                tag: node
                    .child_by_field_name("value")
                    .map(|v| self.expression(v)),
                cases: self.case_clauses(node),
                span: sp,
            },

            "select_statement" => Stmt::Select {
                cases: self.case_clauses(node),
                span: sp,
            },

            "labeled_statement" => {
                let label = node
                    .child_by_field_name("label")
                    .map(|l| self.text(l).to_string())
                    .unwrap_or_default();
                let mut cursor = node.walk();
                let inner = node
                    .named_children(&mut cursor)
                    .find(|c| c.kind() != "label_name" && c.kind() != "comment");
                match inner {
                    Some(inner) => Stmt::Labeled {
                        label,
                        stmt: Box::new(self.statement(inner)),
                        span: sp,
                    },
                    None => Stmt::Empty { span: sp },
                }
            }

            "inc_statement" | "dec_statement" => match node.named_child(0) {
                Some(operand) => Stmt::IncDec {
                    operand: self.expression(operand),
                    span: sp,
                },
                None => Stmt::Empty { span: sp },
            },

            "send_statement" => {
                match (
                    node.child_by_field_name("channel"),
                    node.child_by_field_name("value"),
                ) {
                    (Some(channel), Some(value)) => Stmt::Send {
                        channel: self.expression(channel),
                        value: self.expression(value),
                        span: sp,
                    },
                    _ => Stmt::Unsupported {
                        kind: node.kind().to_string(),
                        span: sp,
                    },
                }
            }

            // `v := <-ch` inside select cases
            "receive_statement" => {
                let right = node
                    .child_by_field_name("right")
                    .map(|r| vec![self.expression(r)])
                    .unwrap_or_default();
                let left = self.expression_list(node.child_by_field_name("left"));
                if left.is_empty() {
                    match right.into_iter().next() {
                        Some(expr) => Stmt::Expr { expr, span: sp },
                        None => Stmt::Empty { span: sp },
                    }
                } else if self.has_token(node, ":=") {
                    Stmt::ShortVarDecl {
                        left,
                        right,
                        span: sp,
                    }
                } else {
                    Stmt::Assign {
                        left,
                        right,
                        span: sp,
                    }
                }
            }

            "break_statement" | "continue_statement" | "goto_statement"
            | "fallthrough_statement" => Stmt::Branch { span: sp },

            "const_declaration" | "type_declaration" | "empty_statement" => {
                Stmt::Empty { span: sp }
            }

            other => Stmt::Unsupported {
                kind: other.to_string(),
                span: sp,
            },
        }
    }

    fn boxed_statement(&self, node: Option<Node>) -> Option<Box<Stmt>> {
        node.map(|n| Box::new(self.statement(n)))
    }

    fn var_specs(&self, node: Node) -> Vec<Stmt> {
        let mut specs = Vec::new();
        collect_var_specs(node, &mut specs);

        specs
            .into_iter()
            .map(|spec| {
                let mut cursor = spec.walk();
                let names = spec
                    .children_by_field_name("name", &mut cursor)
                    .map(|n| self.text(n).to_string())
                    .collect();
                Stmt::VarDecl {
                    names,
                    values: self.expression_list(spec.child_by_field_name("value")),
                    span: span(spec),
                }
            })
            .collect()
    }

    /// A `var` declaration outside a statement list, e.g. under a label.
    /// Several specs are kept together in an unscoped sequence.
    fn var_declaration(&self, node: Node) -> Stmt {
        let mut specs = self.var_specs(node);
        if specs.len() == 1 {
            if let Some(single) = specs.pop() {
                return single;
            }
        }
        Stmt::Seq {
            stmts: specs,
            span: span(node),
        }
    }

    fn if_statement(&self, node: Node) -> Option<IfStmt> {
        let cond = node.child_by_field_name("condition")?;
        let then = node.child_by_field_name("consequence")?;

        let otherwise = node.child_by_field_name("alternative").and_then(|alt| {
            match alt.kind() {
                "block" => Some(Box::new(Else::Block(self.block(alt)))),
                "if_statement" => {
                    if !self.descend() {
                        return None;
                    }
                    let nested = self.if_statement(alt);
                    self.ascend();
                    nested.map(|stmt| Box::new(Else::If(stmt)))
                }
                _ => None,
            }
        });

        Some(IfStmt {
            init: self.boxed_statement(node.child_by_field_name("initializer")),
            cond: self.expression(cond),
            then: self.block(then),
            otherwise,
            span: span(node),
        })
    }

    fn for_statement(&self, node: Node) -> Stmt {
        let sp = span(node);
        let body = match node.child_by_field_name("body") {
            Some(body) => self.block(body),
            None => {
                return Stmt::Unsupported {
                    kind: node.kind().to_string(),
                    span: sp,
                };
            }
        };

        let mut cursor = node.walk();
        let header = node
            .named_children(&mut cursor)
            .find(|c| c.kind() != "block" && c.kind() != "comment");

        match header {
            Some(clause) if clause.kind() == "for_clause" => Stmt::For {
                init: self.boxed_statement(clause.child_by_field_name("initializer")),
                cond: clause
                    .child_by_field_name("condition")
                    .map(|c| self.expression(c)),
                post: self.boxed_statement(clause.child_by_field_name("update")),
                body,
                span: sp,
            },
            Some(clause) if clause.kind() == "range_clause" => {
                let right = match clause.child_by_field_name("right") {
                    Some(right) => self.expression(right),
                    None => Expr::Literal {
                        span: span(clause),
                    },
                };
                Stmt::Range {
                    left: self.expression_list(clause.child_by_field_name("left")),
                    declares: self.has_token(clause, ":="),
                    right,
                    body,
                    span: sp,
                }
            }
            Some(cond) => Stmt::For {
                init: None,
                cond: Some(self.expression(cond)),
                post: None,
                body,
                span: sp,
            },
            None => Stmt::For {
                init: None,
                cond: None,
                post: None,
                body,
                span: sp,
            },
        }
    }

    /// `expression_case`, `type_case`, `communication_case` and `default_case`.
    fn case_clauses(&self, node: Node) -> Vec<CaseClause> {
        let mut cases = Vec::new();
        let mut cursor = node.walk();

        for child in node.named_children(&mut cursor) {
            let is_default = match child.kind() {
                "default_case" => true,
                "expression_case" | "type_case" | "communication_case" => false,
                _ => continue,
            };

            let values = if child.kind() == "expression_case" {
                self.expression_list(child.child_by_field_name("value"))
            } else {
                Vec::new()
            };
            let comm = self.boxed_statement(child.child_by_field_name("communication"));

            // Everything after the `:` token is the clause body
            let mut body = Vec::new();
            let mut after_colon = false;
            let mut clause_cursor = child.walk();
            for part in child.children(&mut clause_cursor) {
                if !after_colon {
                    after_colon = part.kind() == ":";
                    continue;
                }
                if !part.is_named() || part.kind() == "comment" {
                    continue;
                }
                if part.kind() == "statement_list" {
                    let mut inner = part.walk();
                    for stmt in part.named_children(&mut inner) {
                        if stmt.kind() != "comment" {
                            body.push(self.statement(stmt));
                        }
                    }
                } else {
                    body.push(self.statement(part));
                }
            }

            cases.push(CaseClause {
                is_default,
                values,
                comm,
                body,
                span: span(child),
            });
        }

        cases
    }

    fn expression_list(&self, node: Option<Node>) -> Vec<Expr> {
        let Some(node) = node else {
            return Vec::new();
        };
        if node.kind() != "expression_list" {
            return vec![self.expression(node)];
        }

        let mut cursor = node.walk();
        node.named_children(&mut cursor)
            .filter(|c| c.kind() != "comment")
            .map(|c| self.expression(c))
            .collect()
    }

    fn expression(&self, node: Node) -> Expr {
        if !self.descend() {
            return Expr::Other {
                kind: node.kind().to_string(),
                children: Vec::new(),
                span: span(node),
            };
        }
        let expr = self.lower_expression(node);
        self.ascend();
        expr
    }

    fn lower_expression(&self, node: Node) -> Expr {
        let sp = span(node);

        match node.kind() {
            "identifier" => Expr::Ident {
                name: self.text(node).to_string(),
                span: sp,
            },

            "call_expression" => {
                let func = match node.child_by_field_name("function") {
                    Some(func) => self.expression(func),
                    None => return self.other(node),
                };
                let args = node
                    .child_by_field_name("arguments")
                    .map(|list| {
                        let mut cursor = list.walk();
                        list.named_children(&mut cursor)
                            .filter(|c| c.kind() != "comment")
                            .map(|c| self.expression(c))
                            .collect()
                    })
                    .unwrap_or_default();
                Expr::Call {
                    func: Box::new(func),
                    args,
                    span: sp,
                }
            }

            "selector_expression" => {
                match (
                    node.child_by_field_name("operand"),
                    node.child_by_field_name("field"),
                ) {
                    (Some(operand), Some(field)) => Expr::Selector {
                        operand: Box::new(self.expression(operand)),
                        field: self.text(field).to_string(),
                        span: sp,
                    },
                    _ => self.other(node),
                }
            }

            "func_literal" => {
                let params = node
                    .child_by_field_name("parameters")
                    .map(|list| self.parameters(list))
                    .unwrap_or_default();
                match node.child_by_field_name("body") {
                    Some(body) => Expr::FuncLit {
                        params,
                        body: self.block(body),
                        span: sp,
                    },
                    None => self.other(node),
                }
            }

            "composite_literal" => {
                let elements = node
                    .child_by_field_name("body")
                    .map(|body| self.literal_elements(body))
                    .unwrap_or_default();
                Expr::Composite {
                    elements,
                    span: sp,
                }
            }

            "literal_value" => Expr::Composite {
                elements: self.literal_elements(node),
                span: sp,
            },

            "unary_expression" => match node.child_by_field_name("operand") {
                Some(operand) => Expr::Unary {
                    op: node
                        .child_by_field_name("operator")
                        .map(|op| self.text(op).to_string())
                        .unwrap_or_default(),
                    operand: Box::new(self.expression(operand)),
                    span: sp,
                },
                None => self.other(node),
            },

            "binary_expression" => self.binary_chain(node),

            "parenthesized_expression" | "literal_element" => match node.named_child(0) {
                Some(inner) => self.expression(inner),
                None => self.other(node),
            },

            "interpreted_string_literal" | "raw_string_literal" | "int_literal"
            | "float_literal" | "imaginary_literal" | "rune_literal" | "true" | "false"
            | "nil" | "iota" => Expr::Literal { span: sp },

            _ => self.other(node),
        }
    }

    fn literal_elements(&self, body: Node) -> Vec<Expr> {
        let mut cursor = body.walk();
        body.named_children(&mut cursor)
            .filter(|c| c.kind() != "comment")
            .map(|element| {
                if element.kind() == "keyed_element" {
                    self.keyed_element(element)
                } else {
                    self.expression(element)
                }
            })
            .collect()
    }

    fn keyed_element(&self, node: Node) -> Expr {
        let key = node.child_by_field_name("key").or_else(|| node.named_child(0));
        let value = node.child_by_field_name("value").or_else(|| {
            let count = node.named_child_count();
            if count >= 2 {
                node.named_child(count - 1)
            } else {
                None
            }
        });

        match (key, value) {
            (Some(key), Some(value)) => Expr::KeyValue {
                key: Box::new(self.expression(key)),
                value: Box::new(self.expression(value)),
                span: span(node),
            },
            _ => self.other(node),
        }
    }

    /// `a + b + c` nests to the left; the operands are collected without
    /// recursing so long chains stay flat.
    fn binary_chain(&self, node: Node) -> Expr {
        let mut rights = Vec::new();
        let mut current = node;
        while current.kind() == "binary_expression" {
            match (
                current.child_by_field_name("left"),
                current.child_by_field_name("right"),
            ) {
                (Some(left), Some(right)) => {
                    rights.push(right);
                    current = left;
                }
                _ => break,
            }
        }

        let mut children = Vec::with_capacity(rights.len() + 1);
        if current.kind() == "binary_expression" {
            children.push(self.other(current));
        } else {
            children.push(self.expression(current));
        }
        children.extend(rights.into_iter().rev().map(|right| self.expression(right)));

        Expr::Other {
            kind: node.kind().to_string(),
            children,
            span: span(node),
        }
    }

    /// Generic lowering that keeps named children so identifiers remain visible.
    fn other(&self, node: Node) -> Expr {
        let mut cursor = node.walk();
        let children = node
            .named_children(&mut cursor)
            .filter(|c| c.kind() != "comment")
            .map(|c| self.expression(c))
            .collect();
        Expr::Other {
            kind: node.kind().to_string(),
            children,
            span: span(node),
        }
    }

    fn has_token(&self, node: Node, token: &str) -> bool {
        let mut cursor = node.walk();
        node.children(&mut cursor).any(|c| c.kind() == token)
    }
}

/// Collect `var_spec` nodes from a `var_declaration`, looking through the
/// parenthesized `var_spec_list` form.
fn collect_var_specs<'t>(node: Node<'t>, specs: &mut Vec<Node<'t>>) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "var_spec" => specs.push(child),
            "var_spec_list" => collect_var_specs(child, specs),
            _ => {}
        }
    }
}
