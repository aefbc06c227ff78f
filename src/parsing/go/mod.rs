//! Go parser
//!
//! Wraps tree-sitter-go and lowers function declarations into
//! [`crate::syntax::SourceFile`]. Everything outside function bodies other
//! than the package clause is ignored.

mod parser;

pub use parser::GoParser;
