//! Source parsing
//!
//! Go sources are parsed with tree-sitter and lowered into the statement
//! model of `crate::syntax`.

pub mod go;

pub use go::GoParser;
