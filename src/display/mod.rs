//! Terminal display utilities for human-readable output.

pub mod tables;
pub mod theme;

pub use tables::create_summary_table;
pub use theme::{THEME, Theme};
