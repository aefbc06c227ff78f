//! File system walker for discovering Go files to check
//!
//! This module provides directory traversal with support for:
//! - .gitignore rules
//! - .txguardignore files
//! - Ignore globs from configuration
//! - Skipping `_test.go` files when configured

use crate::Settings;
use ignore::WalkBuilder;
use ignore::overrides::{Override, OverrideBuilder};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const GO_EXTENSION: &str = "go";
const TEST_SUFFIX: &str = "_test.go";

/// Walks directories to find Go files to check
#[derive(Debug)]
pub struct FileWalker {
    settings: Arc<Settings>,
}

impl FileWalker {
    /// Create a new file walker with the given settings
    pub fn new(settings: Arc<Settings>) -> Self {
        Self { settings }
    }

    /// Walk `root` (a directory or a single file) and yield Go files
    pub fn walk(&self, root: &Path) -> impl Iterator<Item = PathBuf> + use<> {
        let mut builder = WalkBuilder::new(root);

        builder
            .hidden(false) // Hidden names are filtered below
            .git_ignore(true) // Respect .gitignore files
            .git_global(true) // Respect global gitignore
            .git_exclude(true) // Respect .git/info/exclude
            .follow_links(false)
            .max_depth(None)
            .require_git(false); // Allow gitignore to work in non-git directories

        builder.add_custom_ignore_filename(".txguardignore");

        if let Some(overrides) = self.build_overrides(root) {
            builder.overrides(overrides);
        }

        let skip_tests = self.settings.analysis.skip_test_files;

        builder
            .build()
            .filter_map(Result::ok) // Skip files we can't access
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .filter_map(move |entry| {
                let path = entry.path();

                if path.extension().and_then(|e| e.to_str()) != Some(GO_EXTENSION) {
                    return None;
                }

                let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
                if name.starts_with('.') {
                    return None;
                }
                if skip_tests && name.ends_with(TEST_SUFFIX) {
                    return None;
                }

                Some(path.to_path_buf())
            })
    }

    /// Configured ignore patterns as negated override globs.
    fn build_overrides(&self, root: &Path) -> Option<Override> {
        let patterns = &self.settings.indexing.ignore_patterns;
        if patterns.is_empty() {
            return None;
        }

        let base = if root.is_dir() {
            root
        } else {
            root.parent().unwrap_or(root)
        };

        let mut builder = OverrideBuilder::new(base);
        for pattern in patterns {
            if let Err(e) = builder.add(&format!("!{pattern}")) {
                tracing::warn!("ignoring invalid ignore pattern '{pattern}': {e}");
            }
        }

        match builder.build() {
            Ok(overrides) => Some(overrides),
            Err(e) => {
                tracing::warn!("failed to build ignore patterns: {e}");
                None
            }
        }
    }

    /// Count files that would be checked (useful for dry runs)
    pub fn count_files(&self, root: &Path) -> usize {
        self.walk(root).count()
    }
}
