//! Consistent color theme and styling for terminal output.

use crate::analysis::Severity;
use console::Style;
use owo_colors::OwoColorize;
use std::sync::LazyLock;

/// Global theme instance for consistent styling across the application.
pub static THEME: LazyLock<Theme> = LazyLock::new(Theme::default);

/// Color theme for terminal output.
#[derive(Debug, Clone)]
pub struct Theme {
    pub success: Style,
    pub error: Style,
    pub warning: Style,
    /// Headers and titles
    pub header: Style,
    /// Dimmed/secondary text
    pub dim: Style,
    /// File paths
    pub path: Style,
    /// Line and column numbers
    pub number: Style,
    /// Variable and function names
    pub code: Style,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            success: Style::new().green().bright(),
            error: Style::new().red().bright(),
            warning: Style::new().yellow().bright(),
            header: Style::new().cyan().bold(),
            dim: Style::new().dim(),
            path: Style::new().magenta(),
            number: Style::new().cyan(),
            code: Style::new().yellow(),
        }
    }
}

impl Theme {
    /// Style for a severity label.
    pub fn severity(&self, severity: Severity) -> Style {
        match severity {
            Severity::Critical => Style::new().red().bold(),
            Severity::High => self.error.clone(),
            Severity::Medium => self.warning.clone(),
            Severity::Low => self.dim.clone(),
        }
    }

    pub fn success_with_icon(&self, text: &str) -> String {
        if Self::should_disable_colors() {
            format!("✓ {text}")
        } else {
            format!("{} {}", "✓".green(), self.success.apply_to(text))
        }
    }

    pub fn error_with_icon(&self, text: &str) -> String {
        if Self::should_disable_colors() {
            format!("✗ {text}")
        } else {
            format!("{} {}", "✗".red(), self.error.apply_to(text))
        }
    }

    pub fn warning_with_icon(&self, text: &str) -> String {
        if Self::should_disable_colors() {
            format!("⚠ {text}")
        } else {
            format!("{} {}", "⚠".yellow(), self.warning.apply_to(text))
        }
    }

    /// Check if color output should be disabled.
    pub fn should_disable_colors() -> bool {
        use is_terminal::IsTerminal;
        std::env::var("NO_COLOR").is_ok() || !std::io::stdout().is_terminal()
    }

    /// Apply theme styling conditionally based on terminal support.
    pub fn apply<T: std::fmt::Display>(&self, style: &Style, text: T) -> String {
        if Self::should_disable_colors() {
            text.to_string()
        } else {
            style.apply_to(text).to_string()
        }
    }
}
