//! Configuration module for the transaction checker.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `TXGUARD_` and use double underscores
//! to separate nested levels:
//! - `TXGUARD_INDEXING__PARALLEL_THREADS=8` sets `indexing.parallel_threads`
//! - `TXGUARD_OUTPUT__FAIL_ON=critical` sets `output.fail_on`
//! - `TXGUARD_ANALYSIS__SKIP_TEST_FILES=true` sets `analysis.skip_test_files`

use crate::analysis::Severity;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_DIR: &str = ".txguard";
const CONFIG_FILE: &str = "settings.toml";
const IGNORE_FILE: &str = ".txguardignore";
const ENV_PREFIX: &str = "TXGUARD_";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Workspace root directory (where .txguard is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    /// Global debug mode
    #[serde(default = "default_false")]
    pub debug: bool,

    /// Transaction lifecycle analysis settings
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Reporting settings
    #[serde(default)]
    pub output: OutputConfig,

    /// File discovery settings
    #[serde(default)]
    pub indexing: IndexingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AnalysisConfig {
    /// Extra method names that start a transaction, on top of the built-in
    /// `Begin`, `BeginTx`, `BeginTxx`, `Beginx`, `MustBegin` and `MustBeginTx`
    #[serde(default)]
    pub acquire_methods: Vec<String>,

    /// Method names that commit a transaction
    #[serde(default = "default_commit_methods")]
    pub commit_methods: Vec<String>,

    /// Method names that roll a transaction back
    #[serde(default = "default_rollback_methods")]
    pub rollback_methods: Vec<String>,

    /// Calls that terminate the process (`log.Fatal`, `os.Exit`, ...)
    #[serde(default = "default_fatal_functions")]
    pub fatal_functions: Vec<String>,

    /// Calls that panic
    #[serde(default = "default_panic_functions")]
    pub panic_functions: Vec<String>,

    /// Helpers that take ownership of a transaction and run a callback in it
    #[serde(default = "default_callback_helpers")]
    pub callback_helpers: Vec<String>,

    /// Hard limit on statements visited per function
    #[serde(default = "default_max_steps")]
    pub max_steps_per_function: usize,

    /// Nesting of statements and expressions beyond which a function is
    /// skipped
    #[serde(default = "default_max_nesting")]
    pub max_nesting_depth: usize,

    /// Skip `_test.go` files entirely
    #[serde(default = "default_false")]
    pub skip_test_files: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OutputConfig {
    /// Default output format: "text" or "json"
    #[serde(default = "default_output_format")]
    pub format: String,

    /// Lowest severity that makes `txguard check` exit with a blocking code
    #[serde(default = "default_fail_on")]
    pub fail_on: Severity,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexingConfig {
    /// Number of parallel threads for checking
    #[serde(default = "default_parallel_threads")]
    pub parallel_threads: usize,

    /// Glob-style patterns (gitignore syntax) excluded from checking
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_false() -> bool {
    false
}
fn default_parallel_threads() -> usize {
    num_cpus::get()
}
fn default_max_steps() -> usize {
    100_000
}
fn default_max_nesting() -> usize {
    crate::syntax::DEFAULT_MAX_NESTING
}
fn default_output_format() -> String {
    "text".to_string()
}
fn default_fail_on() -> Severity {
    Severity::High
}
fn default_commit_methods() -> Vec<String> {
    vec!["Commit".to_string()]
}
fn default_rollback_methods() -> Vec<String> {
    vec![
        "Rollback".to_string(),
        "RollbackUnlessCommitted".to_string(),
    ]
}
fn default_fatal_functions() -> Vec<String> {
    ["log.Fatal", "log.Fatalf", "log.Fatalln", "os.Exit", "runtime.Goexit"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_panic_functions() -> Vec<String> {
    ["panic", "log.Panic", "log.Panicf", "log.Panicln"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_callback_helpers() -> Vec<String> {
    [
        "WithTx",
        "WithTransaction",
        "RunInTx",
        "RunInTransaction",
        "InTx",
        "Transact",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            workspace_root: None,
            debug: false,
            analysis: AnalysisConfig::default(),
            output: OutputConfig::default(),
            indexing: IndexingConfig::default(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            acquire_methods: Vec::new(),
            commit_methods: default_commit_methods(),
            rollback_methods: default_rollback_methods(),
            fatal_functions: default_fatal_functions(),
            panic_functions: default_panic_functions(),
            callback_helpers: default_callback_helpers(),
            max_steps_per_function: default_max_steps(),
            max_nesting_depth: default_max_nesting(),
            skip_test_files: false,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_output_format(),
            fail_on: default_fail_on(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            parallel_threads: default_parallel_threads(),
            ignore_patterns: vec!["vendor/**".to_string(), "*.pb.go".to_string()],
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        // Try to find the workspace root by looking for .txguard directory
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));

        Self::figment(config_path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                // If workspace_root is not set in config, detect it
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref().to_path_buf())
            .extract()
            .map_err(Box::new)
    }

    fn figment(config_path: PathBuf) -> Figment {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(config_path))
            // Double underscore separates nested levels, single underscores
            // stay inside field names
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Find the workspace config by looking for a .txguard directory
    /// Searches from current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Get the workspace root directory (where .txguard is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(ancestor.to_path_buf());
            }
        }

        None
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file with helpful comments under `root`
    pub fn init_config_file(
        root: &Path,
        force: bool,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = root.join(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let template = format!(
            r#"# txguard Configuration File

# Version of the configuration schema
version = 1

# Verbose logging
debug = false

[analysis]
# Extra methods that start a transaction (Begin, BeginTx, BeginTxx, Beginx,
# MustBegin and MustBeginTx are always recognized)
acquire_methods = []

# Methods that finalize a transaction
commit_methods = ["Commit"]
rollback_methods = ["Rollback", "RollbackUnlessCommitted"]

# Calls treated as process exit and as panic
fatal_functions = ["log.Fatal", "log.Fatalf", "log.Fatalln", "os.Exit", "runtime.Goexit"]
panic_functions = ["panic", "log.Panic", "log.Panicf", "log.Panicln"]

# Helpers that own the transaction they are given
callback_helpers = ["WithTx", "WithTransaction", "RunInTx", "RunInTransaction", "InTx", "Transact"]

# Statements visited per function before the function is skipped
max_steps_per_function = {max_steps}

# Nested statements and expressions allowed before a function is skipped
max_nesting_depth = {max_nesting}

# Skip *_test.go files
skip_test_files = false

[output]
# "text" or "json"
format = "text"

# Lowest severity that fails the run: low, medium, high or critical
fail_on = "high"

[indexing]
# Number of threads used for checking (default: CPU count)
parallel_threads = {threads}

# Additional exclusions (gitignore syntax)
ignore_patterns = ["vendor/**", "*.pb.go"]
"#,
            max_steps = default_max_steps(),
            max_nesting = default_max_nesting(),
            threads = default_parallel_threads(),
        );

        std::fs::write(&config_path, template)?;

        Self::create_default_ignore_file(root, force)?;

        Ok(config_path)
    }

    /// Create a default .txguardignore file next to the workspace root
    fn create_default_ignore_file(
        root: &Path,
        force: bool,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let ignore_path = root.join(IGNORE_FILE);

        if !force && ignore_path.exists() {
            return Ok(());
        }

        let default_content = r#"# txguard ignore patterns (gitignore syntax)
#
# Files and directories listed here are never checked.

# Dependencies
vendor/

# Generated code
*.pb.go
*_gen.go
mock_*.go
"#;

        std::fs::write(&ignore_path, default_content)?;
        Ok(())
    }
}
