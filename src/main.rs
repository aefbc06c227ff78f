//! CLI entry point for the transaction checker.
//!
//! Provides commands for checking Go sources, initializing a workspace
//! configuration and printing the effective settings.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use txguard::display::THEME;
use txguard::error::ErrorContext;
use txguard::io::{ExitCode, OutputFormat, OutputManager};
use txguard::{CheckError, Settings, Severity, TransactionChecker};

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Transaction lifecycle checker for Go
#[derive(Parser)]
#[command(
    name = "txguard",
    version = env!("CARGO_PKG_VERSION"),
    about = "Find leaked and mishandled database transactions in Go code",
    long_about = "Walks Go sources and reports transactions that are never committed or \
                  rolled back, lack a deferred rollback, or are finalized only on some paths.",
    styles = clap_cargo_style()
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Check Go files or directories
    #[command(about = "Report transaction lifecycle violations")]
    Check {
        /// Files or directories to check
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Output JSON instead of text
        #[arg(long)]
        json: bool,

        /// Number of threads to use (overrides config)
        #[arg(short, long)]
        threads: Option<usize>,

        /// Lowest severity that fails the run (overrides config)
        #[arg(long, value_name = "SEVERITY")]
        fail_on: Option<Severity>,
    },

    /// Initialize project
    #[command(about = "Set up .txguard directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Display active settings
    #[command(about = "Show the effective configuration as TOML")]
    Config,
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let settings = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            let format = match &cli.command {
                Commands::Check { json, .. } => OutputFormat::resolve(*json, "text"),
                _ => OutputFormat::Text,
            };
            let code = OutputManager::new(format)
                .error(&e)
                .unwrap_or(ExitCode::ConfigError);
            return code.into();
        }
    };

    init_tracing(cli.verbose || settings.debug);

    match run(cli, settings) {
        Ok(code) => code.into(),
        Err(e) => {
            eprintln!("{}", THEME.error_with_icon(&format!("Error: {e:#}")));
            ExitCode::GeneralError.into()
        }
    }
}

fn load_settings(cli: &Cli) -> Result<Settings, CheckError> {
    let loaded = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    loaded.map_err(|e| CheckError::ConfigError {
        reason: e.to_string(),
    })
}

fn init_tracing(debug: bool) {
    let level = if debug { Level::DEBUG } else { Level::WARN };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {e}");
    }
}

fn run(cli: Cli, mut settings: Settings) -> anyhow::Result<ExitCode> {
    match cli.command {
        Commands::Check {
            paths,
            json,
            threads,
            fail_on,
        } => {
            if let Some(threads) = threads {
                settings.indexing.parallel_threads = threads;
            }
            if let Some(fail_on) = fail_on {
                settings.output.fail_on = fail_on;
            }

            let format = OutputFormat::resolve(json, &settings.output.format);
            let mut output = OutputManager::new(format);
            let fail_on = settings.output.fail_on;
            let checker = TransactionChecker::new(&settings.analysis);

            let code = match checker.check_paths(&paths, Arc::new(settings)) {
                Ok(report) => output.report(&report, fail_on)?,
                Err(e) => output.error(&e)?,
            };
            Ok(code)
        }

        Commands::Init { force } => {
            let root = std::env::current_dir().context("resolving current directory")?;
            match Settings::init_config_file(&root, force) {
                Ok(path) => {
                    println!(
                        "{}",
                        THEME.success_with_icon(&format!(
                            "Created configuration file at: {}",
                            path.display()
                        ))
                    );
                    println!("Edit this file to customize your settings.");
                    Ok(ExitCode::Success)
                }
                Err(e) => {
                    let error = CheckError::ConfigError {
                        reason: e.to_string(),
                    };
                    Ok(OutputManager::new(OutputFormat::Text).error(&error)?)
                }
            }
        }

        Commands::Config => {
            let rendered = toml::to_string_pretty(&settings).context("rendering settings")?;
            let mut output = OutputManager::new(OutputFormat::Text);
            output.info("Current Configuration:")?;
            output.info(&"=".repeat(50))?;
            Ok(output.value(&settings, &rendered)?)
        }
    }
}
