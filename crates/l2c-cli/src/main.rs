//! L2C CLI - validate, inspect and replay log targets.

use anyhow::Result;
use clap::{Parser, Subcommand};
use l2c_core::config::LogFormat;
use l2c_core::Config;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Exit codes for CLI operations.
///
/// Following Unix conventions:
/// - 0: Success
/// - 1-127: Application errors
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Successful execution
    Success = 0,
    /// Configuration error (invalid config file, missing required fields)
    ConfigError = 1,
    /// Cluster error (contact points rejected, no keyspace reachable)
    ClusterError = 2,
    /// One or more destination writes failed
    WriteError = 3,
    /// General runtime error
    RuntimeError = 10,
}

impl ExitCode {
    /// Map an error to an exit code.
    ///
    /// Library errors anywhere in the chain decide the code; anything else
    /// falls back to inspecting the message.
    fn from_error(error: &anyhow::Error) -> Self {
        if let Some(core) = error
            .chain()
            .find_map(|cause| cause.downcast_ref::<l2c_core::Error>())
        {
            return match core {
                l2c_core::Error::Config(_) => ExitCode::ConfigError,
                l2c_core::Error::ClusterBuild { .. }
                | l2c_core::Error::NoReachableDestinations { .. } => ExitCode::ClusterError,
                l2c_core::Error::Destination(_) | l2c_core::Error::Aggregated(_) => {
                    ExitCode::WriteError
                }
                _ => ExitCode::RuntimeError,
            };
        }

        let error_str = error.to_string().to_lowercase();
        if error_str.contains("config") || error_str.contains("toml") {
            ExitCode::ConfigError
        } else {
            ExitCode::RuntimeError
        }
    }
}

mod commands;

#[derive(Parser)]
#[command(name = "l2c")]
#[command(about = "Structured log delivery to Cassandra keyspaces", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration file
    Validate,

    /// Print the insert statement generated for every table
    Statements,

    /// Replay JSON-lines log records through the in-memory driver
    Replay {
        /// Input file (stdin when omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Treat a keyspace as unreachable (repeatable)
        #[arg(long = "unreachable", value_name = "KEYSPACE")]
        unreachable: Vec<String>,
    },
}

fn main() {
    let exit_code = run_cli();
    std::process::exit(exit_code as i32);
}

/// Main CLI execution logic with proper error handling.
fn run_cli() -> ExitCode {
    let cli = Cli::parse();

    // Monitoring settings come from the config when it parses; defaults otherwise
    let monitoring = cli
        .config
        .as_ref()
        .and_then(|path| std::fs::read_to_string(path).ok())
        .and_then(|content| toml::from_str::<Config>(&content).ok())
        .map(|config| config.monitoring)
        .unwrap_or_default();

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match cli.verbose {
            0 => EnvFilter::new(monitoring.log_level.as_filter()),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    match monitoring.log_format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .with(filter)
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(std::io::stderr))
                .with(filter)
                .init();
        }
    }

    match execute_command(cli) {
        Ok(()) => ExitCode::Success,
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "Command failed");
            ExitCode::from_error(&e)
        }
    }
}

/// Execute the CLI command.
fn execute_command(cli: Cli) -> Result<()> {
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Validate => commands::validate::run(&config)?,
        Commands::Statements => commands::statements::run(&config)?,
        Commands::Replay { input, unreachable } => {
            commands::replay::run(&config, input.as_deref(), &unreachable)?
        }
    }

    Ok(())
}

fn load_config(path: &Option<PathBuf>) -> Result<Config> {
    let path = path.clone().unwrap_or_else(|| PathBuf::from("l2c.toml"));
    let config = Config::from_file(&path)?;
    Ok(config)
}
