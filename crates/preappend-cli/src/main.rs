#![deny(unsafe_code)]

mod commands;
mod exit_code;

use std::io;
use std::process::ExitCode;

use anyhow::Result;
use clap::{ColorChoice, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use preappend_core::BufferedFileError;

use crate::commands::{cat, write};

/// Buffered file writes with in-place pre-append insertion
#[derive(Parser)]
#[command(name = "preappend")]
#[command(author, version)]
#[command(propagate_version = true)]
#[command(after_help = "EXAMPLES:
    # Insert three blocks in front of a log, in order
    preappend write log.txt --preappend --data C --data B --data A

    # Replace a file's content from stdin
    printf 'fresh' | preappend write notes.txt --create --truncate

    # Stream a file to stdout with a small buffer
    preappend cat notes.txt --buffer-size 64
")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// When to use colored output
    #[arg(long, value_enum, default_value = "auto", global = true)]
    color: ColorChoice,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write data (or stdin) to a file through a buffered handle
    Write(write::Args),

    /// Read a file through a buffered handle and print it
    Cat(cat::Args),
}

fn main() -> ExitCode {
    // Usage errors, --help and --version exit here with clap's own codes.
    let cli = Cli::try_parse().unwrap_or_else(|e| e.exit());
    let quiet = cli.quiet;

    match run(cli) {
        Ok(()) => ExitCode::from(exit_code::SUCCESS),
        Err(e) => {
            let code = categorize_error(&e);
            if !quiet {
                eprintln!("Error: {e:#}");
            }
            ExitCode::from(code)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    if !cli.quiet {
        setup_tracing(cli.verbose, cli.color);
    }

    match cli.command {
        Commands::Write(args) => write::execute(&args),
        Commands::Cat(args) => cat::execute(&args),
    }
}

/// Set up tracing/logging based on verbosity level
fn setup_tracing(verbose: u8, color: ColorChoice) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let ansi = match color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        _ => io::IsTerminal::is_terminal(&io::stderr()),
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .with_ansi(ansi)
        .init();
}

/// Categorize an error into an exit code using typed error downcasting
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(file_err) = cause.downcast_ref::<BufferedFileError>() {
            if matches!(file_err, BufferedFileError::Allocation { .. }) {
                return exit_code::ALLOCATION_FAILED;
            }
            if let Some(code) = file_err.io_kind().and_then(code_for_kind) {
                return code;
            }
        }

        if let Some(io_err) = cause.downcast_ref::<io::Error>()
            && let Some(code) = code_for_kind(io_err.kind())
        {
            return code;
        }
    }

    exit_code::GENERAL_ERROR
}

fn code_for_kind(kind: io::ErrorKind) -> Option<u8> {
    match kind {
        io::ErrorKind::NotFound => Some(exit_code::NOT_FOUND),
        io::ErrorKind::PermissionDenied => Some(exit_code::PERMISSION_DENIED),
        io::ErrorKind::OutOfMemory => Some(exit_code::ALLOCATION_FAILED),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use preappend_core::error::FileContext;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_categorize_open_errors() {
        let err = BufferedFileError::open_with_context(
            io::Error::from(io::ErrorKind::NotFound),
            FileContext::new().with_operation("open"),
        );
        let err = anyhow::Error::from(err).context("Failed to open missing.txt");
        assert_eq!(categorize_error(&err), exit_code::NOT_FOUND);

        let err = BufferedFileError::open_with_context(
            io::Error::from(io::ErrorKind::PermissionDenied),
            FileContext::new(),
        );
        assert_eq!(
            categorize_error(&anyhow::Error::from(err)),
            exit_code::PERMISSION_DENIED
        );
    }

    #[test]
    fn test_categorize_allocation_error() {
        let err = BufferedFileError::Allocation {
            requested: u64::MAX,
            context: FileContext::new(),
        };
        assert_eq!(
            categorize_error(&anyhow::Error::from(err)),
            exit_code::ALLOCATION_FAILED
        );
    }

    #[test]
    fn test_categorize_fallback() {
        let err: Result<()> = Err(io::Error::other("disk on fire")).context("Failed to write");
        assert_eq!(categorize_error(&err.unwrap_err()), exit_code::GENERAL_ERROR);
        assert_eq!(
            categorize_error(&anyhow::anyhow!("something else")),
            exit_code::GENERAL_ERROR
        );
    }
}
