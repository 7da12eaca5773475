//! Landing CLI - site server and static generator.
//!
//! Provides commands for:
//! - `serve`: Serve the site over HTTP, reloading on content changes
//! - `generate`: Write the whole site to `_site/`

mod commands;
mod error;
mod output;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{GenerateArgs, ServeArgs};
use output::Output;

/// Landing - site server and static generator.
#[derive(Parser)]
#[command(name = "landing", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the site over HTTP.
    Serve(ServeArgs),
    /// Generate the static site.
    Generate(GenerateArgs),
}

impl Commands {
    /// Log filter chosen by `--debug`/`--verbose`, if any.
    fn log_level(&self) -> Option<&'static str> {
        let (verbose, debug) = match self {
            Self::Serve(args) => (args.verbose, args.debug),
            Self::Generate(args) => (args.verbose, args.debug),
        };
        if debug {
            Some("debug")
        } else if verbose {
            Some("info")
        } else {
            None
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let output = Output::new();

    // --debug/--verbose win over RUST_LOG, which defaults to WARN
    let filter = cli.command.log_level().map_or_else(
        || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        EnvFilter::new,
    );
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Serve(args) => tokio::runtime::Runtime::new()
            .map_err(error::CliError::from)
            .and_then(|rt| rt.block_on(args.execute())),
        Commands::Generate(args) => args.execute(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            output.error(&format!("Error: {err}"));
            ExitCode::FAILURE
        }
    }
}
