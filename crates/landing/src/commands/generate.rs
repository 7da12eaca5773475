//! `landing generate` command implementation.

use std::path::PathBuf;
use std::time::Instant;

use clap::Args;
use landing_config::{CliSettings, Config};
use landing_site::RequestInfo;

use super::open_site;
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the generate command.
#[derive(Args)]
pub(crate) struct GenerateArgs {
    /// Path to configuration file (default: auto-discover landing.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Site content directory (overrides config).
    #[arg(short, long)]
    content_dir: Option<PathBuf>,

    /// Public host used for absolute URLs (e.g. `example.com`).
    #[arg(long)]
    host: Option<String>,

    /// Enable verbose output (info logs).
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable debug logs.
    #[arg(short, long)]
    pub debug: bool,
}

impl GenerateArgs {
    /// Execute the generate command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails, the site cannot be written
    /// or any page fails to render.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            content_dir: self.content_dir,
            watch_enabled: Some(false),
            ..CliSettings::default()
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;
        config.validate()?;

        output.info(&format!(
            "Generating {} into {}",
            config.content_resolved.content_dir.display(),
            config.content_resolved.output_dir().display()
        ));

        let started = Instant::now();
        let serving = open_site(&config.content_resolved)?;
        let report = serving.generate_site(&public_request(self.host))?;

        for failure in &report.failures {
            output.warning(&format!("{}: {}", failure.permalink, failure.error));
        }
        if !report.failures.is_empty() {
            return Err(CliError::GenerateFailed(report.failures.len()));
        }

        output.success(&format!(
            "Generated {} page(s) and {} asset(s) in {:.2?}",
            report.pages,
            report.assets,
            started.elapsed()
        ));
        if report.skipped > 0 {
            output.info(&format!("Skipped {} page(s)", report.skipped));
        }
        Ok(())
    }
}

/// Request context for generated pages: HTTPS on `host`, or relative URLs.
fn public_request(host: Option<String>) -> RequestInfo {
    match host {
        Some(host) => RequestInfo::new(Some(host), "https"),
        None => RequestInfo::default(),
    }
}
