//! `landing serve` command implementation.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use landing_config::{CliSettings, Config};
use landing_server::{ServerConfig, run_server};

use super::open_site;
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the serve command.
#[derive(Args)]
pub(crate) struct ServeArgs {
    /// Path to configuration file (default: auto-discover landing.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Site content directory (overrides config).
    #[arg(short, long)]
    content_dir: Option<PathBuf>,

    /// Host to bind to (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind to (overrides config).
    #[arg(short, long, env = "VIRTUAL_PORT")]
    port: Option<u16>,

    /// Do not reload the site when content changes.
    #[arg(long)]
    no_watch: bool,

    /// Disable caching.
    #[arg(long)]
    no_cache: bool,

    /// Enable verbose output (info logs).
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable debug logs.
    #[arg(short, long)]
    pub debug: bool,
}

impl ServeArgs {
    /// Execute the serve command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails, the site cannot be indexed
    /// or the server fails to start.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            host: self.host,
            port: self.port,
            content_dir: self.content_dir,
            cache_enabled: self.no_cache.then_some(false),
            watch_enabled: self.no_watch.then_some(false),
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;
        config.validate()?;

        output.info(&format!(
            "Starting server on {}:{}",
            config.server.host, config.server.port
        ));
        output.info(&format!(
            "Content directory: {}",
            config.content_resolved.content_dir.display()
        ));
        if config.content_resolved.cache_enabled {
            output.info(&format!(
                "Cache directory: {}",
                config.content_resolved.cache_dir().display()
            ));
        } else {
            output.info("Cache: disabled");
        }

        let serving = Arc::new(open_site(&config.content_resolved)?);
        let watcher = if config.watch.enabled {
            output.info("Watch: enabled");
            Some(serving.watch(&config.watch.ignore)?)
        } else {
            output.info("Watch: disabled");
            None
        };

        let result = run_server(ServerConfig::from(&config), serving).await;
        if let Some(watcher) = watcher {
            watcher.stop();
        }
        result?;

        output.success("Server stopped");
        Ok(())
    }
}
