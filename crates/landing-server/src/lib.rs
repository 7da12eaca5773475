//! HTTP server for Landing.
//!
//! A single catch-all GET route serves the whole site: entry pages, the
//! Atom feed, resized images and `static/` files, with the site's 404 page
//! for everything else. Renders run on tokio's blocking pool since indexing,
//! template rendering and image work are all synchronous I/O.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use landing_cache::NullCache;
//! use landing_server::{ServerConfig, run_server};
//! use landing_site::LandingServing;
//! use landing_storage::Folders;
//!
//! #[tokio::main]
//! async fn main() {
//!     let serving = LandingServing::new(Folders::new("content"), Arc::new(NullCache)).unwrap();
//!     run_server(ServerConfig::default(), Arc::new(serving)).await.unwrap();
//! }
//! ```

mod app;
mod error;
mod handlers;
mod middleware;
mod routing;
mod state;

use std::sync::Arc;

use landing_site::LandingServing;
use state::AppState;

pub use error::ServerError;
pub use routing::{Reply, respond};

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8080,
        }
    }
}

impl From<&landing_config::Config> for ServerConfig {
    fn from(config: &landing_config::Config) -> Self {
        Self {
            host: config.server.host.clone(),
            port: config.server.port,
        }
    }
}

/// Serve `serving` until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or serving fails.
pub async fn run_server(
    config: ServerConfig,
    serving: Arc<LandingServing>,
) -> Result<(), ServerError> {
    let app = app::create_router(Arc::new(AppState { serving }));

    let address = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(|source| ServerError::Bind {
            address: address.clone(),
            source,
        })?;
    tracing::info!(address = %listener.local_addr()?, "Starting server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Wait for shutdown signal (Ctrl-C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Cannot listen for Ctrl-C, serving until killed");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping server...");
}
