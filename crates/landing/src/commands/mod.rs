//! CLI command implementations.

pub(crate) mod generate;
pub(crate) mod serve;

pub(crate) use generate::GenerateArgs;
pub(crate) use serve::ServeArgs;

use std::sync::Arc;

use landing_cache::{Cache, FileCache, NullCache};
use landing_config::ContentConfig;
use landing_site::LandingServing;
use landing_storage::Folders;
use tracing::debug;

use crate::error::CliError;

/// Build the site service for the configured content directory.
pub(crate) fn open_site(content: &ContentConfig) -> Result<LandingServing, CliError> {
    let folders = Folders::new(content.content_dir.clone());
    debug!(
        content_dir = %folders.root().display(),
        cache_enabled = content.cache_enabled,
        "Opening site"
    );
    let cache: Arc<dyn Cache> = if content.cache_enabled {
        Arc::new(FileCache::new(folders.cache_dir().join("store")))
    } else {
        Arc::new(NullCache)
    };
    Ok(LandingServing::new(folders, cache)?)
}
