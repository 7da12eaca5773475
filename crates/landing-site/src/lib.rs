//! Content index, rendering and static generation for Landing.
//!
//! [`LandingServing`] ties the pieces together:
//!
//! - [`Entries`]: lazily rebuilt snapshot of every post, page and
//!   collection item ([`EntriesIndex`])
//! - [`SiteConfigService`]: `config.yml`, `secrets.yml` and `data/` files
//! - the template engine with the site filters, functions and tags
//! - [`PageShownListener`]: hooks that see every page before it renders
//!
//! A render resolves the request path to an [`Entry`], assembles the scope,
//! renders the entry through its layouts and applies sponsor gating to the
//! result. [`LandingServing::generate_site`] writes every page to `_site/`
//! and [`LandingServing::watch`] reloads the site when content changes.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use landing_cache::NullCache;
//! use landing_site::{LandingServing, RequestInfo};
//! use landing_storage::Folders;
//!
//! let serving = LandingServing::new(Folders::new("content"), Arc::new(NullCache))?;
//! let page = serving.generate("/about", &RequestInfo::default(), 200)?;
//! println!("{}", page.body);
//! ```

mod config;
mod css;
mod entry;
mod error;
mod extensions;
mod feed;
mod gating;
mod generate;
mod images;
mod index;
mod permalink;
mod reload;
mod request;
mod serving;
mod session;
mod store;
mod youtube;

pub use config::SiteConfigService;
pub use css::compress_css;
pub use entry::{Entry, MORE_MARKER};
pub use error::SiteError;
pub use feed::{FEED_PATH, atom_feed, build_feed};
pub use gating::apply_gate;
pub use generate::{GenerateReport, PageFailure, output_path, page_count};
pub use images::{ImageSize, RESIZES_URL, ScaleMode, TRANSPARENT_GIF, image_size, resized_image};
pub use index::{CONTENT_EXTENSIONS, EntriesIndex, Resolved, index_dir};
pub use permalink::{PAGE_PARAM, PermalinkPattern, canonicalize, is_dynamic, with_page};
pub use reload::{RELOAD_DELAY, SiteWatcher, run_reload_loop};
pub use request::{REQUEST_VAR, RequestInfo};
pub use serving::{LandingServing, NOT_FOUND_BODY, NOT_FOUND_PERMALINK, PageType, Rendered};
pub use session::{AnonymousSession, PageShown, PageShownListener};
pub use store::Entries;
pub use youtube::{
    API_KEY_SECRET, Thumbnail, YoutubeInfo, YoutubeService, parse_duration, parse_response,
};
