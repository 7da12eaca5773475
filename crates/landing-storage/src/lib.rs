//! Content files for Landing.
//!
//! This crate owns everything that touches the content directory directly:
//!
//! - [`FrontMatterFile`]: one file split into a YAML header and a body
//! - [`Folders`]: the well-known directories inside a content root
//! - [`list_files`]: recursive listing by extension
//! - [`markdown_to_html`]: the Markdown renderer used for bodies and templates
//! - [`watch`]: debounced change notification for the reload loop

mod debouncer;
mod error;
mod event;
mod folders;
mod front_matter;
mod markdown;
mod watch;

pub use error::{StorageError, StorageErrorKind};
pub use event::{ChangeEvent, ChangeKind, ChangeReceiver, WatchHandle};
pub use folders::{Folders, list_files};
pub use front_matter::{FileKind, FrontMatterFile, split_front_matter};
pub use markdown::markdown_to_html;
pub use watch::watch;
