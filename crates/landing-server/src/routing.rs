//! Request routing.
//!
//! Decides what answers a path, without touching HTTP types, so the order
//! can be tested against a plain site directory:
//!
//! 1. non-root paths ending in `/` redirect to their canonical form
//! 2. the entry owning the path
//! 3. the Atom feed at `/rss`
//! 4. resized images under `/__resizes/`
//! 5. files under `static/`
//! 6. the not-found page

use std::path::{Path, PathBuf};

use landing_site::{
    FEED_PATH, LandingServing, RESIZES_URL, Rendered, RequestInfo, canonicalize,
};
use landing_storage::Folders;
use landing_template::Flow;
use tracing::{debug, error};

const FEED_CONTENT_TYPE: &str = "application/atom+xml; charset=utf-8";

/// Response to a site request, before HTTP encoding.
#[derive(Debug, PartialEq, Eq)]
pub enum Reply {
    Page {
        body: String,
        content_type: &'static str,
        status: u16,
    },
    /// A file to stream from `root`; `relative` has no leading `/`.
    File {
        root: PathBuf,
        relative: String,
    },
    Redirect {
        location: String,
        permanent: bool,
    },
    /// Internal failure; details are logged, never sent.
    Error,
}

impl From<Rendered> for Reply {
    fn from(page: Rendered) -> Self {
        Self::Page {
            body: page.body,
            content_type: page.page_type.content_type(),
            status: page.status,
        }
    }
}

/// Answer a GET for `path` (percent-decoded).
pub fn respond(serving: &LandingServing, path: &str, request: &RequestInfo) -> Reply {
    if path.len() > 1 && path.ends_with('/') {
        return Reply::Redirect {
            location: canonicalize(path),
            permanent: true,
        };
    }

    match serving.generate(path, request, 200) {
        Ok(page) => return page.into(),
        Err(e) => match e.flow() {
            Some(Flow::Redirect { url, permanent }) => {
                return Reply::Redirect {
                    location: url.clone(),
                    permanent: *permanent,
                };
            }
            Some(Flow::NotFound) => {}
            None => {
                error!(path, error = %e, "Render failed");
                return Reply::Error;
            }
        },
    }

    if path == FEED_PATH {
        return match serving.feed(request) {
            Ok(body) => Reply::Page {
                body,
                content_type: FEED_CONTENT_TYPE,
                status: 200,
            },
            Err(e) => {
                error!(error = %e, "Feed failed");
                Reply::Error
            }
        };
    }

    let folders = serving.folders();
    let file = match path.strip_prefix(RESIZES_URL) {
        Some(resized) => file_reply(&folders.resizes_dir(), resized),
        None => file_reply(&folders.static_dir(), path),
    };
    file.unwrap_or_else(|| {
        debug!(path, "Not found");
        serving.not_found(request).into()
    })
}

/// A file under `base`, or `None` when missing or outside `base`.
fn file_reply(base: &Path, relative: &str) -> Option<Reply> {
    let path = Folders::resolve_within(base, relative).ok()?;
    path.is_file().then(|| Reply::File {
        root: base.to_path_buf(),
        relative: relative.trim_start_matches('/').to_owned(),
    })
}
