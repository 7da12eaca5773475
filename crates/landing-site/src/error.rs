//! Site errors.

use std::path::{Path, PathBuf};

use landing_cache::CacheError;
use landing_storage::StorageError;
use landing_template::{Flow, RenderError, TemplateError};

/// Error raised while indexing, configuring or rendering the site.
#[derive(Debug, thiserror::Error)]
pub enum SiteError {
    /// Content could not be listed or parsed.
    #[error("index error: {0}")]
    Index(#[from] StorageError),
    /// A permalink template does not compile to a pattern.
    #[error("invalid permalink `{permalink}`: {source}")]
    Permalink {
        permalink: String,
        #[source]
        source: regex::Error,
    },
    /// Template parse or evaluation error.
    #[error(transparent)]
    Template(#[from] TemplateError),
    /// A template stopped the render with a not-found or redirect signal.
    #[error("render halted: {0:?}")]
    Halt(Flow),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML in {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("invalid image size {width}x{height}")]
    InvalidImageSize { width: u32, height: u32 },
    #[error("feed error: {0}")]
    Feed(#[from] atom_syndication::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("HTTP request failed: {0}")]
    Http(#[from] ureq::Error),
    #[error("HTTP {status}: {body}")]
    HttpResponse { status: u16, body: String },
    /// A secret needed by a collaborator is not configured.
    #[error("missing secret `{0}`")]
    MissingSecret(String),
}

impl SiteError {
    pub(crate) fn io(source: std::io::Error, path: impl AsRef<Path>) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// The halt signal, when this error is one.
    #[must_use]
    pub fn flow(&self) -> Option<&Flow> {
        match self {
            Self::Halt(flow) => Some(flow),
            _ => None,
        }
    }
}

impl From<RenderError> for SiteError {
    fn from(e: RenderError) -> Self {
        match e {
            RenderError::Halt(flow) => Self::Halt(flow),
            RenderError::Template(e) => Self::Template(e),
        }
    }
}

impl From<SiteError> for RenderError {
    fn from(e: SiteError) -> Self {
        match e {
            SiteError::Halt(flow) => Self::Halt(flow),
            SiteError::Template(e) => Self::Template(e),
            other => Self::eval(other.to_string()),
        }
    }
}
