//! Content directory layout.
//!
//! ```text
//! content/
//! +-- posts/ | _posts/          # dated entries
//! +-- pages/ | _pages/          # standalone entries
//! +-- collections/<name>/       # one category per subdirectory
//! +-- layouts/ | _layouts/      # layout templates
//! +-- includes/ | _includes/    # include templates
//! +-- static/                   # served verbatim
//! +-- data/*.yml                # exposed as data.<stem>
//! +-- config.yml | _config.yml
//! +-- secrets.yml
//! +-- .cache/                   # persistent cache and resized images
//! ```

use std::fs;
use std::path::{Component, Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::error::{StorageError, StorageErrorKind};

/// Well-known locations inside a content root.
#[derive(Clone, Debug)]
pub struct Folders {
    root: PathBuf,
}

impl Folders {
    /// Create the layout for `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Content root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn posts(&self) -> Vec<PathBuf> {
        self.pair("posts")
    }

    #[must_use]
    pub fn pages(&self) -> Vec<PathBuf> {
        self.pair("pages")
    }

    #[must_use]
    pub fn layouts(&self) -> Vec<PathBuf> {
        self.pair("layouts")
    }

    #[must_use]
    pub fn includes(&self) -> Vec<PathBuf> {
        self.pair("includes")
    }

    /// Named collections: every subdirectory of `collections/`, sorted.
    pub fn collections(&self) -> Result<Vec<(String, PathBuf)>, StorageError> {
        let dir = self.root.join("collections");
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(e, dir)),
        };

        let mut collections = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io(e, &dir))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                collections.push((name.to_owned(), path));
            }
        }
        collections.sort();
        Ok(collections)
    }

    #[must_use]
    pub fn static_dir(&self) -> PathBuf {
        self.root.join("static")
    }

    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    /// Site configuration files, in lookup order.
    #[must_use]
    pub fn config_files(&self) -> [PathBuf; 2] {
        [self.root.join("config.yml"), self.root.join("_config.yml")]
    }

    #[must_use]
    pub fn secrets_file(&self) -> PathBuf {
        self.root.join("secrets.yml")
    }

    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.root.join(".cache")
    }

    /// Resized image output under the cache directory.
    #[must_use]
    pub fn resizes_dir(&self) -> PathBuf {
        self.cache_dir().join("__resizes")
    }

    /// Static generation output directory.
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.root.join("_site")
    }

    /// Join a request-relative path onto `base`, rejecting traversal.
    ///
    /// # Errors
    ///
    /// Returns [`StorageErrorKind::InvalidPath`] if `relative` contains `..`
    /// or a root component.
    pub fn resolve_within(base: &Path, relative: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(relative.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(StorageError::new(StorageErrorKind::InvalidPath).with_path(relative));
        }
        Ok(base.join(relative))
    }

    /// `name/` and `_name/` under the root.
    fn pair(&self, name: &str) -> Vec<PathBuf> {
        vec![self.root.join(name), self.root.join(format!("_{name}"))]
    }
}

/// List files under `roots` recursively whose extension is in `extensions`.
///
/// Missing roots are skipped. Hidden entries (names starting with `.`) are
/// not descended into. Each root is walked in file name order so indexing
/// order is stable across platforms.
///
/// # Errors
///
/// Returns an error if an existing directory cannot be read.
pub fn list_files(roots: &[PathBuf], extensions: &[&str]) -> Result<Vec<PathBuf>, StorageError> {
    let mut files = Vec::new();
    for root in roots {
        if !root.is_dir() {
            continue;
        }
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e));
        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(root).to_path_buf();
                StorageError::io(e.into(), path)
            })?;
            let wanted = entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| extensions.contains(&e));
            if wanted {
                files.push(entry.into_path());
            }
        }
    }
    Ok(files)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_str().is_some_and(|n| n.starts_with('.'))
}
