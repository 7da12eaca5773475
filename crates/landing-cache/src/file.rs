//! File-based cache implementation.
//!
//! [`FileCache`] stores one JSON document per key. Keys are hashed with
//! SHA-256 and fanned out by the first byte of the hash:
//!
//! ```text
//! {root}/
//! +-- VERSION              # record format version
//! +-- 3f/
//! |   +-- 3fa1...e2.json   # {"valid_until": 1767225600, "content": ...}
//! +-- a0/
//!     +-- ...
//! ```
//!
//! On construction, [`FileCache`] validates the `VERSION` file in the cache
//! root. If the version mismatches or is missing, the directory is wiped and
//! recreated so records written in an older format are never parsed.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Cache, CacheError};

/// Current on-disk record format.
pub const FORMAT_VERSION: &str = "1";

/// Counter making temporary file names unique within the process.
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// On-disk record.
#[derive(Serialize, Deserialize)]
struct Record {
    /// Unix timestamp (seconds) after which the record is treated as absent.
    valid_until: i64,
    /// Cached JSON value.
    content: serde_json::Value,
}

/// File-based [`Cache`] rooted at a directory on disk.
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    /// Create a cache at `root`, validating the record format version.
    ///
    /// Errors during validation are logged but never fatal; subsequent reads
    /// and writes report their own I/O errors.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        validate_version(&root, FORMAT_VERSION);
        Self { root }
    }

    /// Root directory of this cache.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the record file for `key`.
    fn record_path(&self, key: &str) -> PathBuf {
        let hash = hex::encode(Sha256::digest(key.as_bytes()));
        self.root.join(&hash[..2]).join(format!("{hash}.json"))
    }
}

impl Cache for FileCache {
    fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError> {
        let path = self.record_path(key);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let record: Record = serde_json::from_str(&text)?;
        if record.valid_until < now() {
            tracing::debug!(key, "cache record expired");
            return Ok(None);
        }
        Ok(Some(serde_json::to_string(&record.content)?))
    }

    fn put_raw(&self, key: &str, json: &str, ttl: Duration) -> Result<(), CacheError> {
        let record = Record {
            valid_until: now().saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)),
            content: serde_json::from_str(json)?,
        };

        let path = self.record_path(key);
        let Some(dir) = path.parent() else {
            return Ok(());
        };
        fs::create_dir_all(dir)?;

        // Write to a sibling file first so readers never see a torn record
        let tmp = dir.join(format!(
            ".tmp-{}-{}",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&tmp, serde_json::to_vec(&record)?)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}

/// Current Unix time in seconds.
fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Validate the cache version, wiping the directory on mismatch.
fn validate_version(root: &Path, version: &str) {
    let version_file = root.join("VERSION");

    match fs::read_to_string(&version_file) {
        Ok(stored) if stored == version => {
            tracing::debug!("cache version matches: {version}");
            return;
        }
        Ok(stored) => {
            tracing::info!(
                "cache version mismatch (stored={stored}, current={version}), wiping cache"
            );
        }
        Err(_) => {
            tracing::info!("no cache VERSION file found, initializing cache");
        }
    }

    if root.exists()
        && let Err(e) = fs::remove_dir_all(root)
    {
        tracing::warn!("failed to remove cache directory: {e}");
    }
    if let Err(e) = fs::create_dir_all(root) {
        tracing::warn!("failed to create cache directory: {e}");
        return;
    }
    if let Err(e) = fs::write(&version_file, version) {
        tracing::warn!("failed to write cache VERSION file: {e}");
    }
}
