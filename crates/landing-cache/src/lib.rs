//! Persistent cache for Landing.
//!
//! This crate provides a small key/value store whose values are JSON documents
//! with an expiry timestamp. Two traits form the API:
//!
//! - [`Cache`]: object-safe raw store working on JSON text
//! - [`CacheExt`]: typed `get`/`put` helpers for serde types, including the
//!   generate-on-miss [`CacheExt::get`]
//!
//! # Implementations
//!
//! - [`NullCache`]: no-op implementation (always misses, never stores)
//! - [`FileCache`]: one file per key under a SHA-256 fan-out directory
//!
//! # Concurrency
//!
//! The cache is best effort. Two concurrent misses on the same key both run
//! their generator and both write; the last write wins. Readers never observe
//! a partially written record because writes go through a rename.
//!
//! # Example
//!
//! ```
//! use landing_cache::{CacheExt, NullCache, DEFAULT_TTL};
//!
//! let cache = NullCache;
//! let value: u32 = cache
//!     .get("answer", DEFAULT_TTL, || Ok::<_, landing_cache::CacheError>(42))
//!     .unwrap();
//! assert_eq!(value, 42);
//! ```

mod ext;
mod file;

use std::time::Duration;

pub use ext::CacheExt;
pub use file::FileCache;

/// Default time-to-live for cached values (365 days).
pub const DEFAULT_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Error returned by cache operations.
///
/// Storage errors are never swallowed: a cache that cannot be read or written
/// is reported to the caller.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// I/O error while reading or writing a record.
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A stored record (or a value being stored) is not valid JSON.
    #[error("cache JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Raw key/value store with per-record expiry.
///
/// Values are JSON text. A record is visible only while its expiry timestamp
/// is not in the past; expired records may remain on disk but are treated as
/// absent.
pub trait Cache: Send + Sync {
    /// Read the JSON text stored for `key`.
    ///
    /// Returns `Ok(None)` when the key is absent or expired.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Json`] if the stored record is malformed and
    /// [`CacheError::Io`] if it cannot be read.
    fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store JSON text for `key`, valid for `ttl` from now.
    ///
    /// Overwrites any existing record for the same key.
    fn put_raw(&self, key: &str, json: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Whether a non-expired record exists for `key`.
    fn has(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.get_raw(key)?.is_some())
    }
}

/// No-op [`Cache`] that never stores or retrieves data.
///
/// Every lookup misses, so [`CacheExt::get`] always runs its generator.
/// Used when caching is disabled.
pub struct NullCache;

impl Cache for NullCache {
    fn get_raw(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Ok(None)
    }

    fn put_raw(&self, _key: &str, _json: &str, _ttl: Duration) -> Result<(), CacheError> {
        Ok(())
    }
}
