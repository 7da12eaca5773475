//! Extension trait for [`Cache`] with typed convenience methods.

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{Cache, CacheError};

/// Typed convenience methods for [`Cache`].
///
/// Implemented as default methods on an extension trait so that [`Cache`]
/// stays object-safe and implementors only handle JSON text.
pub trait CacheExt: Cache {
    /// Retrieve a deserialized value.
    ///
    /// Returns `Ok(None)` on miss or expiry. A stored record that does not
    /// deserialize into `T` is an error, not a miss.
    fn get_opt<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        match self.get_raw(key)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Serialize and store a value for `ttl`.
    fn put<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let json = serde_json::to_string(value)?;
        self.put_raw(key, &json, ttl)
    }

    /// Return the stored value for `key`, generating and storing it on miss.
    ///
    /// The generator runs only when the key is absent or expired. There is no
    /// per-key locking: concurrent misses may both run the generator.
    ///
    /// # Errors
    ///
    /// Propagates generator errors as-is and cache errors through `E::from`.
    fn get<T, E, F>(&self, key: &str, ttl: Duration, generate: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce() -> Result<T, E>,
    {
        if let Some(value) = self.get_opt(key)? {
            return Ok(value);
        }
        let value = generate()?;
        self.put(key, &value, ttl)?;
        Ok(value)
    }
}

impl<C: Cache + ?Sized> CacheExt for C {}
