//! Single-value memoized functions

use std::time::Duration;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::cache::key::{build_key, CacheArgs};
use crate::cache::{decode_value, encode_value};
use crate::cacher::Cacher;
use crate::error::{CacheError, Result};
use crate::hooks::HookEvent;

pub(crate) type SourceFn<A, T> =
    Box<dyn Fn(A) -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync>;

/// A memoized async function
///
/// Wraps a source function whose result is cached under a key derived from
/// the function identity and its arguments. Created by [`Cacher::cached`];
/// the stored value is JSON at the backend boundary.
///
/// ```no_run
/// # async fn demo() -> memobatch::Result<()> {
/// use std::sync::Arc;
/// use memobatch::{Cacher, MemoryBackend};
///
/// let cacher = Cacher::new(Arc::new(MemoryBackend::new()));
/// let profile = cacher.cached("users.profile", |(id,): (u64,)| async move {
///     Ok(format!("profile for {id}"))
/// });
///
/// let first = profile.call((7,)).await?; // runs the source
/// let again = profile.call((7,)).await?; // served from the store
/// assert_eq!(first, again);
/// # Ok(())
/// # }
/// ```
pub struct CachedFn<A, T> {
    cacher: Cacher,
    identity: String,
    expires: Option<Duration>,
    source: SourceFn<A, T>,
}

impl<A, T> CachedFn<A, T>
where
    A: CacheArgs,
    T: Serialize + DeserializeOwned,
{
    pub(crate) fn new(cacher: Cacher, identity: String, source: SourceFn<A, T>) -> Self {
        Self {
            cacher,
            identity,
            expires: None,
            source,
        }
    }

    /// Override the expiry applied to this function's writes
    ///
    /// Without an override, `CacheConfig::default_expires` applies.
    pub fn with_expiry(mut self, expires: Duration) -> Self {
        self.expires = Some(expires);
        self
    }

    /// The qualified name used as the key prefix
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Cache key for an argument tuple
    pub fn cache_key(&self, args: &A) -> String {
        build_key(&self.identity, args)
    }

    fn effective_expiry(&self) -> Option<Duration> {
        self.cacher.config().effective_expiry(self.expires)
    }

    /// Resolve a call through the cache
    ///
    /// Resolution order: the active batch context's last-fetch map, then the
    /// backend, then the source. A computed value is written back before it
    /// is returned; a source failure propagates and writes nothing. The
    /// `call` hook fires once per invocation with the root key.
    pub async fn call(&self, args: A) -> Result<T> {
        let key = self.cache_key(&args);

        let mut raw = None;
        if let Some(ctx) = self.cacher.current() {
            raw = ctx.lookup(&key);
        }
        if raw.is_none() {
            raw = self.cacher.backend().get(&key).await?;
        }

        let value = match raw {
            Some(raw) => {
                debug!("Cache hit: {}", key);
                decode_value(&raw)?
            }
            None => {
                debug!("Cache miss: {}", key);
                let value = (self.source)(args).await?;
                let encoded = encode_value(&value)?;
                self.cacher
                    .backend()
                    .set(&key, encoded, self.effective_expiry())
                    .await?;
                value
            }
        };

        self.cacher.fire_hooks(HookEvent::Call, &key);
        Ok(value)
    }

    /// Run the source unconditionally and overwrite the stored value
    pub async fn warm(&self, args: A) -> Result<T> {
        let key = self.cache_key(&args);

        let value = (self.source)(args).await?;
        let encoded = encode_value(&value)?;
        self.cacher
            .backend()
            .set(&key, encoded, self.effective_expiry())
            .await?;

        debug!("Warmed cache entry: {}", key);
        Ok(value)
    }

    /// Whether a value is currently stored for `args`
    pub async fn is_cached(&self, args: &A) -> Result<bool> {
        self.cacher.backend().exists(&self.cache_key(args)).await
    }

    /// Delete the stored value for `args`
    ///
    /// Fires the `invalidate` hook with the root key whether or not a value
    /// was present.
    pub async fn invalidate(&self, args: &A) -> Result<()> {
        let key = self.cache_key(args);
        self.cacher.backend().delete(&key).await?;

        debug!("Invalidated cache entry: {}", key);
        self.cacher.fire_hooks(HookEvent::Invalidate, &key);
        Ok(())
    }

    /// Queue this function's key for the active context's next batch fetch
    ///
    /// Performs no store I/O. Errors with `OutOfContext` when no batch
    /// context is active; otherwise fires the `register` hook with the root
    /// key.
    pub fn register(&self, args: &A) -> Result<()> {
        let ctx = self.cacher.current().ok_or(CacheError::OutOfContext)?;
        let key = self.cache_key(args);
        ctx.add(key.clone());

        self.cacher.fire_hooks(HookEvent::Register, &key);
        Ok(())
    }
}
