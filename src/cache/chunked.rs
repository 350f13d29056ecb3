//! Chunked list caching
//!
//! Large ordered-list results are split into fixed-size chunks, each cached
//! under its own window-suffixed key. A request for any `(skip, limit)`
//! window resolves chunk by chunk: cached chunks are reused, missing ones are
//! filled from the source, and the stitched items are windowed back to
//! exactly what was asked for. Overlapping requests therefore share chunk
//! entries instead of each writing their own span.

use std::time::Duration;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::cache::key::{build_chunk_key, build_key, CacheArgs};
use crate::cache::range::partition;
use crate::cache::{decode_value, encode_value};
use crate::cacher::Cacher;
use crate::error::{CacheError, Result};
use crate::hooks::HookEvent;

pub(crate) type ListSourceFn<A, T> =
    Box<dyn Fn(A, u64, u64) -> BoxFuture<'static, anyhow::Result<Vec<T>>> + Send + Sync>;

/// A chunk-cached async list function
///
/// Wraps a source of the shape `(args, skip, limit) -> Vec<T>` returning an
/// ordered page of a larger list. Created by [`Cacher::cached_list`].
///
/// ```no_run
/// # async fn demo() -> memobatch::Result<()> {
/// use std::sync::Arc;
/// use memobatch::{Cacher, MemoryBackend};
///
/// let cacher = Cacher::new(Arc::new(MemoryBackend::new()));
/// let feed = cacher
///     .cached_list("feed.items", |(user,): (u64,), skip, limit| async move {
///         Ok((skip..skip + limit).map(|n| format!("item-{user}-{n}")).collect())
///     })
///     .with_chunk_size(5);
///
/// // Fills chunks [0:5] and [6:10], returns items 0..8.
/// let window = feed.call((1,), 0, 8).await?;
/// assert_eq!(window.len(), 8);
/// # Ok(())
/// # }
/// ```
pub struct CachedListFn<A, T> {
    cacher: Cacher,
    identity: String,
    chunk_size: Option<u64>,
    expires: Option<Duration>,
    source: ListSourceFn<A, T>,
}

impl<A, T> CachedListFn<A, T>
where
    A: CacheArgs + Clone,
    T: Serialize + DeserializeOwned,
{
    pub(crate) fn new(cacher: Cacher, identity: String, source: ListSourceFn<A, T>) -> Self {
        Self {
            cacher,
            identity,
            chunk_size: None,
            expires: None,
            source,
        }
    }

    /// Override the chunk size for this function
    ///
    /// Without an override, `CacheConfig::default_chunk_size` applies.
    /// Changing the size orphans chunks written under the old one. A zero
    /// size produces no windows, so every call yields an empty list.
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    /// Override the expiry applied to this function's chunk writes
    pub fn with_expiry(mut self, expires: Duration) -> Self {
        self.expires = Some(expires);
        self
    }

    /// The qualified name used as the key prefix
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// The chunk size in effect for this function
    pub fn effective_chunk_size(&self) -> u64 {
        self.chunk_size
            .unwrap_or(self.cacher.config().default_chunk_size)
    }

    /// The unchunked root key for an argument tuple
    pub fn cache_key(&self, args: &A) -> String {
        build_key(&self.identity, args)
    }

    /// Chunk keys covering the `(skip, limit)` window for `args`
    pub fn chunk_keys(&self, args: &A, skip: u64, limit: u64) -> Vec<String> {
        let root = self.cache_key(args);
        partition(self.effective_chunk_size(), skip, limit)
            .into_iter()
            .map(|pair| build_chunk_key(&root, pair))
            .collect()
    }

    fn effective_expiry(&self) -> Option<Duration> {
        self.cacher.config().effective_expiry(self.expires)
    }

    /// Resolve a `(skip, limit)` window through the chunk cache
    ///
    /// The window is partitioned into aligned chunks, resolved in order.
    /// Each chunk is taken from the active batch context's last-fetch map,
    /// else read from the backend, else filled from the source and written
    /// back. A chunk shorter than the chunk size marks the end of the list
    /// and stops resolution. The stitched items are then windowed: the
    /// lead-in below `skip` is dropped and the result truncated to `limit`.
    /// The `call` hook fires once with the root key.
    pub async fn call(&self, args: A, skip: u64, limit: u64) -> Result<Vec<T>> {
        let root = self.cache_key(&args);
        let chunk_size = self.effective_chunk_size();
        if chunk_size == 0 {
            self.cacher.fire_hooks(HookEvent::Call, &root);
            return Ok(Vec::new());
        }

        let ctx = self.cacher.current();

        let mut items: Vec<T> = Vec::new();
        let mut first = true;
        for pair in partition(chunk_size, skip, limit) {
            let chunk_key = build_chunk_key(&root, pair);

            let mut raw = ctx.as_ref().and_then(|c| c.lookup(&chunk_key));
            if raw.is_none() {
                raw = self.cacher.backend().get(&chunk_key).await?;
            }

            let record: Vec<T> = match raw {
                Some(raw) => {
                    debug!("Chunk hit: {}", chunk_key);
                    decode_value(&raw)?
                }
                None => {
                    // Chunks carry end-aligned labels: the window at the
                    // origin fills from pair.start, every later one from
                    // pair.start - 1.
                    let source_skip = if first { pair.start } else { pair.start - 1 };
                    debug!("Chunk miss: {} (source skip {})", chunk_key, source_skip);

                    let record = (self.source)(args.clone(), source_skip, chunk_size).await?;
                    let encoded = encode_value(&record)?;
                    self.cacher
                        .backend()
                        .set(&chunk_key, encoded, self.effective_expiry())
                        .await?;
                    record
                }
            };

            let record_len = record.len() as u64;
            items.extend(record);
            first = false;

            if record_len < chunk_size {
                debug!(
                    "Chunk {} holds {} of {} items, list ends here",
                    chunk_key, record_len, chunk_size
                );
                break;
            }
        }

        // The accumulator starts at the aligned floor of skip, not at skip
        // itself; drop the lead-in before applying the limit.
        let offset = (skip % chunk_size) as usize;
        let window: Vec<T> = items
            .into_iter()
            .skip(offset)
            .take(limit as usize)
            .collect();

        self.cacher.fire_hooks(HookEvent::Call, &root);
        Ok(window)
    }

    /// Delete the chunk entries for `args` over the invalidation span
    ///
    /// Covers the chunks spanning items `0..CacheConfig::invalidation_span`.
    /// Chunks beyond the span are not touched and age out via expiry. Fires
    /// the `invalidate` hook once with the root key.
    pub async fn invalidate(&self, args: &A) -> Result<()> {
        let root = self.cache_key(args);
        let span = self.cacher.config().invalidation_span;

        let mut deleted = 0usize;
        for pair in partition(self.effective_chunk_size(), 0, span) {
            let chunk_key = build_chunk_key(&root, pair);
            self.cacher.backend().delete(&chunk_key).await?;
            deleted += 1;
        }

        debug!("Invalidated {} chunk key(s) under {}", deleted, root);
        self.cacher.fire_hooks(HookEvent::Invalidate, &root);
        Ok(())
    }

    /// Queue the window's chunk keys on the active context's next fetch
    ///
    /// Performs no store I/O. Errors with `OutOfContext` when no batch
    /// context is active; otherwise fires the `register` hook with the root
    /// key.
    pub fn register(&self, args: &A, skip: u64, limit: u64) -> Result<()> {
        let ctx = self.cacher.current().ok_or(CacheError::OutOfContext)?;

        let root = self.cache_key(args);
        ctx.add_many(self.chunk_keys(args, skip, limit));

        self.cacher.fire_hooks(HookEvent::Register, &root);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, MemoryBackend};
    use crate::batch::BatchContext;
    use crate::cache::config::CacheConfig;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};

    fn cacher() -> (Arc<MemoryBackend>, Cacher) {
        let backend = Arc::new(MemoryBackend::new());
        let cacher = Cacher::new(Arc::clone(&backend) as Arc<dyn Backend>);
        (backend, cacher)
    }

    /// List function over `0..total`, recording every source skip
    fn paged_fn(
        cacher: &Cacher,
        total: u64,
    ) -> (Arc<Mutex<Vec<u64>>>, CachedListFn<(u32,), u64>) {
        let skips = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&skips);
        let cached = cacher
            .cached_list("feed.items", move |(_tenant,): (u32,), skip, limit| {
                let recorder = Arc::clone(&recorder);
                async move {
                    recorder.lock().unwrap().push(skip);
                    let end = (skip + limit).min(total);
                    let page: Vec<u64> = (skip.min(total)..end).collect();
                    Ok::<_, anyhow::Error>(page)
                }
            })
            .with_chunk_size(5);
        (skips, cached)
    }

    #[tokio::test]
    async fn test_constant_source_fills_two_chunks() {
        let (backend, cacher) = cacher();

        let skips = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&skips);
        let cached = cacher
            .cached_list("feed.items", move |(_id,): (u32,), skip, _limit| {
                let recorder = Arc::clone(&recorder);
                async move {
                    recorder.lock().unwrap().push(skip);
                    Ok::<_, anyhow::Error>(vec![1u32, 2, 3, 4, 5])
                }
            })
            .with_chunk_size(5);

        let window = cached.call((1,), 0, 8).await.unwrap();

        assert_eq!(window, vec![1, 2, 3, 4, 5, 1, 2, 3]);
        assert_eq!(*skips.lock().unwrap(), vec![0, 5]);

        assert!(backend.exists("feed.items:1[0:5]").await.unwrap());
        assert!(backend.exists("feed.items:1[6:10]").await.unwrap());
        assert_eq!(backend.stats().sets, 2);
    }

    #[tokio::test]
    async fn test_full_window_fills_three_chunks() {
        let (_backend, cacher) = cacher();
        let (skips, cached) = paged_fn(&cacher, 100);

        let window = cached.call((1,), 0, 15).await.unwrap();

        assert_eq!(window, (0..15).collect::<Vec<u64>>());
        assert_eq!(*skips.lock().unwrap(), vec![0, 5, 10]);
    }

    #[tokio::test]
    async fn test_second_call_is_fully_cached() {
        let (backend, cacher) = cacher();
        let (skips, cached) = paged_fn(&cacher, 100);

        let first = cached.call((1,), 0, 15).await.unwrap();
        let second = cached.call((1,), 0, 15).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(*skips.lock().unwrap(), vec![0, 5, 10]);
        assert_eq!(backend.stats().sets, 3);
    }

    #[tokio::test]
    async fn test_unaligned_skip_windows_correctly() {
        let (_backend, cacher) = cacher();
        let (skips, cached) = paged_fn(&cacher, 100);

        let window = cached.call((1,), 4, 5).await.unwrap();

        assert_eq!(window, vec![4, 5, 6, 7, 8]);
        assert_eq!(*skips.lock().unwrap(), vec![0, 5]);
    }

    #[tokio::test]
    async fn test_aligned_skip_resolves_single_chunk() {
        let (_backend, cacher) = cacher();
        let (skips, cached) = paged_fn(&cacher, 100);

        let window = cached.call((1,), 10, 5).await.unwrap();

        // The first window of a sequence fills from its own start, so a
        // fresh fill of [11:15] asks the source from 11.
        assert_eq!(window, vec![11, 12, 13, 14, 15]);
        assert_eq!(*skips.lock().unwrap(), vec![11]);
    }

    #[tokio::test]
    async fn test_chunk_filled_through_origin_route_is_reused_aligned() {
        let (_backend, cacher) = cacher();
        let (skips, cached) = paged_fn(&cacher, 100);

        cached.call((1,), 0, 15).await.unwrap();

        // [11:15] was filled from skip 10 on the origin route; the aligned
        // request now reuses it without touching the source.
        let window = cached.call((1,), 10, 5).await.unwrap();

        assert_eq!(window, vec![10, 11, 12, 13, 14]);
        assert_eq!(*skips.lock().unwrap(), vec![0, 5, 10]);
    }

    #[tokio::test]
    async fn test_short_chunk_ends_the_list() {
        let (backend, cacher) = cacher();
        let (skips, cached) = paged_fn(&cacher, 12);

        let window = cached.call((1,), 0, 20).await.unwrap();

        // Twelve items exist; the fourth chunk is never requested.
        assert_eq!(window, (0..12).collect::<Vec<u64>>());
        assert_eq!(*skips.lock().unwrap(), vec![0, 5, 10]);
        assert_eq!(backend.stats().sets, 3);

        // The short chunk is cached like any other.
        let again = cached.call((1,), 0, 20).await.unwrap();
        assert_eq!(again.len(), 12);
        assert_eq!(*skips.lock().unwrap(), vec![0, 5, 10]);
    }

    #[tokio::test]
    async fn test_zero_limit_is_empty_without_source_calls() {
        let (backend, cacher) = cacher();
        let (skips, cached) = paged_fn(&cacher, 100);

        let window = cached.call((1,), 0, 0).await.unwrap();

        assert!(window.is_empty());
        assert!(skips.lock().unwrap().is_empty());
        assert_eq!(backend.stats().gets, 0);
    }

    #[tokio::test]
    async fn test_chunk_keys_shape() {
        let (_backend, cacher) = cacher();
        let (_skips, cached) = paged_fn(&cacher, 100);

        assert_eq!(
            cached.chunk_keys(&(1,), 0, 8),
            vec![
                "feed.items:1[0:5]".to_string(),
                "feed.items:1[6:10]".to_string(),
            ]
        );
        assert_eq!(cached.cache_key(&(1,)), "feed.items:1");
    }

    #[tokio::test]
    async fn test_with_chunk_size_override() {
        let (_backend, cacher) = cacher();

        let skips = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&skips);
        let cached = cacher
            .cached_list("feed.items", move |(_id,): (u32,), skip, limit| {
                let recorder = Arc::clone(&recorder);
                async move {
                    recorder.lock().unwrap().push(skip);
                    Ok::<_, anyhow::Error>((skip..skip + limit).collect::<Vec<u64>>())
                }
            })
            .with_chunk_size(3);

        assert_eq!(
            cached.chunk_keys(&(1,), 0, 6),
            vec![
                "feed.items:1[0:3]".to_string(),
                "feed.items:1[4:6]".to_string(),
            ]
        );

        let window = cached.call((1,), 0, 6).await.unwrap();
        assert_eq!(window, (0..6).collect::<Vec<u64>>());
        assert_eq!(*skips.lock().unwrap(), vec![0, 3]);
    }

    #[tokio::test]
    async fn test_register_requires_context() {
        let (_backend, cacher) = cacher();
        let (_skips, cached) = paged_fn(&cacher, 100);

        let err = cached.register(&(1,), 0, 8).unwrap_err();
        assert!(matches!(err, CacheError::OutOfContext));
    }

    #[tokio::test]
    async fn test_register_queues_chunk_keys_without_store_io() {
        let (backend, cacher) = cacher();
        let (_skips, cached) = paged_fn(&cacher, 100);

        let registered: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&registered);
        cacher.add_hook(
            HookEvent::Register,
            Arc::new(move |key: &str, _: Option<&BatchContext>| {
                sink.lock().unwrap().push(key.to_string());
            }),
        );

        let ctx = cacher.create_context();
        let scope = cacher.enter(&ctx).unwrap();
        cached.register(&(1,), 0, 8).unwrap();
        scope.exit().await.unwrap();

        assert_eq!(
            ctx.keys(),
            vec![
                "feed.items:1[0:5]".to_string(),
                "feed.items:1[6:10]".to_string(),
            ]
        );
        assert_eq!(*registered.lock().unwrap(), vec!["feed.items:1"]);

        let stats = backend.stats();
        assert_eq!(stats.gets, 0);
        assert_eq!(stats.multi_gets, 0);
        assert_eq!(stats.sets, 0);
    }

    #[tokio::test]
    async fn test_prefetched_context_serves_chunks() {
        let (backend, cacher) = cacher();
        let (skips, cached) = paged_fn(&cacher, 100);

        backend
            .set(
                "feed.items:1[0:5]",
                encode_value(&(0u64..5).collect::<Vec<u64>>()).unwrap(),
                None,
            )
            .await
            .unwrap();
        backend
            .set(
                "feed.items:1[6:10]",
                encode_value(&(5u64..10).collect::<Vec<u64>>()).unwrap(),
                None,
            )
            .await
            .unwrap();

        let ctx = cacher.create_context();
        let scope = cacher.enter(&ctx).unwrap();

        cached.register(&(1,), 0, 10).unwrap();
        ctx.fetch().await.unwrap();

        let window = cached.call((1,), 0, 10).await.unwrap();
        scope.exit().await.unwrap();

        assert_eq!(window, (0..10).collect::<Vec<u64>>());
        assert!(skips.lock().unwrap().is_empty());

        let stats = backend.stats();
        assert_eq!(stats.multi_gets, 1);
        assert_eq!(stats.gets, 0);
    }

    #[tokio::test]
    async fn test_invalidate_deletes_chunks_over_the_span() {
        let (backend, cacher) = cacher();

        let config = CacheConfig::builder().invalidation_span(20).build();
        let backend_dyn = Arc::clone(&backend) as Arc<dyn Backend>;
        let cacher = Cacher::with_config(backend_dyn, config).unwrap();
        let (_skips, cached) = paged_fn(&cacher, 100);

        let invalidated: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&invalidated);
        cacher.add_hook(
            HookEvent::Invalidate,
            Arc::new(move |key: &str, _: Option<&BatchContext>| {
                sink.lock().unwrap().push(key.to_string());
            }),
        );

        cached.call((1,), 0, 10).await.unwrap();
        assert!(backend.exists("feed.items:1[0:5]").await.unwrap());

        cached.invalidate(&(1,)).await.unwrap();

        assert!(!backend.exists("feed.items:1[0:5]").await.unwrap());
        assert!(!backend.exists("feed.items:1[6:10]").await.unwrap());
        // Four chunks cover the span of twenty items.
        assert_eq!(backend.stats().deletes, 4);
        assert_eq!(*invalidated.lock().unwrap(), vec!["feed.items:1"]);
    }

    #[tokio::test]
    async fn test_failing_source_leaves_chunk_unwritten() {
        let (backend, cacher) = cacher();

        let fail_on_skip = Arc::new(AtomicU64::new(5));
        let toggle = Arc::clone(&fail_on_skip);
        let skips = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&skips);
        let cached = cacher
            .cached_list("feed.items", move |(_id,): (u32,), skip, limit| {
                let toggle = Arc::clone(&toggle);
                let recorder = Arc::clone(&recorder);
                async move {
                    recorder.lock().unwrap().push(skip);
                    if toggle.load(Ordering::SeqCst) == skip {
                        anyhow::bail!("page source offline");
                    }
                    Ok((skip..skip + limit).collect::<Vec<u64>>())
                }
            })
            .with_chunk_size(5);

        let err = cached.call((1,), 0, 10).await.unwrap_err();
        assert!(matches!(err, CacheError::Source(_)));

        assert!(backend.exists("feed.items:1[0:5]").await.unwrap());
        assert!(!backend.exists("feed.items:1[6:10]").await.unwrap());
        assert_eq!(*skips.lock().unwrap(), vec![0, 5]);

        fail_on_skip.store(u64::MAX, Ordering::SeqCst);
        let window = cached.call((1,), 0, 10).await.unwrap();

        assert_eq!(window, (0..10).collect::<Vec<u64>>());
        // The first chunk was served from cache; only the second reran.
        assert_eq!(*skips.lock().unwrap(), vec![0, 5, 5]);
    }

    #[tokio::test]
    async fn test_corrupt_chunk_surfaces_decode_error() {
        let (backend, cacher) = cacher();
        let (_skips, cached) = paged_fn(&cacher, 100);

        backend
            .set("feed.items:1[0:5]", "{broken".to_string(), None)
            .await
            .unwrap();

        let err = cached.call((1,), 0, 5).await.unwrap_err();
        assert!(matches!(err, CacheError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_call_hook_fires_once_with_root_key() {
        let (_backend, cacher) = cacher();
        let (_skips, cached) = paged_fn(&cacher, 100);

        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        cacher.add_hook(
            HookEvent::Call,
            Arc::new(move |key: &str, _: Option<&BatchContext>| {
                sink.lock().unwrap().push(key.to_string());
            }),
        );

        cached.call((1,), 0, 15).await.unwrap();
        cached.call((1,), 5, 5).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["feed.items:1", "feed.items:1"]);
    }

    #[tokio::test]
    async fn test_zero_chunk_size_fires_call_hook() {
        let (backend, cacher) = cacher();
        let (skips, cached) = paged_fn(&cacher, 100);
        let cached = cached.with_chunk_size(0);

        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        cacher.add_hook(
            HookEvent::Call,
            Arc::new(move |key: &str, _: Option<&BatchContext>| {
                sink.lock().unwrap().push(key.to_string());
            }),
        );

        let window = cached.call((1,), 0, 10).await.unwrap();

        // No windows, no store traffic, but the hook still reports the call
        assert!(window.is_empty());
        assert!(skips.lock().unwrap().is_empty());
        assert_eq!(backend.stats().gets, 0);
        assert_eq!(*seen.lock().unwrap(), vec!["feed.items:1"]);
    }
}
