//! # Memobatch
//!
//! An in-process coordination layer over an external key-value store:
//! derived-key memoization, chunked list caching, and batched lookups.
//!
//! ## Features
//!
//! - Cache keys derived from a function identity and its call arguments
//! - Single-value memoization over a pluggable async backend
//! - Ordered lists cached as fixed-size, boundary-aligned chunks
//! - Overlapping windows reuse chunks instead of re-reading the source
//! - Deferred lookups coalesced into one `multi_get` per batch scope
//! - Nested LIFO batch scopes with RAII guards
//! - Register, call, and invalidate hooks, context-local before global
//! - Optional expiry with configurable jitter
//!
//! ## Single-Value Caching
//!
//! Wrap an async function; results are stored under `identity:arg1:arg2`
//! keys and served from the store on repeat calls.
//!
//! ```no_run
//! use memobatch::{Cacher, MemoryBackend};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cacher = Cacher::new(Arc::new(MemoryBackend::new()));
//!
//!     let profile = cacher.cached("users.profile", |(id,): (u64,)| async move {
//!         Ok(format!("user-{id}"))
//!     });
//!
//!     let first = profile.call((42,)).await?;
//!     let second = profile.call((42,)).await?;
//!     assert_eq!(first, second);
//!     Ok(())
//! }
//! ```
//!
//! ## Chunked List Caching
//!
//! A paged source is cached as fixed-size chunks keyed by their position, so
//! any `(skip, limit)` window resolves from whole chunks and different
//! windows share them.
//!
//! ```no_run
//! use memobatch::{Cacher, MemoryBackend};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cacher = Cacher::new(Arc::new(MemoryBackend::new()));
//!
//!     let feed = cacher
//!         .cached_list("feed.items", |(_user,): (u64,), skip, limit| async move {
//!             Ok((skip..skip + limit).collect::<Vec<u64>>())
//!         })
//!         .with_chunk_size(5);
//!
//!     // Fills chunks [0:5], [6:10] and [11:15].
//!     let window = feed.call((7,), 0, 12).await?;
//!     assert_eq!(window.len(), 12);
//!
//!     // Resolved entirely from the [6:10] chunk.
//!     let reused = feed.call((7,), 5, 5).await?;
//!     assert_eq!(reused.len(), 5);
//!     Ok(())
//! }
//! ```
//!
//! ## Batched Lookups
//!
//! Inside a batch scope, keys are queued instead of read one by one and a
//! single `multi_get` resolves them together. Calls made afterwards read
//! from the fetched results.
//!
//! ```no_run
//! use memobatch::{Cacher, MemoryBackend};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cacher = Cacher::new(Arc::new(MemoryBackend::new()));
//!
//!     let profile = cacher.cached("users.profile", |(id,): (u64,)| async move {
//!         Ok(format!("user-{id}"))
//!     });
//!
//!     let ctx = cacher.create_context();
//!     let scope = cacher.enter(&ctx)?;
//!
//!     // Queue every key this request will need, then resolve them in one
//!     // round trip.
//!     profile.register(&(1,))?;
//!     profile.register(&(2,))?;
//!     scope.context().fetch().await?;
//!
//!     let one = profile.call((1,)).await?;
//!     let two = profile.call((2,)).await?;
//!     println!("{one} {two}");
//!
//!     scope.exit().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Hooks
//!
//! Hooks observe cache activity without changing it. Context-local hooks
//! fire before global ones for the same event.
//!
//! ```no_run
//! use memobatch::{BatchContext, Cacher, HookEvent, MemoryBackend};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cacher = Cacher::new(Arc::new(MemoryBackend::new()));
//!
//!     cacher.add_hook(
//!         HookEvent::Invalidate,
//!         Arc::new(|key: &str, _: Option<&BatchContext>| {
//!             println!("invalidated {key}");
//!         }),
//!     );
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod batch;
pub mod cache;
pub mod cacher;
pub mod error;
pub mod hooks;

// Re-export main types for convenience
pub use backend::{Backend, MemoryBackend, MemoryBackendStats};
pub use batch::{BatchContext, BatchScope};
pub use cache::{
    build_chunk_key, build_key, partition, CacheArgs, CacheConfig, CacheConfigBuilder, CachedFn,
    CachedListFn, RangePair,
};
pub use cacher::Cacher;
pub use error::{CacheError, Result};
pub use hooks::{HookCallback, HookEvent, HookRegistry};
