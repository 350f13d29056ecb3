//! Batched Caching Demo Application
//!
//! Walks through single-value caching, chunked list windows, batch scopes,
//! and hooks against the in-memory backend.
//!
//! Usage:
//!   cargo run --example batching_demo

use memobatch::{Backend, BatchContext, CacheConfig, Cacher, HookEvent, MemoryBackend};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    info!("=== Batched Caching Demo ===");

    let backend = Arc::new(MemoryBackend::new());
    let config = CacheConfig::builder()
        .default_expires(Duration::from_secs(600))
        .default_chunk_size(5)
        .invalidation_span(50)
        .build();
    let cacher = Cacher::with_config(Arc::clone(&backend) as Arc<dyn Backend>, config)?;

    info!("\n--- Single-Value Caching ---");
    let profile = cacher.cached("users.profile", |(id,): (u64,)| async move {
        // Simulated upstream latency
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(format!("profile of user {id}"))
    });

    let start = Instant::now();
    let value = profile.call((42,)).await?;
    info!(
        "✗ Miss: '{}' in {}ms (source ran)",
        value,
        start.elapsed().as_millis()
    );

    let start = Instant::now();
    let value = profile.call((42,)).await?;
    info!("✓ Hit:  '{}' in {}ms", value, start.elapsed().as_millis());

    info!("\n--- Chunked List Caching ---");
    let feed = cacher.cached_list("feed.items", |(user,): (u64,), skip, limit| async move {
        tokio::time::sleep(Duration::from_millis(40)).await;
        let page: Vec<String> = (skip..skip + limit)
            .map(|n| format!("item {n} for user {user}"))
            .collect();
        Ok(page)
    });

    info!(
        "Chunk keys for window (skip 0, limit 12): {:?}",
        feed.chunk_keys(&(42,), 0, 12)
    );

    let start = Instant::now();
    let window = feed.call((42,), 0, 12).await?;
    info!(
        "✗ Filled 3 chunks: {} items in {}ms",
        window.len(),
        start.elapsed().as_millis()
    );

    let start = Instant::now();
    let window = feed.call((42,), 4, 6).await?;
    info!(
        "✓ Overlapping window served from the same chunks: {} items in {}ms",
        window.len(),
        start.elapsed().as_millis()
    );

    info!("\n--- Batch Scope ---");
    for id in 1u64..=4 {
        profile.warm((id,)).await?;
    }

    let ctx = cacher.create_context();
    let scope = cacher.enter(&ctx)?;

    for id in 1u64..=4 {
        profile.register(&(id,))?;
    }
    info!("Queued keys: {:?}", ctx.keys());

    let fetched = ctx.fetch().await?;
    info!("One multi_get resolved {} keys", fetched.len());

    let gets_before = backend.stats().gets;
    for id in 1u64..=4 {
        let value = profile.call((id,)).await?;
        info!("  user {} -> '{}'", id, value);
    }
    info!(
        "Per-key reads during in-scope calls: {}",
        backend.stats().gets - gets_before
    );

    scope.exit().await?;

    info!("\n--- Hooks ---");
    cacher.add_hook(
        HookEvent::Invalidate,
        Arc::new(|key: &str, _: Option<&BatchContext>| {
            info!("  hook: invalidated '{}'", key);
        }),
    );

    profile.invalidate(&(42,)).await?;
    feed.invalidate(&(42,)).await?;

    info!("\n--- Backend Stats ---");
    let stats = backend.stats();
    info!(
        "gets: {}, sets: {}, deletes: {}, multi_gets: {}",
        stats.gets, stats.sets, stats.deletes, stats.multi_gets
    );

    let json = serde_json::to_string_pretty(cacher.config())?;
    info!("Active configuration:\n{}", json);

    info!("\n=== Demo Complete ===");

    Ok(())
}
