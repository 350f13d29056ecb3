//! # Chunked Memoization Layer
//!
//! This module implements the caching half of the crate: derived string keys,
//! single-value memoization, and chunked list memoization over a shared
//! [`Backend`](crate::backend::Backend).
//!
//! ## Features
//!
//! - **Derived Keys**: Stable `identity:arg1:arg2` keys built from call arguments
//! - **Single-Value Caching**: Read-through memoization with optional expiry
//! - **Chunked Lists**: Fixed-size, boundary-aligned chunks shared across windows
//! - **Range Partitioning**: Maps any `(skip, limit)` window onto chunk labels
//! - **Early Termination**: A short chunk ends the fill without probing further
//! - **Span Invalidation**: One call clears every chunk in a fixed leading window
//!
//! ## Example
//!
//! ```rust
//! use memobatch::{Cacher, MemoryBackend};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let cacher = Cacher::new(Arc::new(MemoryBackend::new()));
//!
//! let profile = cacher.cached("users.profile", |(id,): (u64,)| async move {
//!     Ok(format!("user-{id}"))
//! });
//!
//! // First call hits the source, second resolves from the store.
//! let fetched = profile.call((42,)).await?;
//! let cached = profile.call((42,)).await?;
//! assert_eq!(fetched, cached);
//!
//! # Ok(())
//! # }
//! ```

pub mod chunked;
pub mod config;
pub mod key;
pub mod range;
pub mod single;

pub use chunked::CachedListFn;
pub use config::{CacheConfig, CacheConfigBuilder};
pub use key::{build_chunk_key, build_key, CacheArgs};
pub use range::{partition, RangePair};
pub use single::CachedFn;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{CacheError, Result};

/// Serialize a value into its stored string form.
pub(crate) fn encode_value<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| CacheError::Serialization(e.to_string()))
}

/// Deserialize a stored string back into a typed value.
pub(crate) fn decode_value<T: DeserializeOwned>(raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| CacheError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_round_trip() {
        let encoded = encode_value(&vec![1u64, 2, 3]).unwrap();
        let decoded: Vec<u64> = decode_value(&encoded).unwrap();
        assert_eq!(decoded, vec![1, 2, 3]);
    }

    #[test]
    fn test_decode_rejects_mismatched_shape() {
        let encoded = encode_value(&"plain string").unwrap();
        let decoded: Result<Vec<u64>> = decode_value(&encoded);
        assert!(matches!(decoded, Err(CacheError::Serialization(_))));
    }
}
