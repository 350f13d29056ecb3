//! Configuration for the cache coordination layer

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration shared by every cached function of a coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Expiry applied to stored values when the wrap site does not set one
    ///
    /// `None` leaves expiry entirely to the backing store.
    pub default_expires: Option<Duration>,

    /// Chunk size for list-result caching when the wrap site does not set one
    ///
    /// Every chunk of a list function covers exactly this many items, so
    /// changing it orphans previously written chunk keys.
    pub default_chunk_size: u64,

    /// How many leading list items `invalidate` covers
    ///
    /// Invalidation deletes the chunk keys spanning items `0..invalidation_span`.
    /// Chunks beyond the span are left behind and age out via expiry.
    pub invalidation_span: u64,

    /// Expiry jitter factor (0.0 - 1.0)
    ///
    /// Adds random variation to expiry so co-written chunks do not all lapse
    /// in the same instant.
    pub expiry_jitter: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            // Expiry is the store's concern unless a caller opts in
            default_expires: None,
            default_chunk_size: 10,
            invalidation_span: 1000,
            expiry_jitter: 0.0,
        }
    }
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.default_chunk_size == 0 {
            return Err("default_chunk_size must be greater than 0".to_string());
        }

        if self.invalidation_span == 0 {
            return Err("invalidation_span must be greater than 0".to_string());
        }

        if self.expiry_jitter < 0.0 || self.expiry_jitter > 1.0 {
            return Err("expiry_jitter must be between 0.0 and 1.0".to_string());
        }

        Ok(())
    }

    /// Resolve the expiry for one write: per-call override, else the default
    ///
    /// Jitter is applied to whichever is chosen.
    pub fn effective_expiry(&self, requested: Option<Duration>) -> Option<Duration> {
        requested
            .or(self.default_expires)
            .map(|base| self.expiry_with_jitter(base))
    }

    /// Apply the configured jitter to an expiry duration
    pub fn expiry_with_jitter(&self, base: Duration) -> Duration {
        if self.expiry_jitter == 0.0 {
            return base;
        }

        let base_secs = base.as_secs_f64();
        let jitter_range = base_secs * self.expiry_jitter;
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;
        let final_secs = (base_secs + jitter).max(1.0);

        Duration::from_secs_f64(final_secs)
    }
}

/// Builder for cache configuration
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    default_expires: Option<Duration>,
    default_chunk_size: Option<u64>,
    invalidation_span: Option<u64>,
    expiry_jitter: Option<f64>,
}

impl CacheConfigBuilder {
    /// Set the default expiry for stored values
    pub fn default_expires(mut self, expires: Duration) -> Self {
        self.default_expires = Some(expires);
        self
    }

    /// Set the default chunk size for list caching
    pub fn default_chunk_size(mut self, size: u64) -> Self {
        self.default_chunk_size = Some(size);
        self
    }

    /// Set how many leading list items invalidation covers
    pub fn invalidation_span(mut self, span: u64) -> Self {
        self.invalidation_span = Some(span);
        self
    }

    /// Set the expiry jitter factor (0.0 - 1.0)
    pub fn expiry_jitter(mut self, jitter: f64) -> Self {
        self.expiry_jitter = Some(jitter);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig {
        let defaults = CacheConfig::default();

        CacheConfig {
            default_expires: self.default_expires.or(defaults.default_expires),
            default_chunk_size: self
                .default_chunk_size
                .unwrap_or(defaults.default_chunk_size),
            invalidation_span: self.invalidation_span.unwrap_or(defaults.invalidation_span),
            expiry_jitter: self.expiry_jitter.unwrap_or(defaults.expiry_jitter),
        }
    }
}
