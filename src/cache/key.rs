//! Cache key derivation
//!
//! Keys are plain strings assembled from a function identity and its
//! rendered arguments. Chunked list functions append a window suffix to the
//! root key, one key per chunk.

use std::fmt::Display;

use crate::cache::range::RangePair;

/// Argument tuples that can be rendered into a cache key
///
/// Implemented for tuples of up to six `Display` values, plus the unit type
/// for zero-argument functions. Rendering must be deterministic: two argument
/// tuples that should share a cache entry must render identically, and ones
/// that should not must differ.
pub trait CacheArgs {
    /// Render each argument as a key fragment, in order
    fn key_parts(&self) -> Vec<String>;
}

impl CacheArgs for () {
    fn key_parts(&self) -> Vec<String> {
        Vec::new()
    }
}

macro_rules! impl_cache_args {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name: Display),+> CacheArgs for ($($name,)+) {
            fn key_parts(&self) -> Vec<String> {
                vec![$(self.$idx.to_string()),+]
            }
        }
    };
}

impl_cache_args!(A: 0);
impl_cache_args!(A: 0, B: 1);
impl_cache_args!(A: 0, B: 1, C: 2);
impl_cache_args!(A: 0, B: 1, C: 2, D: 3);
impl_cache_args!(A: 0, B: 1, C: 2, D: 3, E: 4);
impl_cache_args!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);

/// Derive the root cache key for an identity and argument tuple
///
/// Format is `identity:arg1:arg2`. A zero-argument call keeps the trailing
/// colon (`identity:`), so the zero-arg and one-empty-arg keys coincide only
/// when the one argument renders empty.
pub fn build_key<A: CacheArgs>(identity: &str, args: &A) -> String {
    format!("{}:{}", identity, args.key_parts().join(":"))
}

/// Append a chunk window suffix to a root key
pub fn build_chunk_key(root: &str, pair: RangePair) -> String {
    format!("{}{}", root, pair)
}
