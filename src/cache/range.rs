//! Window partitioning for chunked list caching
//!
//! A list request `(skip, limit)` is mapped onto fixed-size windows aligned
//! to multiples of the chunk size, so that overlapping requests land on the
//! same cache keys.

use std::fmt;

/// One aligned chunk window
///
/// `start..=end` bounds the item span the chunk covers, in the convention
/// used by chunk cache keys: every window ends on a multiple of the chunk
/// size, and every window except the one at the origin starts one past the
/// previous multiple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RangePair {
    /// First item ordinal covered by the chunk
    pub start: u64,
    /// Last item ordinal covered by the chunk
    pub end: u64,
}

impl RangePair {
    /// Create a new range pair
    ///
    /// Bounds must satisfy `start <= end`.
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end, "range pair start {start} must not exceed end {end}");
        Self { start, end }
    }

    /// Span between the window bounds
    pub fn width(&self) -> u64 {
        self.end - self.start
    }
}

impl fmt::Display for RangePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}]", self.start, self.end)
    }
}

/// Partition a `(skip, limit)` request into aligned chunk windows
///
/// Windows step by `chunk_size` from the aligned floor of `skip` up to the
/// aligned ceiling of `skip + limit`. The window at the origin keeps start 0;
/// every other window starts one past its aligned lower bound. A zero `limit`
/// or zero `chunk_size` yields no windows, as does a request whose aligned
/// ceiling would overflow `u64`.
///
/// ```
/// use memobatch::{partition, RangePair};
///
/// assert_eq!(
///     partition(5, 0, 15),
///     vec![
///         RangePair::new(0, 5),
///         RangePair::new(6, 10),
///         RangePair::new(11, 15),
///     ],
/// );
/// ```
pub fn partition(chunk_size: u64, skip: u64, limit: u64) -> Vec<RangePair> {
    if limit == 0 || chunk_size == 0 {
        return Vec::new();
    }

    let upper = match skip.checked_add(limit) {
        Some(upper) => upper,
        None => return Vec::new(),
    };
    let ceiling = match upper.div_ceil(chunk_size).checked_mul(chunk_size) {
        Some(ceiling) => ceiling,
        None => return Vec::new(),
    };
    let skip_floor = chunk_size * (skip / chunk_size);

    let mut pairs = Vec::with_capacity(((ceiling - skip_floor) / chunk_size) as usize);
    let mut lower = skip_floor;
    while lower < ceiling {
        let start = if lower == 0 { 0 } else { lower + 1 };
        pairs.push(RangePair::new(start, lower + chunk_size));
        lower += chunk_size;
    }

    pairs
}
