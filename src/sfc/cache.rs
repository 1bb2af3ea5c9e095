//! Process-wide bounded cache for range decomposition results.
//!
//! Decomposing a query box into ranges is the most CPU-intensive operation
//! in the engine and the tiered strategy (see [`crate::strategy`]) calls it
//! once per active tier per query; the same `(curve identity, query box,
//! flags)` key recurs constantly under a steady query workload, so results
//! are cached behind a small `quick_cache::sync::Cache` the way `lsm-tree`
//! caches its own decoded blocks.

use std::sync::OnceLock;

use quick_cache::sync::Cache;

use crate::sfc::range::RangeDecomposition;

const CACHE_CAPACITY: usize = 500;

/// `(curve identity hash, query box bit pattern, max_ranges, over_inclusive_on_edge)`.
pub type CacheKey = (u64, Vec<u64>, usize, bool);

fn cache() -> &'static Cache<CacheKey, RangeDecomposition> {
    static CACHE: OnceLock<Cache<CacheKey, RangeDecomposition>> = OnceLock::new();
    CACHE.get_or_init(|| Cache::new(CACHE_CAPACITY))
}

/// Build a cache key from a query box's bit patterns so it can be hashed and
/// compared without relying on `f64: Eq`.
pub fn key_for(curve_identity: u64, query: &[(f64, f64)], max_ranges: usize, over_inclusive_on_edge: bool) -> CacheKey {
    let mut bits = Vec::with_capacity(query.len() * 2);
    for &(lo, hi) in query {
        bits.push(lo.to_bits());
        bits.push(hi.to_bits());
    }
    (curve_identity, bits, max_ranges, over_inclusive_on_edge)
}

/// Return the cached decomposition for `key`, or compute it with `f`, cache
/// it, and return it.
pub fn get_or_compute(key: CacheKey, f: impl FnOnce() -> RangeDecomposition) -> RangeDecomposition {
    if let Some(hit) = cache().get(&key) {
        return hit;
    }
    let value = f();
    cache().insert(key.clone(), value.clone());
    value
}

/// Clear the cache. Exists for tests, which otherwise leak decomposition
/// results across cases that reuse curve identities.
#[cfg(test)]
pub fn reset() {
    cache().clear();
}
