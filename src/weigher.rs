//! Entry weigher: assigns a cost (weight) to each cached entry.
//!
//! The cache enforces `Σ weight(entry) ≤ max_size`.  By default every entry
//! costs 1 unit ([`UnitWeigher`]), so `max_size` is simply the maximum
//! number of entries.  List caches use [`LenWeigher`], so `max_size` bounds
//! the total number of elements across all cached lists.
//!
//! # Example
//! ```
//! use softcache::CacheBuilder;
//!
//! // Cap at ~1 KiB of payload (keys are not counted).
//! let cache: softcache::Cache<String, Vec<u8>> = CacheBuilder::new(1024)
//!     .weigher(|_key: &String, val: &Vec<u8>| val.len() as u64)
//!     .build()
//!     .unwrap();
//! # drop(cache);
//! ```

/// Computes the cost of a cache entry.
///
/// A weight of 0 is allowed (an empty list costs nothing); a weight above
/// the cache capacity makes the insertion fail.
pub trait Weigher<K, V>: Send + Sync + 'static {
    fn weigh(&self, key: &K, value: &V) -> u64;
}

/// Every entry costs exactly 1 unit.  This is the default weigher.
pub struct UnitWeigher;

impl<K, V> Weigher<K, V> for UnitWeigher {
    #[inline]
    fn weigh(&self, _key: &K, _value: &V) -> u64 {
        1
    }
}

/// A list entry costs one unit per element.
pub struct LenWeigher;

impl<K, E> Weigher<K, Vec<E>> for LenWeigher {
    #[inline]
    fn weigh(&self, _key: &K, value: &Vec<E>) -> u64 {
        value.len() as u64
    }
}

/// A weigher backed by a closure.
///
/// Created via [`CacheBuilder::weigher`](crate::CacheBuilder::weigher).
pub struct FnWeigher<F>(pub F);

impl<K, V, F> Weigher<K, V> for FnWeigher<F>
where
    F: Fn(&K, &V) -> u64 + Send + Sync + 'static,
{
    #[inline]
    fn weigh(&self, key: &K, value: &V) -> u64 {
        (self.0)(key, value)
    }
}
