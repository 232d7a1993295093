pub mod lru;

use std::hash::Hash;

use crate::error::Result;

/// Recency bookkeeping that decides which keys to evict.
///
/// All methods are called with the owning cache's lock held.  Implementors
/// only need to be `Send`; `Sync` is not required because the cache wraps
/// the policy in a `Mutex`.
pub trait Policy<K: Hash + Eq>: Send {
    /// Called when an existing entry is read.  Moves it to the most recent end.
    fn on_access(&mut self, key: &K);

    /// Called when an entry is inserted or replaced.
    ///
    /// A replaced key gives back its old weight before any victim is chosen,
    /// and is never chosen itself.  Returns the keys that were evicted to
    /// stay within capacity, oldest first.
    fn on_insert(&mut self, key: K, weight: u64) -> Result<Vec<K>>;

    /// Changes the weight of a tracked key without touching its recency.
    ///
    /// Returns the previous weight, or `None` if the key is not tracked.
    fn reweigh(&mut self, key: &K, weight: u64) -> Option<u64>;

    /// Called when an entry is removed.  Returns the weight it carried.
    fn on_remove(&mut self, key: &K) -> Option<u64>;

    /// Forgets every key.
    fn clear(&mut self);

    /// Total weight currently tracked by the policy.
    fn current_weight(&self) -> u64;

    /// Maximum weight allowed.
    fn max_weight(&self) -> u64;

    /// Number of tracked keys.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
