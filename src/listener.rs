//! Eviction listener: a callback invoked whenever an entry leaves the cache.
//!
//! # Example
//! ```
//! use softcache::CacheBuilder;
//! use softcache::listener::EvictionCause;
//! use std::sync::{Arc, Mutex};
//!
//! let log: Arc<Mutex<Vec<(u64, EvictionCause)>>> = Arc::new(Mutex::new(Vec::new()));
//! let log2 = Arc::clone(&log);
//!
//! let cache: softcache::Cache<u64, u64> = CacheBuilder::new(2)
//!     .eviction_listener(move |key: &u64, _val, cause| {
//!         log2.lock().unwrap().push((*key, cause));
//!     })
//!     .build()
//!     .unwrap();
//!
//! cache.put(1, 10).unwrap();
//! cache.put(2, 20).unwrap();
//! cache.put(3, 30).unwrap(); // capacity eviction of 1
//! cache.remove(&2); // explicit removal
//! assert_eq!(
//!     *log.lock().unwrap(),
//!     vec![(1, EvictionCause::Capacity), (2, EvictionCause::Explicit)]
//! );
//! ```

use crate::store::Strong;

/// The reason an entry was removed from the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvictionCause {
    /// Removed because the cache exceeded its capacity and this entry was the
    /// least recently used.
    Capacity,
    /// Removed explicitly via [`Cache::remove`] or [`Cache::remove_all`].
    ///
    /// [`Cache::remove`]: crate::Cache::remove
    /// [`Cache::remove_all`]: crate::Cache::remove_all
    Explicit,
    /// Removed because its value was reclaimed.
    Reclaimed,
}

/// A callback invoked each time an entry is removed.
///
/// The callback receives the key, the value if it is still live, and the
/// reason for removal.  It runs after the cache lock has been released, on
/// the thread that caused the removal (a caller, or the sweeper for
/// reclamations), so it may call back into the cache.
pub trait EvictionListener<K, V>: Send + Sync + 'static {
    fn on_evict(&self, key: &K, value: Option<Strong<V>>, cause: EvictionCause);
}

/// An [`EvictionListener`] backed by a closure.
///
/// Created via [`CacheBuilder::eviction_listener`](crate::CacheBuilder::eviction_listener).
pub struct FnListener<F>(pub F);

impl<K, V, F> EvictionListener<K, V> for FnListener<F>
where
    F: Fn(&K, Option<Strong<V>>, EvictionCause) + Send + Sync + 'static,
{
    fn on_evict(&self, key: &K, value: Option<Strong<V>>, cause: EvictionCause) {
        (self.0)(key, value, cause)
    }
}
