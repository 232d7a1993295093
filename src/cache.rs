use std::hash::Hash;
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::builder::CacheBuilder;
use crate::error::{Error, Result};
use crate::listener::{EvictionCause, EvictionListener};
use crate::metrics::stats::{Metrics, StatsCounter};
use crate::policy::lru::LruPolicy;
use crate::policy::Policy;
use crate::reclaim::{ReclaimTarget, SoftRetainer, Sweeper};
use crate::store::{Reclaimed, Strong, WeakValueBox};
use crate::weigher::Weigher;

// ---------------------------------------------------------------------------
// Cache interior
// ---------------------------------------------------------------------------

/// Everything guarded by the per-instance lock.
pub(crate) struct State<K, V> {
    /// Backing map.  Values are held weakly.
    pub(crate) map: AHashMap<K, WeakValueBox<K, V>>,
    /// Recency order and weight accounting; mirrors the keys of `map`.
    pub(crate) order: LruPolicy<K>,
    pub(crate) retainer: SoftRetainer<V>,
    next_id: u64,
}

/// Work collected under the lock and finished after it is released.
pub(crate) struct Deferred<K, V> {
    pub(crate) removed: Vec<(K, Option<Strong<V>>, EvictionCause)>,
    pub(crate) released: Vec<Strong<V>>,
}

impl<K, V> Deferred<K, V> {
    pub(crate) fn new() -> Self {
        Deferred {
            removed: Vec::new(),
            released: Vec::new(),
        }
    }
}

/// Shared interior of a [`Cache`].
pub(crate) struct Inner<K, V> {
    pub(crate) state: Mutex<State<K, V>>,
    pub(crate) weigher: Box<dyn Weigher<K, V>>,
    pub(crate) listener: Option<Box<dyn EvictionListener<K, V>>>,
    /// Every stored value is registered with this queue.
    queue: flume::Sender<Reclaimed<K>>,
    pub(crate) max_size: u64,
    pub(crate) metrics: StatsCounter,
}

impl<K, V> Inner<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Fails if `weight` alone can never fit.
    pub(crate) fn check_weight(&self, weight: u64) -> Result<()> {
        if weight > self.max_size {
            return Err(Error::invalid_argument(format!(
                "item weight {weight} exceeds max_size {}",
                self.max_size
            )));
        }
        Ok(())
    }

    /// Wraps `value` in a fresh weak box registered with the reclamation queue.
    pub(crate) fn new_box(
        &self,
        state: &mut State<K, V>,
        key: K,
        value: V,
    ) -> (WeakValueBox<K, V>, Strong<V>) {
        let id = state.next_id;
        state.next_id += 1;
        WeakValueBox::new(key, id, value, &self.queue)
    }

    /// Files `value` under `key`, evicting least recently used entries until
    /// the new weight fits.
    pub(crate) fn store(
        &self,
        state: &mut State<K, V>,
        key: K,
        value: V,
        weight: u64,
        deferred: &mut Deferred<K, V>,
    ) -> Result<Strong<V>> {
        let (boxed, strong) = self.new_box(state, key.clone(), value);
        let id = boxed.id();

        let victims = state.order.on_insert(key.clone(), weight)?;
        if let Some(old) = state.map.insert(key, boxed) {
            deferred.released.extend(state.retainer.release(old.id()));
        }
        // Finish the insertion even if a victim turns out to be unknown to
        // the map, so both structures agree again before reporting it.
        let mut missing = 0usize;
        for victim in victims {
            match state.map.remove(&victim) {
                Some(old) => {
                    let value = state.retainer.release(old.id()).or_else(|| old.try_get());
                    deferred.removed.push((victim, value, EvictionCause::Capacity));
                }
                None => missing += 1,
            }
        }
        deferred
            .released
            .extend(state.retainer.retain(id, strong.clone())?);
        if missing > 0 {
            return Err(Error::consistency(format!(
                "{missing} evicted key(s) missing from the backing map"
            )));
        }
        Ok(strong)
    }

    /// Returns the live value under `key`, promoting it.  A reclaimed value
    /// is dropped from both structures and reported as absent.
    pub(crate) fn lookup(
        &self,
        state: &mut State<K, V>,
        key: &K,
        deferred: &mut Deferred<K, V>,
    ) -> Option<Strong<V>> {
        let boxed = state.map.get(key)?;
        let id = boxed.id();
        match boxed.try_get() {
            Some(value) => {
                state.order.on_access(key);
                match state.retainer.retain(id, value.clone()) {
                    Ok(released) => deferred.released.extend(released),
                    Err(err) => tracing::warn!(%err, id, "failed to retain looked-up value"),
                }
                Some(value)
            }
            None => {
                self.detach(state, key);
                deferred.removed.push((key.clone(), None, EvictionCause::Reclaimed));
                None
            }
        }
    }

    /// Drops `key` from the backing map, the recency order and the retainer.
    ///
    /// Returns the value if it is still live.
    pub(crate) fn detach(&self, state: &mut State<K, V>, key: &K) -> Option<Option<Strong<V>>> {
        let boxed = state.map.remove(key)?;
        state.order.on_remove(key);
        Some(state.retainer.release(boxed.id()).or_else(|| boxed.try_get()))
    }

    /// Fires the listener and records metrics for the removals collected
    /// under the lock, then drops released handles.
    pub(crate) fn dispatch(&self, deferred: Deferred<K, V>) {
        let Deferred { removed, released } = deferred;
        let count = |wanted: EvictionCause| {
            removed.iter().filter(|(_, _, cause)| *cause == wanted).count() as u64
        };
        let evicted = count(EvictionCause::Capacity);
        let reclaimed = count(EvictionCause::Reclaimed);
        if evicted > 0 {
            tracing::trace!(evicted, "capacity eviction");
            self.metrics.record_evictions(evicted);
        }
        self.metrics.record_reclaimed(reclaimed);
        for (key, value, cause) in removed {
            if let Some(listener) = &self.listener {
                listener.on_evict(&key, value, cause);
            }
        }
        drop(released);
    }
}

impl<K, V> ReclaimTarget<K> for Inner<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn reclaim(&self, notice: Reclaimed<K>) {
        let mut deferred = Deferred::new();
        {
            let mut state = self.state.lock();
            let current = state.map.get(&notice.key).map(|b| b.id());
            if current == Some(notice.id) {
                self.detach(&mut state, &notice.key);
                tracing::trace!(id = notice.id, "dropped entry of reclaimed value");
                deferred
                    .removed
                    .push((notice.key, None, EvictionCause::Reclaimed));
            }
        }
        self.dispatch(deferred);
    }
}

// ---------------------------------------------------------------------------
// Cache handle
// ---------------------------------------------------------------------------

/// A thread-safe, bounded, least-recently-used cache whose values may be
/// reclaimed before the capacity limit is reached.
///
/// The backing map holds values weakly.  A [`SoftRetainer`] keeps the most
/// recently used values alive; values it lets go of, and that no caller
/// holds a [`Strong`] handle to, are reclaimed.  A background sweeper then
/// drops their entries.  Lookups never return a reclaimed value.
///
/// Every operation takes the same per-instance lock for its full duration.
///
/// # Example
/// ```
/// use softcache::Cache;
///
/// let cache: Cache<String, String> = Cache::new(100).unwrap();
/// cache.put("hello".to_string(), "world".to_string()).unwrap();
/// assert_eq!(cache.get(&"hello".to_string()).as_deref(), Some(&"world".to_string()));
/// ```
pub struct Cache<K, V> {
    pub(crate) inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for Cache<K, V> {
    fn clone(&self) -> Self {
        Cache {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> Cache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Creates a cache holding at most `max_size` units of weight, one unit
    /// per entry.  Fails if `max_size` is 0.
    pub fn new(max_size: u64) -> Result<Self> {
        CacheBuilder::new(max_size).build()
    }

    /// Returns a [`CacheBuilder`] for constructing a new cache.
    pub fn builder(max_size: u64) -> CacheBuilder<K, V> {
        CacheBuilder::new(max_size)
    }

    pub(crate) fn with_parts(
        max_size: u64,
        retain_capacity: u64,
        weigher: Box<dyn Weigher<K, V>>,
        listener: Option<Box<dyn EvictionListener<K, V>>>,
        sweeper_name: String,
    ) -> Result<Self> {
        let (tx, rx) = flume::unbounded();
        let inner = Arc::new(Inner {
            state: Mutex::new(State {
                map: AHashMap::new(),
                order: LruPolicy::new(max_size),
                retainer: SoftRetainer::new(retain_capacity),
                next_id: 0,
            }),
            weigher,
            listener,
            queue: tx,
            max_size,
            metrics: StatsCounter::default(),
        });
        Sweeper::new(rx, Arc::downgrade(&inner)).spawn(sweeper_name)?;
        tracing::debug!(max_size, retain_capacity, "cache created");
        Ok(Cache { inner })
    }

    /// Runs `f` under the cache lock and finishes its deferred work after.
    pub(crate) fn with_state<R>(
        &self,
        f: impl FnOnce(&Inner<K, V>, &mut State<K, V>, &mut Deferred<K, V>) -> R,
    ) -> R {
        let mut deferred = Deferred::new();
        let result = {
            let mut state = self.inner.state.lock();
            f(&self.inner, &mut state, &mut deferred)
        };
        self.inner.dispatch(deferred);
        result
    }

    // -----------------------------------------------------------------------
    // Core operations
    // -----------------------------------------------------------------------

    /// Returns the value for `key` if it is present and not reclaimed.
    ///
    /// A hit moves `key` to the most recently used end.
    pub fn get(&self, key: &K) -> Option<Strong<V>> {
        let value = self.with_state(|inner, state, deferred| inner.lookup(state, key, deferred));
        self.inner.metrics.record_lookup(value.is_some());
        value
    }

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// Evicts least recently used entries until the new entry fits.  Fails
    /// with [`Error::InvalidArgument`] if the entry's own weight exceeds
    /// [`max_size`](Self::max_size); the cache is left unchanged.
    ///
    /// Returns a strong handle to the stored value.
    pub fn put(&self, key: K, value: V) -> Result<Strong<V>> {
        let weight = self.inner.weigher.weigh(&key, &value);
        self.inner.check_weight(weight)?;
        self.with_state(|inner, state, deferred| inner.store(state, key, value, weight, deferred))
    }

    /// Removes the entry for `key`.  Returns `false` if there was none.
    pub fn remove(&self, key: &K) -> bool {
        self.with_state(|inner, state, deferred| match inner.detach(state, key) {
            Some(value) => {
                deferred
                    .removed
                    .push((key.clone(), value, EvictionCause::Explicit));
                true
            }
            None => false,
        })
    }

    /// Removes all entries.
    pub fn remove_all(&self) {
        self.with_state(|_, state, deferred| {
            deferred.released.extend(state.retainer.release_all());
            for (key, boxed) in state.map.drain() {
                let value = boxed.try_get();
                deferred.removed.push((key, value, EvictionCause::Explicit));
            }
            state.order.clear();
        })
    }

    /// Releases every value kept alive by the retainer, as under memory
    /// pressure.  Values no caller holds are reclaimed and their entries are
    /// dropped by the sweeper.  Returns the number of released values.
    pub fn trim_memory(&self) -> usize {
        let released = self.inner.state.lock().retainer.release_all();
        let count = released.len();
        tracing::debug!(count, "released soft-retained values");
        drop(released);
        count
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Current total weight of all entries.
    pub fn size(&self) -> u64 {
        self.inner.state.lock().order.current_weight()
    }

    /// Maximum total weight.
    pub fn max_size(&self) -> u64 {
        self.inner.max_size
    }

    /// Number of entries, including entries whose value was reclaimed but
    /// not dropped yet.
    pub fn len(&self) -> usize {
        self.inner.state.lock().map.len()
    }

    /// Returns `true` if no entry, live or reclaimed, is present.
    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().map.is_empty()
    }

    /// Returns `true` if `key` holds a live value.  Does not change recency.
    pub fn contains(&self, key: &K) -> bool {
        self.inner
            .state
            .lock()
            .map
            .get(key)
            .is_some_and(|b| !b.is_collected())
    }

    /// Keys in recency order, least recently used (next victim) first.
    pub fn keys(&self) -> Vec<K> {
        self.inner.state.lock().order.iter_oldest().cloned().collect()
    }

    /// Snapshot of the lookup, eviction and reclamation counters.
    pub fn stats(&self) -> Metrics {
        self.inner.metrics.snapshot()
    }

    /// Checks that the backing map and the recency order agree.
    pub fn validate(&self) -> Result<()> {
        let state = self.inner.state.lock();
        if state.map.len() != state.order.len() {
            return Err(Error::consistency(format!(
                "backing map holds {} keys, recency order {}",
                state.map.len(),
                state.order.len()
            )));
        }
        if state.order.iter_oldest().any(|k| !state.map.contains_key(k)) {
            return Err(Error::consistency("recency order holds a key the backing map lacks"));
        }
        if state.order.current_weight() > self.inner.max_size {
            return Err(Error::consistency(format!(
                "weight {} exceeds max_size {}",
                state.order.current_weight(),
                self.inner.max_size
            )));
        }
        Ok(())
    }
}

impl<K, E> Cache<K, Vec<E>>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Appends `element` to the list under `key` within one lock hold,
    /// starting a new list if the key is absent or its list was reclaimed.
    pub(crate) fn append(&self, key: K, element: E) -> Result<Strong<Vec<E>>> {
        self.with_state(|inner, state, deferred| {
            let mut list = state
                .map
                .get(&key)
                .and_then(|b| b.try_get())
                .map(|existing| existing.to_vec())
                .unwrap_or_default();
            list.push(element);
            let weight = inner.weigher.weigh(&key, &list);
            inner.check_weight(weight)?;
            inner.store(state, key, list, weight, deferred)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        cond()
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = Cache::<u32, u32>::new(0).err().unwrap();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn get_places_key_at_tail() {
        let cache: Cache<&str, &str> = Cache::new(2).unwrap();
        cache.put("first", "first value").unwrap();
        cache.put("second", "second value").unwrap();
        assert_eq!(cache.keys(), vec!["first", "second"]);

        cache.get(&"first");
        assert_eq!(cache.keys(), vec!["second", "first"]);
    }

    #[test]
    fn duplicate_put_keeps_one_key() {
        let cache: Cache<&str, &str> = Cache::new(2).unwrap();
        cache.put("key", "value").unwrap();
        cache.put("key", "value").unwrap();
        assert_eq!(cache.keys(), vec!["key"]);
        assert_eq!(cache.size(), 1);
        cache.validate().unwrap();
    }

    #[test]
    fn replacing_oldest_key_does_not_evict_others() {
        let cache: Cache<&str, u32> = Cache::new(2).unwrap();
        cache.put("a", 1).unwrap();
        cache.put("b", 2).unwrap();
        cache.put("a", 3).unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.keys(), vec!["b", "a"]);
        assert_eq!(cache.get(&"a").as_deref(), Some(&3));
    }

    #[test]
    fn oversized_put_leaves_state_unchanged() {
        let cache: Cache<&str, Vec<u8>> = Cache::builder(3)
            .weigher(|_k: &&str, v: &Vec<u8>| v.len() as u64)
            .build()
            .unwrap();
        cache.put("small", vec![1]).unwrap();
        let err = cache.put("big", vec![0; 4]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(cache.keys(), vec!["small"]);
        assert_eq!(cache.size(), 1);
    }

    #[test_log::test]
    fn unknown_victim_leaves_structures_in_agreement() {
        let cache: Cache<&str, u32> = Cache::new(2).unwrap();
        // Tracked by the order, absent from the map.
        cache.with_state(|_, state, _| state.order.on_insert("ghost", 1).unwrap());
        cache.put("a", 1).unwrap();

        let err = cache.put("b", 2).unwrap_err();
        assert!(matches!(err, Error::ConsistencyViolation(_)));
        cache.validate().unwrap();
        assert_eq!(cache.keys(), vec!["a", "b"]);
        assert_eq!(cache.get(&"b").as_deref(), Some(&2));
    }

    #[test_log::test]
    fn reclaimed_value_is_dropped_on_lookup() {
        let cache: Cache<&str, String> = Cache::new(4).unwrap();
        cache.put("a", "x".to_string()).unwrap();

        // Nobody but the retainer holds the value; trimming reclaims it.
        assert_eq!(cache.trim_memory(), 1);
        assert!(cache.get(&"a").is_none());
        assert!(cache.keys().is_empty());
        assert_eq!(cache.size(), 0);
        cache.validate().unwrap();
    }

    #[test_log::test]
    fn sweeper_drops_reclaimed_entry() {
        let cache: Cache<&str, String> = Cache::new(4).unwrap();
        cache.put("a", "x".to_string()).unwrap();
        let held = cache.put("b", "y".to_string()).unwrap();

        cache.trim_memory();
        assert!(wait_until(|| cache.keys() == vec!["b"]));
        assert_eq!(cache.size(), 1);
        assert_eq!(cache.get(&"b").as_deref(), Some(&"y".to_string()));
        assert!(wait_until(|| cache.stats().reclaimed == 1));
        drop(held);
    }

    #[test_log::test]
    fn late_notice_does_not_drop_replacement() {
        let cache: Cache<&str, u32> = Cache::new(4).unwrap();
        let old = cache.put("k", 1).unwrap();
        let current = cache.put("k", 2).unwrap();
        // The first value is reclaimed only now; its notice names a stale id.
        drop(old);

        // Notices are swept in order: once "marker" is gone the stale notice
        // has been handled too.
        cache.put("marker", 0).unwrap();
        cache.trim_memory();
        assert!(wait_until(|| !cache.keys().contains(&"marker")));
        assert_eq!(cache.keys(), vec!["k"]);
        assert_eq!(cache.get(&"k").as_deref(), Some(&2));
        drop(current);
    }

    #[test]
    fn retain_capacity_bounds_live_values() {
        let cache: Cache<u32, u32> = Cache::builder(10).retain_capacity(2).build().unwrap();
        for i in 0..4 {
            cache.put(i, i).unwrap();
        }
        // Only the two most recent values are still reachable.
        assert!(cache.get(&0).is_none());
        assert!(cache.get(&1).is_none());
        assert_eq!(cache.get(&2).as_deref(), Some(&2));
        assert_eq!(cache.get(&3).as_deref(), Some(&3));
    }

    #[test]
    fn caller_handle_keeps_value_alive() {
        let cache: Cache<u32, String> = Cache::new(4).unwrap();
        let held = cache.put(1, "one".to_string()).unwrap();
        cache.trim_memory();
        let again = cache.get(&1).unwrap();
        assert!(Strong::ptr_eq(&held, &again));
    }
}
