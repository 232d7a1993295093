use std::hash::Hash;

use crate::builder::CacheBuilder;
use crate::cache::Cache;
use crate::error::Result;
use crate::listener::EvictionCause;
use crate::metrics::stats::Metrics;
use crate::policy::Policy;
use crate::store::Strong;

/// A cache whose values are lists, weighed by element count.
///
/// `max_size` bounds the total number of elements across all cached lists.
/// Besides whole-list operations it can append a single element to the
/// list under a key, and remove a single element from whichever list holds
/// it.
///
/// Lists are copy-on-write: single-element operations store a new list,
/// and [`Strong`] handles obtained earlier keep seeing the old one.
///
/// # Example
/// ```
/// use softcache::ListCache;
///
/// let cache: ListCache<&str, u32> = ListCache::new(3).unwrap();
/// cache.put_single("k", 1).unwrap();
/// cache.put_single("k", 2).unwrap();
/// assert_eq!(cache.get(&"k").as_deref(), Some(&vec![1, 2]));
/// assert_eq!(cache.size(), 2);
///
/// assert!(cache.remove_single(&1));
/// assert_eq!(cache.size(), 1);
/// ```
pub struct ListCache<K, E> {
    cache: Cache<K, Vec<E>>,
}

impl<K, E> Clone for ListCache<K, E> {
    fn clone(&self) -> Self {
        ListCache {
            cache: self.cache.clone(),
        }
    }
}

impl<K, E> ListCache<K, E>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Creates a list cache holding at most `max_size` elements in total.
    /// Fails if `max_size` is 0.
    pub fn new(max_size: u64) -> Result<Self> {
        CacheBuilder::new(max_size).build_list()
    }

    pub(crate) fn from_cache(cache: Cache<K, Vec<E>>) -> Self {
        ListCache { cache }
    }

    /// Returns the list for `key` if it is present and not reclaimed.
    pub fn get(&self, key: &K) -> Option<Strong<Vec<E>>> {
        self.cache.get(key)
    }

    /// Stores `list` under `key`, replacing any previous list.
    ///
    /// The replaced list's length is given back before anything is evicted,
    /// so replacing a key never evicts that key.  Fails with
    /// [`Error::InvalidArgument`](crate::Error::InvalidArgument) if the list
    /// alone is longer than [`max_size`](Self::max_size).
    pub fn put(&self, key: K, list: Vec<E>) -> Result<Strong<Vec<E>>> {
        self.cache.put(key, list)
    }

    /// Removes the list under `key`.
    pub fn remove(&self, key: &K) -> bool {
        self.cache.remove(key)
    }

    pub fn remove_all(&self) {
        self.cache.remove_all()
    }

    /// Total number of elements across all lists.
    pub fn size(&self) -> u64 {
        self.cache.size()
    }

    pub fn max_size(&self) -> u64 {
        self.cache.max_size()
    }

    /// Number of cached lists.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.cache.contains(key)
    }

    /// Keys in recency order, least recently used first.
    pub fn keys(&self) -> Vec<K> {
        self.cache.keys()
    }

    pub fn trim_memory(&self) -> usize {
        self.cache.trim_memory()
    }

    pub fn stats(&self) -> Metrics {
        self.cache.stats()
    }

    pub fn validate(&self) -> Result<()> {
        self.cache.validate()
    }
}

impl<K, E> ListCache<K, E>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Appends `element` to the list under `key`, creating the list if the
    /// key is absent or its list was reclaimed.
    ///
    /// Behaves like [`put`](Self::put) with the extended list: the key moves
    /// to the most recently used end and other lists may be evicted.
    pub fn put_single(&self, key: K, element: E) -> Result<Strong<Vec<E>>> {
        self.cache.append(key, element)
    }
}

impl<K, E> ListCache<K, E>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    E: Clone + PartialEq + Send + Sync + 'static,
{
    /// Removes the first occurrence of `element` from the first list that
    /// contains it, scanning lists from the most to the least recently used.
    ///
    /// Only that one list changes, its size drops by exactly one, and its
    /// recency position stays put.  Returns `false` if no list holds the
    /// element.
    pub fn remove_single(&self, element: &E) -> bool {
        self.cache.with_state(|inner, state, deferred| {
            let mut stale = Vec::new();
            let mut found = None;
            for key in state.order.iter_newest() {
                let Some(boxed) = state.map.get(key) else {
                    continue;
                };
                match boxed.try_get() {
                    Some(list) => {
                        if let Some(pos) = list.iter().position(|e| e == element) {
                            found = Some((key.clone(), pos, list));
                            break;
                        }
                    }
                    None => stale.push(key.clone()),
                }
            }

            for key in stale {
                inner.detach(state, &key);
                deferred.removed.push((key, None, EvictionCause::Reclaimed));
            }

            let Some((key, pos, list)) = found else {
                return false;
            };
            let mut shrunk = list.to_vec();
            shrunk.remove(pos);
            let weight = inner.weigher.weigh(&key, &shrunk);

            let (boxed, strong) = inner.new_box(state, key.clone(), shrunk);
            let id = boxed.id();
            if let Some(old) = state.map.insert(key.clone(), boxed) {
                deferred.released.extend(state.retainer.release(old.id()));
            }
            state.order.reweigh(&key, weight);
            match state.retainer.retain(id, strong) {
                Ok(released) => deferred.released.extend(released),
                Err(err) => tracing::warn!(%err, id, "failed to retain shrunk list"),
            }
            deferred.released.push(list);
            true
        })
    }
}
