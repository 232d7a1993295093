use std::hash::Hash;

use crate::cache::Cache;
use crate::error::{Error, Result};
use crate::list::ListCache;
use crate::listener::{EvictionCause, EvictionListener, FnListener};
use crate::store::Strong;
use crate::weigher::{FnWeigher, LenWeigher, UnitWeigher, Weigher};

const DEFAULT_SWEEPER_NAME: &str = "softcache-sweeper";

/// Builder for configuring and constructing a [`Cache`] or a [`ListCache`].
///
/// # Example
/// ```
/// use softcache::CacheBuilder;
///
/// let cache: softcache::Cache<String, String> = CacheBuilder::new(1_000)
///     .retain_capacity(100)
///     .build()
///     .unwrap();
/// # drop(cache);
/// ```
pub struct CacheBuilder<K, V> {
    max_size: u64,
    retain_capacity: Option<u64>,
    weigher: Box<dyn Weigher<K, V>>,
    listener: Option<Box<dyn EvictionListener<K, V>>>,
    sweeper_name: String,
}

impl<K: 'static, V: 'static> CacheBuilder<K, V> {
    /// `max_size` bounds the total weight of all entries.  It must be
    /// greater than 0; [`build`](Self::build) fails otherwise.
    pub fn new(max_size: u64) -> Self {
        CacheBuilder {
            max_size,
            retain_capacity: None,
            weigher: Box::new(UnitWeigher),
            listener: None,
            sweeper_name: DEFAULT_SWEEPER_NAME.to_string(),
        }
    }

    /// Number of distinct values kept strongly reachable by the cache itself
    /// (default: `max_size`).  Values beyond it that no caller holds are
    /// reclaimed even while the cache is under capacity.
    pub fn retain_capacity(mut self, n: u64) -> Self {
        self.retain_capacity = Some(n);
        self
    }

    /// Name of the reclamation sweeper thread.
    pub fn sweeper_name(mut self, name: impl Into<String>) -> Self {
        self.sweeper_name = name.into();
        self
    }

    /// Register an eviction listener closure.
    ///
    /// The closure is called after the cache lock is released each time an
    /// entry is removed (capacity, explicit removal, or reclamation).
    pub fn eviction_listener<F>(mut self, f: F) -> Self
    where
        F: Fn(&K, Option<Strong<V>>, EvictionCause) + Send + Sync + 'static,
    {
        self.listener = Some(Box::new(FnListener(f)));
        self
    }

    /// Register an eviction listener via the [`EvictionListener`] trait.
    pub fn eviction_listener_impl<L: EvictionListener<K, V>>(mut self, l: L) -> Self {
        self.listener = Some(Box::new(l));
        self
    }

    /// Set a custom entry weigher via closure.
    ///
    /// # Example
    /// ```
    /// use softcache::CacheBuilder;
    ///
    /// let cache: softcache::Cache<String, Vec<u8>> = CacheBuilder::new(4096)
    ///     .weigher(|_k: &String, v: &Vec<u8>| v.len() as u64 + 1)
    ///     .build()
    ///     .unwrap();
    /// # drop(cache);
    /// ```
    pub fn weigher<F>(mut self, f: F) -> Self
    where
        F: Fn(&K, &V) -> u64 + Send + Sync + 'static,
    {
        self.weigher = Box::new(FnWeigher(f));
        self
    }

    /// Set a weigher using any type that implements the [`Weigher`] trait.
    pub fn weigher_impl<W: Weigher<K, V>>(mut self, w: W) -> Self {
        self.weigher = Box::new(w);
        self
    }

    fn validate(&self) -> Result<u64> {
        if self.max_size == 0 {
            return Err(Error::invalid_argument("max_size must be greater than 0"));
        }
        let retain_capacity = self.retain_capacity.unwrap_or(self.max_size);
        if retain_capacity == 0 {
            return Err(Error::invalid_argument("retain_capacity must be greater than 0"));
        }
        Ok(retain_capacity)
    }
}

impl<K, V> CacheBuilder<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Builds the cache and starts its reclamation sweeper.
    pub fn build(self) -> Result<Cache<K, V>> {
        let retain_capacity = self.validate()?;
        Cache::with_parts(
            self.max_size,
            retain_capacity,
            self.weigher,
            self.listener,
            self.sweeper_name,
        )
    }
}

impl<K, E> CacheBuilder<K, Vec<E>>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Builds a list cache.  Entries weigh their element count; any weigher
    /// set on this builder is replaced.
    pub fn build_list(self) -> Result<ListCache<K, E>> {
        let retain_capacity = self.validate()?;
        let cache = Cache::with_parts(
            self.max_size,
            retain_capacity,
            Box::new(LenWeigher),
            self.listener,
            self.sweeper_name,
        )?;
        Ok(ListCache::from_cache(cache))
    }
}
