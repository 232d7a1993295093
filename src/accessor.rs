//! A read-through data-access façade backed by a [`Cache`].
//!
//! Query results are cached whole, keyed by the query string, and each
//! counts as one entry however many rows it holds.  Inserted items are
//! appended to the list cached under their table name.  Queries and table
//! names are opaque strings handed to the [`DataSource`] as-is.

use std::error::Error as StdError;

use crate::builder::CacheBuilder;
use crate::cache::Cache;
use crate::error::{Error, Result};

/// Number of query results cached by [`CachedAccessor::new`].
pub const DEFAULT_CACHE_SIZE: u64 = 5;

/// Storage the accessor reads from and writes to.
pub trait DataSource<T>: Send + Sync {
    type Error: StdError + Send + Sync + 'static;

    /// Runs `query` and returns every matching item.
    fn query(&self, query: &str) -> std::result::Result<Vec<T>, Self::Error>;

    /// Inserts `item` into `table`.  Returns `false` if nothing was inserted.
    fn insert(&self, table: &str, item: &T) -> std::result::Result<bool, Self::Error>;

    /// Deletes whatever `query` selects.
    fn delete(&self, query: &str) -> std::result::Result<(), Self::Error>;
}

fn source_error<E: StdError + Send + Sync + 'static>(err: E) -> Error {
    Error::Source(Box::new(err))
}

/// A [`DataSource`] with a cache of query results in front of it.
pub struct CachedAccessor<S, T> {
    source: S,
    cache: Cache<String, Vec<T>>,
}

impl<S, T> CachedAccessor<S, T>
where
    S: DataSource<T>,
    T: Clone + Send + Sync + 'static,
{
    /// Creates an accessor caching up to [`DEFAULT_CACHE_SIZE`] results.
    pub fn new(source: S) -> Result<Self> {
        Self::with_cache_size(source, DEFAULT_CACHE_SIZE)
    }

    /// Creates an accessor caching up to `cache_size` results.
    pub fn with_cache_size(source: S, cache_size: u64) -> Result<Self> {
        let cache = CacheBuilder::<String, Vec<T>>::new(cache_size)
            .sweeper_name("softcache-accessor-sweeper")
            .build()?;
        Ok(Self::with_cache(source, cache))
    }

    /// Creates an accessor around an existing cache.
    pub fn with_cache(source: S, cache: Cache<String, Vec<T>>) -> Self {
        CachedAccessor { source, cache }
    }

    /// Returns the items `query` selects.
    ///
    /// Served from the cache unless `force_update` is set or nothing is
    /// cached for `query`; fresh results are cached.
    pub fn get(&self, query: &str, force_update: bool) -> Result<Vec<T>> {
        let key = query.to_string();
        if !force_update {
            if let Some(cached) = self.cache.get(&key) {
                return Ok(cached.to_vec());
            }
        }

        let results = self.source.query(query).map_err(source_error)?;
        self.cache.put(key, results.clone())?;
        Ok(results)
    }

    /// Inserts `item` into `table`, then appends it to the list cached
    /// under `table`.
    pub fn put(&self, item: T, table: &str) -> Result<()> {
        let inserted = self.source.insert(table, &item).map_err(source_error)?;
        if !inserted {
            return Ok(());
        }
        match self.cache.append(table.to_string(), item) {
            Ok(_) => Ok(()),
            // Only reachable with a caller-supplied weigher.
            Err(Error::InvalidArgument(reason)) => {
                tracing::debug!(table, %reason, "dropping cached table list");
                self.cache.remove(&table.to_string());
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Deletes whatever `query` selects, then empties the whole cache.
    pub fn remove(&self, query: &str) -> Result<()> {
        self.source.delete(query).map_err(source_error)?;
        self.cache.remove_all();
        Ok(())
    }

    pub fn cache(&self) -> &Cache<String, Vec<T>> {
        &self.cache
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}
