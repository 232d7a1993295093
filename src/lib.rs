//! Bounded, thread-safe LRU caches whose values may be reclaimed under
//! memory pressure before the capacity limit is reached.
//!
//! * [`Cache`] maps keys to single values, weighed by a [`weigher`].
//! * [`ListCache`] maps keys to lists and bounds the total element count.
//! * [`CachedAccessor`] caches query results from a [`DataSource`].
//!
//! Values are handed out as [`Strong`] handles.  The cache itself only
//! keeps the most recently used values alive; a background sweeper drops
//! the entries of values that were reclaimed.

mod builder;
mod cache;
mod error;
mod list;
mod metrics;
pub mod accessor;
pub mod listener;
pub mod policy;
pub mod reclaim;
pub mod store;
pub mod weigher;

pub use accessor::{CachedAccessor, DataSource};
pub use builder::CacheBuilder;
pub use cache::Cache;
pub use error::{Error, Result};
pub use list::ListCache;
pub use listener::EvictionCause;
pub use metrics::stats::Metrics;
pub use store::Strong;
