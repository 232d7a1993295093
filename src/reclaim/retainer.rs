use ahash::AHashMap;

use crate::error::Result;
use crate::policy::lru::LruPolicy;
use crate::policy::Policy;
use crate::store::Strong;

/// Stands in for a memory manager that keeps recently used values alive.
///
/// Holds strong handles to at most `capacity` distinct values, ordered by
/// recency.  Retaining one more releases the least recently used handle.
/// A released value with no other [`Strong`] outstanding is reclaimed on
/// the spot.
///
/// Released handles are handed back to the caller so they can be dropped
/// after the cache lock is released.
pub struct SoftRetainer<V> {
    order: LruPolicy<u64>,
    held: AHashMap<u64, Strong<V>>,
}

impl<V> SoftRetainer<V> {
    pub fn new(capacity: u64) -> Self {
        SoftRetainer {
            order: LruPolicy::new(capacity),
            held: AHashMap::new(),
        }
    }

    /// Retains `value` (or refreshes it if `id` is already retained).
    pub fn retain(&mut self, id: u64, value: Strong<V>) -> Result<Vec<Strong<V>>> {
        self.held.entry(id).or_insert(value);
        let victims = self.order.on_insert(id, 1)?;
        Ok(victims
            .into_iter()
            .filter_map(|victim| self.held.remove(&victim))
            .collect())
    }

    /// Stops retaining `id`.
    pub fn release(&mut self, id: u64) -> Option<Strong<V>> {
        self.order.on_remove(&id);
        self.held.remove(&id)
    }

    /// Stops retaining everything, as under memory pressure.
    pub fn release_all(&mut self) -> Vec<Strong<V>> {
        self.order.clear();
        self.held.drain().map(|(_, v)| v).collect()
    }

    pub fn is_retained(&self, id: u64) -> bool {
        self.held.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    pub fn capacity(&self) -> u64 {
        self.order.max_weight()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::WeakValueBox;

    fn value(id: u64, tx: &flume::Sender<crate::store::Reclaimed<u64>>) -> (WeakValueBox<u64, u64>, Strong<u64>) {
        WeakValueBox::new(id, id, id * 10, tx)
    }

    #[test]
    fn overflow_releases_least_recent() {
        let (tx, rx) = flume::unbounded();
        let mut retainer = SoftRetainer::new(2);
        let (a_box, a) = value(1, &tx);
        let (_b_box, b) = value(2, &tx);
        let (_c_box, c) = value(3, &tx);

        assert!(retainer.retain(1, a).unwrap().is_empty());
        assert!(retainer.retain(2, b).unwrap().is_empty());
        let released = retainer.retain(3, c).unwrap();
        assert_eq!(released.len(), 1);
        assert_eq!(*released[0], 10);
        assert!(!a_box.is_collected(), "handle returned to the caller");

        drop(released);
        assert!(a_box.is_collected());
        assert_eq!(rx.try_recv().unwrap().key, 1);
        assert_eq!(retainer.len(), 2);
    }

    #[test]
    fn refresh_protects_value() {
        let (tx, _rx) = flume::unbounded();
        let mut retainer = SoftRetainer::new(2);
        let (_a_box, a) = value(1, &tx);
        let (_b_box, b) = value(2, &tx);
        let (_c_box, c) = value(3, &tx);

        retainer.retain(1, a.clone()).unwrap();
        retainer.retain(2, b).unwrap();
        // Touch 1 again: 2 becomes the victim.
        assert!(retainer.retain(1, a).unwrap().is_empty());
        let released = retainer.retain(3, c).unwrap();
        assert_eq!(*released[0], 20);
        assert!(retainer.is_retained(1));
        assert!(!retainer.is_retained(2));
    }

    #[test]
    fn release_all_empties() {
        let (tx, _rx) = flume::unbounded();
        let mut retainer = SoftRetainer::new(4);
        for id in 0..3 {
            let (_, v) = value(id, &tx);
            retainer.retain(id, v).unwrap();
        }
        assert_eq!(retainer.release_all().len(), 3);
        assert!(retainer.is_empty());
        assert!(retainer.release(0).is_none());
        assert_eq!(retainer.capacity(), 4);
    }
}
