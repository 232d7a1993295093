use std::hash::Hash;

use ahash::AHashMap;

use super::Policy;
use crate::error::{Error, Result};

/// Sentinel indices in the `nodes` arena.
const HEAD: usize = 0; // most-recently-used end
const TAIL: usize = 1; // least-recently-used end
const NULL: usize = usize::MAX;

struct LruNode<K> {
    /// `None` only for the HEAD and TAIL sentinels and for freed slots.
    key: Option<K>,
    weight: u64,
    /// Index toward HEAD (more recently used).
    prev: usize,
    /// Index toward TAIL (less recently used).
    next: usize,
}

/// O(1) recency order backed by an index-arena doubly-linked list.
///
/// Every tracked key appears exactly once.  The node next to the TAIL
/// sentinel is the next eviction victim; the node next to HEAD is the key
/// most recently inserted or read.
pub struct LruPolicy<K> {
    /// Index 0 = HEAD sentinel, 1 = TAIL sentinel, 2+ = real entries.
    nodes: Vec<LruNode<K>>,
    /// Maps a key to its index in `nodes`.
    map: AHashMap<K, usize>,
    /// Indices of freed (reusable) slots.
    free_list: Vec<usize>,
    total_weight: u64,
    max_weight: u64,
}

impl<K: Hash + Eq + Clone + Send> LruPolicy<K> {
    /// Creates a new `LruPolicy` with the given maximum total weight.
    pub fn new(max_weight: u64) -> Self {
        let mut nodes: Vec<LruNode<K>> = Vec::with_capacity(16);
        // HEAD sentinel (index 0): next points to TAIL initially
        nodes.push(LruNode {
            key: None,
            weight: 0,
            prev: NULL,
            next: TAIL,
        });
        // TAIL sentinel (index 1): prev points to HEAD initially
        nodes.push(LruNode {
            key: None,
            weight: 0,
            prev: HEAD,
            next: NULL,
        });

        LruPolicy {
            nodes,
            map: AHashMap::new(),
            free_list: Vec::new(),
            total_weight: 0,
            max_weight,
        }
    }

    /// Links `idx` immediately after the HEAD sentinel (marks it most-recently-used).
    fn link_after_head(&mut self, idx: usize) {
        let old_first = self.nodes[HEAD].next;
        self.nodes[idx].prev = HEAD;
        self.nodes[idx].next = old_first;
        self.nodes[HEAD].next = idx;
        self.nodes[old_first].prev = idx;
    }

    /// Detaches `idx` from its current position in the list.
    fn unlink(&mut self, idx: usize) {
        let prev = self.nodes[idx].prev;
        let next = self.nodes[idx].next;
        self.nodes[prev].next = next;
        self.nodes[next].prev = prev;
        self.nodes[idx].prev = NULL;
        self.nodes[idx].next = NULL;
    }

    /// Allocates a new node (reusing from the free list when available).
    fn alloc_node(&mut self, key: K, weight: u64) -> usize {
        if let Some(idx) = self.free_list.pop() {
            self.nodes[idx].key = Some(key);
            self.nodes[idx].weight = weight;
            self.nodes[idx].prev = NULL;
            self.nodes[idx].next = NULL;
            idx
        } else {
            let idx = self.nodes.len();
            self.nodes.push(LruNode {
                key: Some(key),
                weight,
                prev: NULL,
                next: NULL,
            });
            idx
        }
    }

    /// Unlinks and frees the node at `idx`, returning its key and weight.
    fn release(&mut self, idx: usize) -> Option<(K, u64)> {
        self.unlink(idx);
        let key = self.nodes[idx].key.take()?;
        let weight = self.nodes[idx].weight;
        self.map.remove(&key);
        self.free_list.push(idx);
        self.total_weight -= weight;
        Some((key, weight))
    }

    /// Picks victims from the TAIL end until `projected` fits, without
    /// touching the list.  The node tracking `key` is never picked.
    fn plan_evictions(&self, key: &K, mut projected: u64) -> Result<Vec<usize>> {
        let keep = self.map.get(key).copied();
        let mut victims = Vec::new();
        let mut cursor = self.nodes[TAIL].prev;
        while projected > self.max_weight {
            if cursor == HEAD {
                return Err(Error::consistency(format!(
                    "recency order exhausted with weight {projected} over capacity {}",
                    self.max_weight
                )));
            }
            if Some(cursor) != keep {
                if self.nodes[cursor].key.is_none() {
                    return Err(Error::consistency(format!(
                        "recency node {cursor} carries no key"
                    )));
                }
                projected = projected.saturating_sub(self.nodes[cursor].weight);
                victims.push(cursor);
            }
            cursor = self.nodes[cursor].prev;
        }
        Ok(victims)
    }

    /// Returns `true` if `key` is tracked.
    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Returns the weight recorded for `key`.
    pub fn weight_of(&self, key: &K) -> Option<u64> {
        self.map.get(key).map(|&idx| self.nodes[idx].weight)
    }

    /// Iterates keys from the least to the most recently used.
    pub fn iter_oldest(&self) -> Iter<'_, K> {
        Iter {
            nodes: &self.nodes,
            cursor: self.nodes[TAIL].prev,
            oldest_first: true,
        }
    }

    /// Iterates keys from the most to the least recently used.
    pub fn iter_newest(&self) -> Iter<'_, K> {
        Iter {
            nodes: &self.nodes,
            cursor: self.nodes[HEAD].next,
            oldest_first: false,
        }
    }
}

impl<K: Hash + Eq + Clone + Send> Policy<K> for LruPolicy<K> {
    fn on_access(&mut self, key: &K) {
        if let Some(&idx) = self.map.get(key) {
            self.unlink(idx);
            self.link_after_head(idx);
        }
    }

    fn on_insert(&mut self, key: K, weight: u64) -> Result<Vec<K>> {
        if weight > self.max_weight {
            return Err(Error::invalid_argument(format!(
                "item weight {weight} exceeds capacity {}",
                self.max_weight
            )));
        }
        let projected = match self.map.get(&key) {
            // Key already tracked: its old weight is given back first.
            Some(&idx) => self.total_weight - self.nodes[idx].weight + weight,
            None => self.total_weight + weight,
        };
        let victims = self.plan_evictions(&key, projected)?;

        if let Some(&idx) = self.map.get(&key) {
            let old_weight = self.nodes[idx].weight;
            self.nodes[idx].weight = weight;
            self.total_weight = self.total_weight - old_weight + weight;
            self.unlink(idx);
            self.link_after_head(idx);
        } else {
            let idx = self.alloc_node(key.clone(), weight);
            self.map.insert(key, idx);
            self.link_after_head(idx);
            self.total_weight += weight;
        }
        Ok(victims
            .into_iter()
            .filter_map(|idx| self.release(idx).map(|(k, _)| k))
            .collect())
    }

    fn reweigh(&mut self, key: &K, weight: u64) -> Option<u64> {
        let &idx = self.map.get(key)?;
        let old_weight = self.nodes[idx].weight;
        self.nodes[idx].weight = weight;
        self.total_weight = self.total_weight - old_weight + weight;
        Some(old_weight)
    }

    fn on_remove(&mut self, key: &K) -> Option<u64> {
        let &idx = self.map.get(key)?;
        self.release(idx).map(|(_, w)| w)
    }

    fn clear(&mut self) {
        self.nodes.truncate(2);
        self.nodes[HEAD].next = TAIL;
        self.nodes[TAIL].prev = HEAD;
        self.map.clear();
        self.free_list.clear();
        self.total_weight = 0;
    }

    fn current_weight(&self) -> u64 {
        self.total_weight
    }

    fn max_weight(&self) -> u64 {
        self.max_weight
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}

/// Iterator over the keys of an [`LruPolicy`] in recency order.
pub struct Iter<'a, K> {
    nodes: &'a [LruNode<K>],
    cursor: usize,
    oldest_first: bool,
}

impl<'a, K> Iterator for Iter<'a, K> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor == HEAD || self.cursor == TAIL || self.cursor == NULL {
            return None;
        }
        let node = &self.nodes[self.cursor];
        self.cursor = if self.oldest_first { node.prev } else { node.next };
        node.key.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_lru_entry_when_full() {
        let mut policy: LruPolicy<&str> = LruPolicy::new(2);
        assert!(policy.on_insert("a", 1).unwrap().is_empty());
        assert!(policy.on_insert("b", 1).unwrap().is_empty());
        let evicted = policy.on_insert("c", 1).unwrap();
        assert_eq!(evicted, vec!["a"]); // "a" is LRU
    }

    #[test]
    fn access_promotes_to_mru() {
        let mut policy: LruPolicy<&str> = LruPolicy::new(2);
        policy.on_insert("a", 1).unwrap();
        policy.on_insert("b", 1).unwrap();
        policy.on_access(&"a"); // "a" is now MRU, "b" is LRU
        let evicted = policy.on_insert("c", 1).unwrap();
        assert_eq!(evicted, vec!["b"]);
    }

    #[test]
    fn on_remove_decrements_weight() {
        let mut policy: LruPolicy<&str> = LruPolicy::new(3);
        policy.on_insert("a", 1).unwrap();
        policy.on_insert("b", 1).unwrap();
        assert_eq!(policy.on_remove(&"a"), Some(1));
        assert_eq!(policy.on_remove(&"a"), None);
        assert_eq!(policy.current_weight(), 1);
        assert!(policy.on_insert("c", 1).unwrap().is_empty());
        assert!(policy.on_insert("d", 1).unwrap().is_empty()); // still under cap=3
    }

    #[test]
    fn replacing_a_key_does_not_evict_itself() {
        let mut policy: LruPolicy<&str> = LruPolicy::new(3);
        policy.on_insert("k", 3).unwrap();
        // "k" is the oldest and only key; its old weight is returned first.
        assert!(policy.on_insert("k", 1).unwrap().is_empty());
        assert_eq!(policy.current_weight(), 1);
        assert_eq!(policy.len(), 1);
    }

    #[test]
    fn heavy_insert_evicts_several_victims() {
        let mut policy: LruPolicy<&str> = LruPolicy::new(4);
        policy.on_insert("a", 1).unwrap();
        policy.on_insert("b", 2).unwrap();
        policy.on_insert("c", 1).unwrap();
        let evicted = policy.on_insert("d", 3).unwrap();
        assert_eq!(evicted, vec!["a", "b"]);
        assert_eq!(policy.current_weight(), 4);
    }

    #[test]
    fn oversized_item_is_rejected_without_change() {
        let mut policy: LruPolicy<&str> = LruPolicy::new(2);
        policy.on_insert("a", 1).unwrap();
        let err = policy.on_insert("big", 3).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(policy.current_weight(), 1);
        assert_eq!(policy.iter_oldest().copied().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn exhausted_order_is_reported_without_change() {
        let mut policy: LruPolicy<&str> = LruPolicy::new(3);
        policy.on_insert("a", 1).unwrap();
        policy.on_insert("b", 1).unwrap();
        // Weight that no eviction can free.
        policy.total_weight += 10;

        let err = policy.on_insert("c", 1).unwrap_err();
        assert!(matches!(err, Error::ConsistencyViolation(_)));
        assert_eq!(policy.iter_oldest().copied().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(policy.len(), 2);
        assert_eq!(policy.current_weight(), 12);
        assert!(!policy.contains(&"c"));
    }

    #[test]
    fn reweigh_keeps_position() {
        let mut policy: LruPolicy<&str> = LruPolicy::new(10);
        policy.on_insert("a", 3).unwrap();
        policy.on_insert("b", 1).unwrap();
        assert_eq!(policy.reweigh(&"a", 2), Some(3));
        assert_eq!(policy.current_weight(), 3);
        assert_eq!(policy.iter_oldest().copied().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(policy.reweigh(&"zz", 1), None);
    }

    #[test]
    fn iterates_in_both_directions() {
        let mut policy: LruPolicy<u32> = LruPolicy::new(10);
        for k in 0..4 {
            policy.on_insert(k, 1).unwrap();
        }
        policy.on_access(&1);
        assert_eq!(policy.iter_oldest().copied().collect::<Vec<_>>(), vec![0, 2, 3, 1]);
        assert_eq!(policy.iter_newest().copied().collect::<Vec<_>>(), vec![1, 3, 2, 0]);
    }

    #[test]
    fn clear_resets_everything() {
        let mut policy: LruPolicy<u32> = LruPolicy::new(10);
        for k in 0..5 {
            policy.on_insert(k, 2).unwrap();
        }
        policy.clear();
        assert!(policy.is_empty());
        assert_eq!(policy.current_weight(), 0);
        assert_eq!(policy.iter_oldest().count(), 0);
        policy.on_insert(7, 1).unwrap();
        assert_eq!(policy.weight_of(&7), Some(1));
    }
}
