//! Weakly-held cache values.
//!
//! The backing map of a cache never owns its values.  It holds a
//! [`WeakValueBox`] per key, while strong ownership is shared between the
//! soft retainer and any [`Strong`] handles given out to callers.  Once the
//! last strong handle is gone the value is reclaimed, and a [`Reclaimed`]
//! notice naming the key it was filed under is pushed on the reclamation
//! queue the box was registered with.

use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};

/// Notice sent on the reclamation queue when a stored value is reclaimed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reclaimed<K> {
    /// Key the value was filed under.
    pub key: K,
    /// Id of the reclaimed value.  The entry under `key` is only dropped if
    /// it still carries this id.
    pub id: u64,
}

type Notify = Box<dyn FnOnce() + Send + Sync>;

struct Tracked<V> {
    value: V,
    notify: Option<Notify>,
}

impl<V> Drop for Tracked<V> {
    fn drop(&mut self) {
        if let Some(notify) = self.notify.take() {
            notify();
        }
    }
}

/// A strong handle to a cached value.
///
/// While any clone of a `Strong` is alive, the value it points to cannot be
/// reclaimed.
pub struct Strong<V>(Arc<Tracked<V>>);

impl<V> Strong<V> {
    /// Returns `true` if both handles point to the same stored value.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.0, &other.0)
    }
}

impl<V> Clone for Strong<V> {
    fn clone(&self) -> Self {
        Strong(Arc::clone(&self.0))
    }
}

impl<V> Deref for Strong<V> {
    type Target = V;

    fn deref(&self) -> &V {
        &self.0.value
    }
}

impl<V> AsRef<V> for Strong<V> {
    fn as_ref(&self) -> &V {
        &self.0.value
    }
}

impl<V: PartialEq> PartialEq for Strong<V> {
    fn eq(&self, other: &Self) -> bool {
        self.0.value == other.0.value
    }
}

impl<V: Eq> Eq for Strong<V> {}

impl<V: fmt::Debug> fmt::Debug for Strong<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0.value, f)
    }
}

/// A value stored under `key`, held only weakly.
pub struct WeakValueBox<K, V> {
    key: K,
    id: u64,
    value: Weak<Tracked<V>>,
}

impl<K, V> WeakValueBox<K, V>
where
    K: Clone + Send + Sync + 'static,
{
    /// Wraps `value` and registers it with `queue`.
    ///
    /// Returns the box together with the only strong handle to the value;
    /// dropping that handle (and every clone of it) reclaims the value.
    pub fn new(key: K, id: u64, value: V, queue: &flume::Sender<Reclaimed<K>>) -> (Self, Strong<V>) {
        let queue = queue.clone();
        let notice = Reclaimed { key: key.clone(), id };
        let notify: Notify = Box::new(move || {
            // The receiver is gone once the cache and its sweeper are dropped.
            let _ = queue.send(notice);
        });
        let strong = Strong(Arc::new(Tracked {
            value,
            notify: Some(notify),
        }));
        let boxed = WeakValueBox {
            key,
            id,
            value: Arc::downgrade(&strong.0),
        };
        (boxed, strong)
    }
}

impl<K, V> WeakValueBox<K, V> {
    /// Returns the value if it has not been reclaimed yet.
    pub fn try_get(&self) -> Option<Strong<V>> {
        self.value.upgrade().map(Strong)
    }

    /// Returns `true` once the value has been reclaimed.
    pub fn is_collected(&self) -> bool {
        self.value.strong_count() == 0
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropping_last_handle_reclaims_and_notifies() {
        let (tx, rx) = flume::unbounded();
        let (boxed, strong) = WeakValueBox::new("k".to_string(), 7, 42u32, &tx);

        let other = strong.clone();
        assert_eq!(*boxed.try_get().unwrap(), 42);
        drop(strong);
        assert!(!boxed.is_collected(), "a clone still holds the value");
        assert!(rx.try_recv().is_err());

        drop(other);
        assert!(boxed.is_collected());
        assert!(boxed.try_get().is_none());
        assert_eq!(
            rx.try_recv().unwrap(),
            Reclaimed {
                key: "k".to_string(),
                id: 7
            }
        );
        assert_eq!(boxed.key(), "k");
        assert_eq!(boxed.id(), 7);
    }

    #[test]
    fn notice_after_queue_closed_is_ignored() {
        let (tx, rx) = flume::unbounded::<Reclaimed<u32>>();
        let (_boxed, strong) = WeakValueBox::new(1u32, 1, "v", &tx);
        drop(rx);
        drop(strong);
    }

    #[test]
    fn handles_compare_by_value_and_identity() {
        let (tx, _rx) = flume::unbounded();
        let (_a, a) = WeakValueBox::new(1u32, 1, "same", &tx);
        let (_b, b) = WeakValueBox::new(2u32, 2, "same", &tx);
        assert_eq!(a, b);
        assert!(!Strong::ptr_eq(&a, &b));
        assert!(Strong::ptr_eq(&a, &a.clone()));
        assert_eq!(format!("{a:?}"), "\"same\"");
    }
}
