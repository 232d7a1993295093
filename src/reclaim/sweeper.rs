use std::sync::Weak;

use crate::error::Result;
use crate::store::Reclaimed;

/// Something that can drop the entry of a reclaimed value.
pub trait ReclaimTarget<K>: Send + Sync + 'static {
    /// Drops the entry filed under `notice.key` if it still holds the value
    /// identified by `notice.id`.
    fn reclaim(&self, notice: Reclaimed<K>);
}

/// Background task that blocks on a reclamation queue and removes the
/// entries of reclaimed values from the owning cache.
///
/// The sweeper only holds a weak reference to its cache.  It runs for as
/// long as the cache is alive and exits on the first notice it receives
/// after the cache has been dropped, or once the queue disconnects.
pub struct Sweeper<K, T: ?Sized> {
    rx: flume::Receiver<Reclaimed<K>>,
    target: Weak<T>,
}

impl<K, T> Sweeper<K, T>
where
    K: Send + 'static,
    T: ReclaimTarget<K> + ?Sized,
{
    pub fn new(rx: flume::Receiver<Reclaimed<K>>, target: Weak<T>) -> Self {
        Sweeper { rx, target }
    }

    /// Starts the sweeper on a dedicated, named thread.
    pub fn spawn(self, name: String) -> Result<()> {
        std::thread::Builder::new()
            .name(name)
            .spawn(move || self.run())?;
        Ok(())
    }

    fn run(self) {
        let _guard = ExitGuard;
        tracing::debug!("reclamation sweeper started");
        while let Ok(notice) = self.rx.recv() {
            let Some(target) = self.target.upgrade() else {
                break;
            };
            target.reclaim(notice);
            for notice in self.rx.drain() {
                target.reclaim(notice);
            }
        }
        tracing::debug!("reclamation sweeper stopped");
    }
}

struct ExitGuard;

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            tracing::error!("reclamation sweeper panicked; reclaimed entries will only be dropped on lookup");
        }
    }
}
