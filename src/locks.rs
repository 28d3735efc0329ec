use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RawMutex};

/// Exclusive access to one key of a [`KeyedLockRegistry`], released on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ScopedLock {
    _guard: lock_api::ArcMutexGuard<RawMutex, ()>,
}

/// Maps keys to mutexes that are created on first use and kept for the life of
/// the registry.
///
/// Entries are never removed. Dropping a mutex while another thread is about to
/// lock it would let two holders coexist, so memory grows with the number of
/// distinct keys instead. Key by a bounded domain value such as a
/// [`Destination`](crate::destination::Destination).
pub struct KeyedLockRegistry<K> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K> Default for KeyedLockRegistry<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> KeyedLockRegistry<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Blocks until the lock for `key` is held.
    pub fn acquire(&self, key: &K) -> ScopedLock {
        ScopedLock {
            _guard: self.primitive(key).lock_arc(),
        }
    }

    pub fn try_acquire(&self, key: &K) -> Option<ScopedLock> {
        self.primitive(key)
            .try_lock_arc()
            .map(|guard| ScopedLock { _guard: guard })
    }

    pub fn with_lock<R>(&self, key: &K, f: impl FnOnce() -> R) -> R {
        let _lock = self.acquire(key);
        f()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.locks.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    fn primitive(&self, key: &K) -> Arc<Mutex<()>> {
        if let Some(existing) = self.locks.get(key) {
            return Arc::clone(existing.value());
        }
        // The shard guard from `entry` must be gone before we block on the mutex.
        let created = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())));
        Arc::clone(created.value())
    }
}
