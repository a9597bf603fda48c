//! Named locks.
//!
//! [`KeyedLockManager`] hands out one async mutex per name. Every
//! [`NamedLock`] for the same name shares that mutex while any handle to it is
//! alive; once the last handle drops, the entry is pruned.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

const MIN_PRUNE_THRESHOLD: usize = 64;

/// Creates locks by name.
pub trait LockFactory: Send + Sync {
    /// Returns the lock for `name`. Locks with equal names exclude each other.
    fn create_lock(&self, name: &str) -> NamedLock;
}

/// A mutual-exclusion lock identified by name.
///
/// Cloning the handle yields the same lock. Unlocking is done by dropping the
/// guard, or explicitly through [`NamedLockGuard::unlock`].
#[derive(Clone)]
pub struct NamedLock {
    name: Arc<str>,
    mutex: Arc<AsyncMutex<()>>,
}

impl NamedLock {
    /// The lock name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Waits until the lock is acquired.
    pub async fn lock(&self) -> NamedLockGuard {
        NamedLockGuard {
            name: Arc::clone(&self.name),
            _guard: Arc::clone(&self.mutex).lock_owned().await,
        }
    }

    /// Acquires the lock if it is free.
    pub fn try_lock(&self) -> Option<NamedLockGuard> {
        Arc::clone(&self.mutex)
            .try_lock_owned()
            .ok()
            .map(|guard| NamedLockGuard {
                name: Arc::clone(&self.name),
                _guard: guard,
            })
    }

    /// Blocks the calling thread until the lock is acquired.
    ///
    /// Must not be called from an async task.
    pub fn blocking_lock(&self) -> NamedLockGuard {
        futures::executor::block_on(self.lock())
    }
}

impl fmt::Debug for NamedLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NamedLock").field(&self.name).finish()
    }
}

/// Held lock. The lock is released when the guard drops.
pub struct NamedLockGuard {
    name: Arc<str>,
    _guard: OwnedMutexGuard<()>,
}

impl NamedLockGuard {
    /// The lock name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Releases the lock.
    pub fn unlock(self) {}
}

impl fmt::Debug for NamedLockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NamedLockGuard").field(&self.name).finish()
    }
}

struct Registry {
    locks: HashMap<String, Weak<AsyncMutex<()>>>,
    prune_at: usize,
}

/// In-process [`LockFactory`].
pub struct KeyedLockManager {
    registry: Mutex<Registry>,
}

impl KeyedLockManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry {
                locks: HashMap::new(),
                prune_at: MIN_PRUNE_THRESHOLD,
            }),
        }
    }

    /// Number of names with a live lock handle.
    pub fn live_locks(&self) -> usize {
        self.registry
            .lock()
            .locks
            .values()
            .filter(|lock| lock.strong_count() > 0)
            .count()
    }
}

impl Default for KeyedLockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for KeyedLockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedLockManager")
            .field("live_locks", &self.live_locks())
            .finish()
    }
}

impl LockFactory for KeyedLockManager {
    fn create_lock(&self, name: &str) -> NamedLock {
        let mut registry = self.registry.lock();
        if let Some(mutex) = registry.locks.get(name).and_then(Weak::upgrade) {
            return NamedLock {
                name: Arc::from(name),
                mutex,
            };
        }

        if registry.locks.len() >= registry.prune_at {
            registry.locks.retain(|_, lock| lock.strong_count() > 0);
            registry.prune_at = (registry.locks.len() * 2).max(MIN_PRUNE_THRESHOLD);
        }

        let mutex = Arc::new(AsyncMutex::new(()));
        registry
            .locks
            .insert(name.to_owned(), Arc::downgrade(&mutex));
        NamedLock {
            name: Arc::from(name),
            mutex,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_name_excludes() {
        let locks = KeyedLockManager::new();
        let a = locks.create_lock("key");
        let b = locks.create_lock("key");
        let other = locks.create_lock("other");

        let guard = a.lock().await;
        assert!(b.try_lock().is_none());
        assert!(other.try_lock().is_some());

        guard.unlock();
        assert!(b.try_lock().is_some());
    }

    #[tokio::test]
    async fn test_unreferenced_locks_are_released() {
        let locks = KeyedLockManager::new();
        {
            let _held = locks.create_lock("short-lived");
            assert_eq!(locks.live_locks(), 1);
        }
        assert_eq!(locks.live_locks(), 0);

        let guard = locks.create_lock("reused").lock().await;
        assert!(locks.create_lock("reused").try_lock().is_none());
        drop(guard);
    }

    #[test]
    fn test_registry_is_pruned() {
        let locks = KeyedLockManager::new();
        for i in 0..(MIN_PRUNE_THRESHOLD * 3) {
            let _ = locks.create_lock(&format!("k{i}"));
        }
        assert!(locks.registry.lock().locks.len() <= MIN_PRUNE_THRESHOLD + 1);
    }

    #[test]
    fn test_blocking_lock_from_thread() {
        let locks = Arc::new(KeyedLockManager::new());
        let guard = locks.create_lock("t").blocking_lock();
        let contender = {
            let locks = Arc::clone(&locks);
            std::thread::spawn(move || {
                let _guard = locks.create_lock("t").blocking_lock();
            })
        };
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(!contender.is_finished());
        drop(guard);
        contender.join().unwrap();
    }
}
