//! Document-wide storage lock.
//!
//! Held for the whole duration of one logical edit (and of every undo/redo) so that
//! persistence never observes a half-applied change.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct StorageLock {
    locked: Arc<AtomicBool>,
}

impl StorageLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock, or `None` if it is already held
    pub fn try_acquire(&self) -> Option<StorageGuard> {
        self.locked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| StorageGuard {
                locked: Arc::clone(&self.locked),
            })
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }
}

/// Releases the [`StorageLock`] when dropped
#[derive(Debug)]
pub struct StorageGuard {
    locked: Arc<AtomicBool>,
}

impl Drop for StorageGuard {
    fn drop(&mut self) {
        self.locked.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_is_exclusive() {
        let lock = StorageLock::new();
        let guard = lock.try_acquire();
        assert!(guard.is_some());
        assert!(lock.is_locked());
        assert!(lock.clone().try_acquire().is_none());

        drop(guard);
        assert!(!lock.is_locked());
        assert!(lock.try_acquire().is_some());
    }
}
