//! Per-location async locks.
//!
//! Serializes the read-previous / write-latest section of the pipeline for
//! one location key within this process. Writers in other processes that
//! share the same report directory are not coordinated.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

/// A set of named async mutexes, created on demand.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// Holds the lock for one key until dropped.
#[derive(Debug)]
pub struct KeyGuard {
    _guard: OwnedMutexGuard<()>,
}

impl KeyedLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `key`.
    pub async fn acquire(&self, key: &str) -> KeyGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Drop entries nobody is holding or waiting on.
            locks.retain(|k, l| k == key || Arc::strong_count(l) > 1);
            locks.entry(key.to_string()).or_default().clone()
        };

        KeyGuard {
            _guard: lock.lock_owned().await,
        }
    }

    /// Number of keys currently tracked.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
