//! Per-key write locks.
//!
//! Writes to the same blob key are serialized; writes to different keys
//! never contend beyond the brief map lookup.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;

use crate::key::BlobKey;

/// Shared handle to a single key's lock.
pub type KeyLock = Arc<AsyncMutex<()>>;

/// Lazily populated map from blob key to its write lock.
///
/// Cloning yields another handle to the same table.
#[derive(Debug, Clone, Default)]
pub struct KeyLockTable {
    locks: Arc<Mutex<HashMap<BlobKey, KeyLock>>>,
}

impl KeyLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the lock for `key`.
    ///
    /// Every caller asking for the same key while the lock is in use gets
    /// the same instance.
    pub fn get_lock(&self, key: &BlobKey) -> KeyLock {
        self.locks.lock().entry(*key).or_default().clone()
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }

    /// Drop locks nobody holds or waits on. Returns how many were removed.
    ///
    /// A handle outside the table keeps the strong count above one, and
    /// handles are only handed out under the map lock, so a removed entry
    /// cannot be in use.
    pub fn prune_idle(&self) -> usize {
        let mut locks = self.locks.lock();
        let before = locks.len();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - locks.len()
    }
}
