use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};

type Slot = Arc<Mutex<()>>;

/// one mutex per key, created on first use and evicted once nobody holds
/// or waits on it
///
/// `let _guard = locks.lock(&id);` holds the key until the guard drops.
#[derive(Debug)]
pub struct KeyedLocks<K: Eq + Hash + Clone> {
    slots: Mutex<HashMap<K, Slot>>,
}

/// exclusive hold on one key of a [`KeyedLocks`]
pub struct KeyGuard<'a, K: Eq + Hash + Clone> {
    owner: &'a KeyedLocks<K>,
    key: K,
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// block until `key` is free; the table lock is released before waiting
    pub fn lock(&self, key: &K) -> KeyGuard<'_, K> {
        let slot = Arc::clone(
            self.slots
                .lock()
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        );
        let guard = slot.lock_arc();
        KeyGuard {
            owner: self,
            key: key.clone(),
            guard: Some(guard),
        }
    }

    /// both keys in ascending order, or one guard if they are equal
    pub fn lock_pair(&self, a: &K, b: &K) -> Vec<KeyGuard<'_, K>>
    where
        K: Ord,
    {
        if a == b {
            return vec![self.lock(a)];
        }
        let (first, second) = if a < b { (a, b) } else { (b, a) };
        let first = self.lock(first);
        vec![first, self.lock(second)]
    }

    /// keys currently held or waited on
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, key: &K) {
        let mut slots = self.slots.lock();
        // the table's own reference is the last one: no holder, no waiter
        if slots.get(key).is_some_and(|slot| Arc::strong_count(slot) == 1) {
            slots.remove(key);
        }
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone> Drop for KeyGuard<'_, K> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.owner.release(&self.key);
    }
}
