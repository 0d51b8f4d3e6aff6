//! Keyed mutual exclusion for shared plan state.
//!
//! Plan and push-target updates are read-modify-write sequences that span
//! multiple await points. `NamedMutex` serializes those sequences per key
//! while letting unrelated keys proceed in parallel, so throughput scales
//! with the number of independently active plans.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex as AsyncMutex;

struct Entry {
    lock: Arc<AsyncMutex<()>>,
    /// Holders plus waiters for this key. The entry is evicted when this
    /// drops to zero, so the registry does not grow with every key ever used.
    waiters: usize,
}

/// A registry of one FIFO queue per resource key.
///
/// `run_exclusive` guarantees that for a given key no two closures execute
/// concurrently or out of arrival order. Tokio's mutex queues waiters
/// fairly, which provides the FIFO ordering.
///
/// Re-entrant acquisition of the same key from within a held critical
/// section deadlocks: the inner acquisition queues behind the outer one.
/// This is a known limitation, not special-cased.
pub struct NamedMutex<K = String>
where
    K: Eq + Hash + Clone,
{
    entries: StdMutex<HashMap<K, Entry>>,
}

impl<K> NamedMutex<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            entries: StdMutex::new(HashMap::new()),
        }
    }

    /// Run `f` exclusively with respect to all other callers using `key`.
    ///
    /// Returns whatever `f` returns; if `f` resolves to an error the queue
    /// entry is still released and the next waiter proceeds. Errors are
    /// propagated verbatim to the caller whose closure failed, never
    /// swallowed or retried.
    pub async fn run_exclusive<F, Fut, T>(&self, key: K, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let lock = self.register(&key);
        // Deregistration runs on drop, so a caller cancelled while waiting
        // still releases its registry slot.
        let _slot = SlotGuard { mutex: self, key };

        let _guard = lock.lock().await;
        f().await
    }

    /// Number of keys currently tracked. Empty once all queues drain.
    pub fn key_count(&self) -> usize {
        lock(&self.entries).len()
    }

    fn register(&self, key: &K) -> Arc<AsyncMutex<()>> {
        let mut entries = lock(&self.entries);
        let entry = entries.entry(key.clone()).or_insert_with(|| Entry {
            lock: Arc::new(AsyncMutex::new(())),
            waiters: 0,
        });
        entry.waiters += 1;
        entry.lock.clone()
    }

    fn deregister(&self, key: &K) {
        let mut entries = lock(&self.entries);
        if let Some(entry) = entries.get_mut(key) {
            entry.waiters -= 1;
            if entry.waiters == 0 {
                entries.remove(key);
            }
        }
    }
}

impl<K> Default for NamedMutex<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

struct SlotGuard<'a, K>
where
    K: Eq + Hash + Clone,
{
    mutex: &'a NamedMutex<K>,
    key: K,
}

impl<K> Drop for SlotGuard<'_, K>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        self.mutex.deregister(&self.key);
    }
}

// A poisoned registry lock only means a panic between plain map edits; the
// map itself is still consistent.
fn lock<T>(mutex: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
