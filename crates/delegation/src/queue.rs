//! Per-key FIFO serialization with unbounded queueing (C2).
//!
//! Generalizes the gateway's `SessionLockMap` (`Mutex<HashMap<String,
//! Arc<Semaphore>>>`, which rejects a second caller on a busy key) into a
//! queue that never rejects: callers on the same key run strictly in
//! arrival order, callers on different keys run fully concurrently.
//! `tokio::sync::Mutex` already queues waiters FIFO, so a lazily-created
//! per-key mutex is the whole mechanism.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex as AsyncMutex;

struct KeySlot {
    lock: AsyncMutex<()>,
    pending: AtomicUsize,
}

/// An unbounded, per-key FIFO job queue.
///
/// Cheap to share via `Arc`; entries for keys with no waiters and no lock
/// holder are reclaimed by [`SessionQueue::prune_idle`].
pub struct SessionQueue {
    slots: SyncMutex<HashMap<String, Arc<KeySlot>>>,
}

impl Default for SessionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionQueue {
    pub fn new() -> Self {
        Self {
            slots: SyncMutex::new(HashMap::new()),
        }
    }

    fn slot_for(&self, key: &str) -> Arc<KeySlot> {
        let mut slots = self.slots.lock();
        slots
            .entry(key.to_string())
            .or_insert_with(|| {
                Arc::new(KeySlot {
                    lock: AsyncMutex::new(()),
                    pending: AtomicUsize::new(0),
                })
            })
            .clone()
    }

    /// Run `f` with exclusive access to `key`. Waits its turn behind any
    /// earlier caller on the same key; never rejects. Callers on distinct
    /// keys proceed concurrently.
    pub async fn enqueue<F, Fut, T>(&self, key: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let slot = self.slot_for(key);
        slot.pending.fetch_add(1, Ordering::SeqCst);
        let _guard = slot.lock.lock().await;
        slot.pending.fetch_sub(1, Ordering::SeqCst);
        f().await
    }

    /// Number of callers currently waiting (or holding the lock) for `key`.
    pub fn depth(&self, key: &str) -> usize {
        let slots = self.slots.lock();
        slots
            .get(key)
            .map(|s| s.pending.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    pub fn active_keys(&self) -> usize {
        self.slots.lock().len()
    }

    /// Drop cached slots for keys with no pending or active work. Safe to
    /// call concurrently with `enqueue`: a slot that just gained a new
    /// waiter between the depth check and the removal simply gets a fresh
    /// slot allocated on its next `enqueue` call, which is harmless since
    /// the old slot (still held by `Arc`s already in flight) keeps working.
    pub fn prune_idle(&self) {
        let mut slots = self.slots.lock();
        slots.retain(|_, slot| {
            slot.pending.load(Ordering::SeqCst) > 0 || Arc::strong_count(slot) > 1
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_runs_in_fifo_order() {
        let q = Arc::new(SessionQueue::new());
        let order = Arc::new(SyncMutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..5 {
            let q = q.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                q.enqueue("k", || async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    order.lock().push(i);
                })
                .await;
            }));
            // Stagger spawns so they queue in submission order.
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn different_keys_run_concurrently() {
        let q = Arc::new(SessionQueue::new());
        let concurrent = Arc::new(AtomicU32::new(0));
        let max_seen = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for i in 0..4 {
            let q = q.clone();
            let concurrent = concurrent.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                q.enqueue(&format!("k{i}"), || async move {
                    let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    concurrent.fetch_sub(1, Ordering::SeqCst);
                })
                .await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert!(max_seen.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn enqueue_never_rejects_a_busy_key() {
        let q = SessionQueue::new();
        q.enqueue("k", || async { tokio::time::sleep(Duration::from_millis(5)).await })
            .await;
        let result = q.enqueue("k", || async { 42 }).await;
        assert_eq!(result, 42);
    }

    #[test]
    fn prune_idle_drops_unused_slots() {
        let q = SessionQueue::new();
        let _ = q.slot_for("k");
        assert_eq!(q.active_keys(), 1);
        q.prune_idle();
        assert_eq!(q.active_keys(), 0);
    }
}
