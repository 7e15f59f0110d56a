use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

/// Per-key async mutex map.
///
/// At most one holder per key at a time; later callers wait in FIFO order.
/// A key's map slot is dropped once nobody holds or waits on it.
#[derive(Debug, Default)]
pub struct SingleFlightLock {
    slots: Mutex<HashMap<String, Slot>>,
}

#[derive(Debug)]
struct Slot {
    mutex: Arc<AsyncMutex<()>>,
    /// Holder plus waiters, including waiters that have not been polled yet
    users: usize,
}

/// Registration on a key; dropping it gives up the slot, whether the
/// owner got the lock or was cancelled while waiting
struct Ticket<'a> {
    owner: &'a SingleFlightLock,
    key: String,
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        self.owner.release(&self.key);
    }
}

/// Held lock on one key; releases on drop
pub struct KeyGuard<'a> {
    // Field order matters: the mutex is unlocked before the slot is released
    _guard: OwnedMutexGuard<()>,
    _ticket: Ticket<'a>,
}

impl SingleFlightLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &str) -> KeyGuard<'_> {
        let mutex = {
            let mut slots = self.slots.lock();
            let slot = slots.entry(key.to_string()).or_insert_with(|| Slot {
                mutex: Arc::new(AsyncMutex::new(())),
                users: 0,
            });
            slot.users += 1;
            slot.mutex.clone()
        };
        let ticket = Ticket {
            owner: self,
            key: key.to_string(),
        };
        trace!("Waiting for lock {}", key);
        let guard = mutex.lock_owned().await;
        KeyGuard {
            _guard: guard,
            _ticket: ticket,
        }
    }

    /// Run `f` while holding the lock for `key`
    pub async fn run<F, T>(&self, key: &str, f: F) -> T
    where
        F: Future<Output = T>,
    {
        let _guard = self.acquire(key).await;
        f.await
    }

    /// Keys with a holder or waiters
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, key: &str) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get_mut(key) {
            slot.users = slot.users.saturating_sub(1);
            if slot.users == 0 {
                slots.remove(key);
            }
        }
    }
}
