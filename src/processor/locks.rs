//! Per-source serialization
//!
//! One FIFO async mutex per source filename, created on first use and
//! dropped again once nobody holds or waits for it. Requests on the same
//! source run one at a time in arrival order; different sources never
//! contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slot = Arc<AsyncMutex<()>>;

#[derive(Debug, Default)]
pub struct SourceLocks {
    slots: Mutex<HashMap<String, Slot>>,
}

/// Exclusive hold on one source; released on drop
#[derive(Debug)]
pub struct SourceGuard {
    guard: Option<OwnedMutexGuard<()>>,
    source: String,
    locks: Arc<SourceLocks>,
}

impl SourceGuard {
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl Drop for SourceGuard {
    fn drop(&mut self) {
        // Unlock before deciding whether the slot is idle
        drop(self.guard.take());
        self.locks.prune(&self.source);
    }
}

impl SourceLocks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for exclusive access to `source`
    pub async fn acquire(self: &Arc<Self>, source: &str) -> SourceGuard {
        let slot = Arc::clone(self.slots().entry(source.to_string()).or_default());
        let guard = slot.lock_owned().await;

        SourceGuard {
            guard: Some(guard),
            source: source.to_string(),
            locks: Arc::clone(self),
        }
    }

    /// Remove the slot for `source` if only the map still refers to it
    fn prune(&self, source: &str) {
        let mut slots = self.slots();
        if slots
            .get(source)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            slots.remove(source);
        }
    }

    /// Number of sources with a holder or a waiter
    pub fn active(&self) -> usize {
        self.slots().len()
    }
}
