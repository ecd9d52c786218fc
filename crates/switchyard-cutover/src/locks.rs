//! Per-cutover mutual exclusion.
//!
//! Every transition holds its cutover's lock for the whole
//! read-modify-write, so a manual stop cannot interleave with a tick's
//! evaluation of the same cutover. Different cutovers never contend.
//!
//! A slot lives only while someone holds or waits on it; idle slots are
//! dropped on the next acquisition.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Clone, Default)]
pub struct CutoverLocks {
    slots: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl CutoverLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `name`. Released when the guard drops.
    pub async fn acquire(&self, name: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            // The map's own reference is the only one left on an idle slot.
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            slots.entry(name.to_string()).or_default().clone()
        };
        slot.lock_owned().await
    }

    #[cfg(test)]
    pub(crate) fn slot_count(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
