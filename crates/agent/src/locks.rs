use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use parley_core::domain::call::CallerId;

/// Serializes turns per caller. Slots are dropped once no turn holds or waits on them.
#[derive(Default)]
pub struct CallerLocks {
    slots: Mutex<HashMap<CallerId, Arc<AsyncMutex<()>>>>,
}

pub struct CallerGuard<'a> {
    locks: &'a CallerLocks,
    caller_id: CallerId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl CallerLocks {
    pub async fn acquire(&self, caller_id: &CallerId) -> CallerGuard<'_> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(slots.entry(caller_id.clone()).or_default())
        };

        let guard = slot.lock_owned().await;
        CallerGuard { locks: self, caller_id: caller_id.clone(), guard: Some(guard) }
    }

    /// Number of callers with a turn in flight or waiting.
    pub fn active(&self) -> usize {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }
}

impl Drop for CallerGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut slots = self.locks.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let idle = slots.get(&self.caller_id).is_some_and(|slot| Arc::strong_count(slot) == 1);
        if idle {
            slots.remove(&self.caller_id);
        }
    }
}
