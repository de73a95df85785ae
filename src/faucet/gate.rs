use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-requester mutual exclusion.
///
/// One slot exists per requester with a request in flight; the slot is
/// dropped from the map when its last holder or waiter lets go.
#[derive(Clone, Default, Debug)]
pub struct AdmissionGate {
    slots: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

/// Holding this means no other request from the same requester is between
/// admission and commit. Released on drop.
#[derive(Debug)]
pub struct GatePass {
    requester: String,
    guard: Option<OwnedMutexGuard<()>>,
    slots: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl AdmissionGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, requester: &str) -> GatePass {
        // The map shard lock is released at the end of this statement, before we await.
        let slot = self.slots.entry(requester.to_string()).or_default().value().clone();
        let guard = slot.lock_owned().await;

        GatePass {
            requester: requester.to_string(),
            guard: Some(guard),
            slots: Arc::clone(&self.slots),
        }
    }

    /// Number of requesters currently holding or waiting on the gate.
    pub fn active(&self) -> usize {
        self.slots.len()
    }
}

impl Drop for GatePass {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map itself still references an idle slot.
        self.slots.remove_if(&self.requester, |_, slot| Arc::strong_count(slot) == 1);
    }
}
