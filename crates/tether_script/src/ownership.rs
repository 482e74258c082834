//! Ownership table
//!
//! Strong references to every host struct script can reach, keyed by owner
//! id. An entry is only ever removed by the finalizer of the script object
//! that was given the id, so the host struct lives exactly as long as script
//! can still observe it.

use parking_lot::Mutex;
use std::collections::HashMap;
use tether_core::StructRef;
use tracing::debug;

struct Owned {
    target: StructRef,
    class: String,
}

struct OwnershipState {
    next_id: u64,
    owners: HashMap<u64, Owned>,
}

pub struct OwnershipTable {
    state: Mutex<OwnershipState>,
}

impl OwnershipTable {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(OwnershipState {
                next_id: 1,
                owners: HashMap::new(),
            }),
        }
    }

    /// Keep `target` alive under a fresh owner id.
    pub fn retain(&self, target: StructRef, class: &str) -> u64 {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.owners.insert(
            id,
            Owned {
                target,
                class: class.to_string(),
            },
        );
        debug!(owner_id = id, class, live = state.owners.len(), "retained instance");
        id
    }

    /// Finalizer body; see `InstanceWrapper`'s `Drop`.
    pub(crate) fn release(&self, id: u64) {
        let removed = {
            let mut state = self.state.lock();
            let removed = state.owners.remove(&id);
            if let Some(owned) = &removed {
                debug!(
                    owner_id = id,
                    class = owned.class.as_str(),
                    live = state.owners.len(),
                    "released instance"
                );
            }
            removed
        };
        // the struct may be the last reference to other host state; drop it unlocked
        drop(removed);
    }

    pub fn target(&self, id: u64) -> Option<StructRef> {
        self.state
            .lock()
            .owners
            .get(&id)
            .map(|owned| owned.target.clone())
    }

    pub fn contains(&self, id: u64) -> bool {
        self.state.lock().owners.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.state.lock().owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().owners.is_empty()
    }

    pub fn ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.state.lock().owners.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for OwnershipTable {
    fn default() -> Self {
        Self::new()
    }
}
