//! Per-entity mutual exclusion.
//!
//! [`LockRegistry`] hands out one gate per [`EntityId`]. Acquiring a gate
//! blocks the calling thread until no other operation holds it; the
//! returned [`GateGuard`] releases it when dropped, on every exit path.
//!
//! Three table layouts are available through [`GatePolicy`]:
//!
//! - [`GatePolicy::Retained`]: a gate is created on first use and kept
//!   for the lifetime of the registry. The gate count only grows, bounded
//!   by the number of distinct ids ever touched.
//! - [`GatePolicy::Reclaiming`]: gates are reference counted and dropped
//!   as soon as no operation holds or waits on them.
//! - [`GatePolicy::Sharded`]: a fixed array of gates indexed by a hash of
//!   the id. Memory is bounded; ids sharing a shard also share a gate.

use std::fmt;
use std::hash::{BuildHasher, BuildHasherDefault, DefaultHasher};
use std::num::NonZeroUsize;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use serde::{Deserialize, Serialize};

use super::EntityId;

/// Layout of the gate table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum GatePolicy {
    /// One gate per id, never evicted.
    #[default]
    Retained,
    /// One gate per id, evicted when no operation holds or waits on it.
    Reclaiming,
    /// Fixed number of gates shared by hash of the id.
    Sharded {
        /// Number of gates in the array.
        shards: NonZeroUsize,
    },
}

impl GatePolicy {
    /// Returns the policy name as used in configuration.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Retained => "retained",
            Self::Reclaiming => "reclaiming",
            Self::Sharded { .. } => "sharded",
        }
    }
}

/// Entry of the per-id gate table.
#[derive(Debug, Default)]
struct GateSlot {
    lock: Arc<Mutex<()>>,
    /// Operations holding or waiting on `lock`. Only maintained under
    /// [`GatePolicy::Reclaiming`].
    users: usize,
}

/// Registry of per-id gates.
///
/// The table itself is a [`DashMap`], so looking up or creating a gate
/// never takes a registry-wide lock; contention only happens between
/// operations on the same id (or the same shard).
pub struct LockRegistry {
    policy: GatePolicy,
    gates: DashMap<EntityId, GateSlot>,
    shards: Box<[Arc<Mutex<()>>]>,
}

impl LockRegistry {
    /// Creates an empty registry using the given policy.
    #[must_use]
    pub fn new(policy: GatePolicy) -> Self {
        let shards = match policy {
            GatePolicy::Sharded { shards } => (0..shards.get())
                .map(|_| Arc::new(Mutex::new(())))
                .collect(),
            GatePolicy::Retained | GatePolicy::Reclaiming => Box::default(),
        };
        Self {
            policy,
            gates: DashMap::new(),
            shards,
        }
    }

    /// Blocks until the gate for `id` is free and returns a guard holding
    /// it.
    ///
    /// There is no timeout and no cancellation. The gate is released when
    /// the guard is dropped.
    pub fn acquire(&self, id: &EntityId) -> GateGuard<'_> {
        match self.policy {
            GatePolicy::Sharded { .. } => GateGuard {
                guard: Some(self.shard_for(id).lock_arc()),
                reclaim: None,
            },
            GatePolicy::Retained => {
                // The shard lock on the table entry must be dropped before
                // blocking on the gate itself.
                let lock = Arc::clone(&self.gates.entry(id.clone()).or_default().lock);
                GateGuard {
                    guard: Some(lock.lock_arc()),
                    reclaim: None,
                }
            }
            GatePolicy::Reclaiming => {
                let lock = {
                    let mut slot = self.gates.entry(id.clone()).or_default();
                    slot.users = slot.users.saturating_add(1);
                    Arc::clone(&slot.lock)
                };
                GateGuard {
                    guard: Some(lock.lock_arc()),
                    reclaim: Some((&self.gates, id.clone())),
                }
            }
        }
    }

    /// Number of gates currently allocated.
    #[must_use]
    pub fn gate_count(&self) -> usize {
        match self.policy {
            GatePolicy::Sharded { .. } => self.shards.len(),
            GatePolicy::Retained | GatePolicy::Reclaiming => self.gates.len(),
        }
    }

    /// Drops every per-id gate.
    ///
    /// Guards already handed out stay valid and still release their own
    /// gate. The fixed shard array of [`GatePolicy::Sharded`] is not
    /// affected.
    pub fn clear(&self) {
        self.gates.clear();
    }

    #[allow(clippy::indexing_slicing)] // idx < shards.len(), which is non-zero under Sharded
    fn shard_for(&self, id: &EntityId) -> &Arc<Mutex<()>> {
        let hash = BuildHasherDefault::<DefaultHasher>::default().hash_one(id);
        let len = self.shards.len() as u64;
        let idx = usize::try_from(hash % len).unwrap_or_default();
        &self.shards[idx]
    }
}

impl Default for LockRegistry {
    fn default() -> Self {
        Self::new(GatePolicy::default())
    }
}

impl fmt::Debug for LockRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockRegistry")
            .field("policy", &self.policy)
            .field("gates", &self.gate_count())
            .finish()
    }
}

/// Scoped hold on one gate of a [`LockRegistry`].
///
/// Dropping the guard releases the gate exactly once.
#[must_use = "the gate is released as soon as the guard is dropped"]
pub struct GateGuard<'a> {
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
    reclaim: Option<(&'a DashMap<EntityId, GateSlot>, EntityId)>,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        // Unlock before touching the table so a waiter keeps the slot alive.
        drop(self.guard.take());
        if let Some((gates, id)) = self.reclaim.take() {
            gates.remove_if_mut(&id, |_, slot| {
                slot.users = slot.users.saturating_sub(1);
                slot.users == 0
            });
        }
    }
}

impl fmt::Debug for GateGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GateGuard")
            .field("held", &self.guard.is_some())
            .field("reclaiming", &self.reclaim.as_ref().map(|(_, id)| id))
            .finish()
    }
}
