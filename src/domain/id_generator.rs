//! Pluggable identifier minting.
//!
//! The store never invents ids on its own. Callers (or the store on their
//! behalf, see [`crate::service::EntityStore::next_id`]) obtain fresh ids
//! from an injected [`IdGenerator`], which lets tests substitute a
//! deterministic sequence.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::EntityId;

/// Strategy for minting new, unique entity identifiers.
pub trait IdGenerator: Send + Sync {
    /// Returns an identifier that has never been returned before by this
    /// generator.
    fn next_id(&self) -> EntityId;
}

/// Random UUID v4 identifiers. The default generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_id(&self) -> EntityId {
        EntityId::from(uuid::Uuid::new_v4())
    }
}

/// Deterministic `"{prefix}-{n}"` identifiers, starting at 1.
pub struct SequentialIds {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIds {
    /// Creates a generator producing `prefix-1`, `prefix-2`, ...
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl fmt::Debug for SequentialIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequentialIds")
            .field("prefix", &self.prefix)
            .field("next", &self.next.load(Ordering::Relaxed))
            .finish()
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> EntityId {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        EntityId::new(format!("{}-{n}", self.prefix))
    }
}
