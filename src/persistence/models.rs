//! Records kept by the in-memory persister.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::EntityId;

/// Persister call kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistOp {
    /// [`super::Persister::add`].
    Add,
    /// [`super::Persister::update`].
    Update,
    /// [`super::Persister::remove`].
    Remove,
}

/// One accepted persister call, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistRecord {
    /// Position in the log, starting at 1.
    pub seq: u64,
    /// Which call was made.
    pub op: PersistOp,
    /// Entity the call targeted.
    pub entity_id: EntityId,
    /// When the call was accepted.
    pub recorded_at: DateTime<Utc>,
}
