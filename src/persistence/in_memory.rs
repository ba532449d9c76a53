//! In-memory implementation of the [`Persister`] port.
//!
//! Keeps the last persisted copy of every entity plus an append-only log
//! of accepted calls. Intended for tests and local development without a
//! real backend.

use std::collections::HashMap;
use std::fmt;

use chrono::Utc;
use parking_lot::Mutex;

use super::Persister;
use super::models::{PersistOp, PersistRecord};
use crate::domain::{Entity, EntityId};

struct Inner<E> {
    rows: HashMap<EntityId, E>,
    log: Vec<PersistRecord>,
}

impl<E> Inner<E> {
    fn record(&mut self, op: PersistOp, entity_id: EntityId) {
        let seq = u64::try_from(self.log.len())
            .unwrap_or(u64::MAX)
            .saturating_add(1);
        self.log.push(PersistRecord {
            seq,
            op,
            entity_id,
            recorded_at: Utc::now(),
        });
    }
}

/// Persister backed by a `HashMap` of cloned entities.
pub struct InMemoryPersister<E> {
    inner: Mutex<Inner<E>>,
}

impl<E> InMemoryPersister<E> {
    /// Creates an empty persister.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                rows: HashMap::new(),
                log: Vec::new(),
            }),
        }
    }

    /// Number of entities currently persisted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().rows.len()
    }

    /// Returns `true` if nothing is persisted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().rows.is_empty()
    }

    /// Returns `true` if an entity with `id` is persisted.
    #[must_use]
    pub fn contains(&self, id: &EntityId) -> bool {
        self.inner.lock().rows.contains_key(id)
    }

    /// Returns a copy of the call log.
    #[must_use]
    pub fn log(&self) -> Vec<PersistRecord> {
        self.inner.lock().log.clone()
    }
}

impl<E: Clone> InMemoryPersister<E> {
    /// Returns the last persisted copy of the entity with `id`.
    #[must_use]
    pub fn get(&self, id: &EntityId) -> Option<E> {
        self.inner.lock().rows.get(id).cloned()
    }
}

impl<E> Default for InMemoryPersister<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for InMemoryPersister<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("InMemoryPersister")
            .field("rows", &inner.rows.len())
            .field("log", &inner.log.len())
            .finish()
    }
}

impl<E: Entity + Clone> Persister<E> for InMemoryPersister<E> {
    fn add(&self, entity: &E) -> anyhow::Result<()> {
        let mut inner = self.inner.lock();
        let id = entity.id().clone();
        if inner.rows.contains_key(&id) {
            anyhow::bail!("entity {id} already persisted");
        }
        inner.rows.insert(id.clone(), entity.clone());
        inner.record(PersistOp::Add, id);
        Ok(())
    }

    fn update(&self, entity: &E) -> anyhow::Result<()> {
        let mut inner = self.inner.lock();
        let id = entity.id().clone();
        let Some(row) = inner.rows.get_mut(&id) else {
            anyhow::bail!("entity {id} is not persisted");
        };
        *row = entity.clone();
        inner.record(PersistOp::Update, id);
        Ok(())
    }

    fn remove(&self, id: &EntityId) -> anyhow::Result<()> {
        let mut inner = self.inner.lock();
        inner.rows.remove(id);
        inner.record(PersistOp::Remove, id.clone());
        Ok(())
    }
}
