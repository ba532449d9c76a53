//! Entity store: per-id serialized mutations, persistence mirroring and
//! change broadcasting.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use parking_lot::{RwLock, RwLockWriteGuard};

use crate::config::StoreConfig;
use crate::domain::{
    ChangeKind, ChangeNotifier, Converter, Entity, EntityId, IdGenerator, LockRegistry,
    Subscription, UuidIds, View,
};
use crate::error::StoreError;
use crate::persistence::Persister;

/// Authoritative in-process store of entities keyed by [`EntityId`].
///
/// Every operation on an id runs while holding that id's gate from the
/// [`LockRegistry`], so add, update, remove and find on the same id are
/// linearized. Operations on different ids never wait on each other.
///
/// A mutation follows the pattern: acquire gate → validate against the
/// map → apply to the map → call the [`Persister`] → publish the view on
/// the matching [`ChangeNotifier`] → release gate.
///
/// # Failure semantics
///
/// Validation failures ([`StoreError::AlreadyExists`],
/// [`StoreError::NotFound`], [`StoreError::Conversion`]) leave the store
/// untouched and publish nothing. A persister failure is returned after
/// the in-memory change has been applied; it is not rolled back and no
/// notification is published, so the map and the backend may diverge.
///
/// # Lifecycle
///
/// [`EntityStore::close`] completes all change channels and drops all
/// gates. Calling any operation afterwards is a caller bug and is
/// rejected with [`StoreError::Closed`]. Dropping the store closes it.
pub struct EntityStore<E, V, C, P> {
    entities: DashMap<EntityId, Arc<RwLock<E>>>,
    gates: LockRegistry,
    added: ChangeNotifier<V>,
    updated: ChangeNotifier<V>,
    removed: ChangeNotifier<V>,
    converter: C,
    persister: P,
    ids: Box<dyn IdGenerator>,
    closed: AtomicBool,
}

impl<E, V, C, P> EntityStore<E, V, C, P>
where
    E: Entity,
    V: View,
    C: Converter<E, V>,
    P: Persister<E>,
{
    /// Creates an empty, open store.
    ///
    /// Ids handed out by [`EntityStore::next_id`] are random UUIDs until
    /// replaced with [`EntityStore::with_id_generator`].
    #[must_use]
    pub fn new(config: StoreConfig, converter: C, persister: P) -> Self {
        let capacity = config.subscriber_capacity;
        Self {
            entities: DashMap::new(),
            gates: LockRegistry::new(config.gate_policy),
            added: ChangeNotifier::new(ChangeKind::Added, capacity),
            updated: ChangeNotifier::new(ChangeKind::Updated, capacity),
            removed: ChangeNotifier::new(ChangeKind::Removed, capacity),
            converter,
            persister,
            ids: Box::new(UuidIds),
            closed: AtomicBool::new(false),
        }
    }

    /// Replaces the id generator used by [`EntityStore::next_id`].
    #[must_use]
    pub fn with_id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Box::new(ids);
        self
    }

    /// Mints a fresh id for a new entity.
    #[must_use]
    pub fn next_id(&self) -> EntityId {
        self.ids.next_id()
    }

    /// Returns the view of the entity with `id`, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] after [`EntityStore::close`].
    pub fn find(&self, id: &EntityId) -> Result<Option<V>, StoreError> {
        self.ensure_open()?;
        let _gate = self.gates.acquire(id);
        self.ensure_open()?;

        Ok(self
            .slot(id)
            .map(|slot| self.converter.to_view(&slot.read())))
    }

    /// Returns `true` if an entity with `id` is stored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] after [`EntityStore::close`].
    pub fn contains(&self, id: &EntityId) -> Result<bool, StoreError> {
        self.ensure_open()?;
        let _gate = self.gates.acquire(id);
        self.ensure_open()?;
        Ok(self.entities.contains_key(id))
    }

    /// Returns views of all stored entities, in no particular order.
    ///
    /// No gates are taken: entities added or removed concurrently may or
    /// may not be included. Each view is projected from a single
    /// consistent read of its entity.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] after [`EntityStore::close`].
    pub fn all(&self) -> Result<Vec<V>, StoreError> {
        self.ensure_open()?;
        let mut views = Vec::with_capacity(self.entities.len());
        for entry in self.entities.iter() {
            views.push(self.converter.to_view(&entry.value().read()));
        }
        Ok(views)
    }

    /// Inserts a new entity built from `view` and publishes `view` on the
    /// added channel.
    ///
    /// # Errors
    ///
    /// - [`StoreError::AlreadyExists`] if the id is already stored.
    /// - [`StoreError::Conversion`] if the converter rejects the view.
    /// - [`StoreError::Persistence`] if the persister fails; the entity
    ///   stays in the map.
    /// - [`StoreError::Closed`] after [`EntityStore::close`].
    pub fn add(&self, view: V) -> Result<(), StoreError> {
        let id = view.id().clone();
        self.ensure_open()?;
        let _gate = self.gates.acquire(&id);
        self.ensure_open()?;

        if self.entities.contains_key(&id) {
            tracing::warn!(entity_id = %id, "add rejected: entity already exists");
            return Err(StoreError::AlreadyExists(id));
        }

        let entity = self.build(&view)?;
        let slot = Arc::new(RwLock::new(entity));
        self.entities.insert(id.clone(), Arc::clone(&slot));

        self.persister
            .add(&slot.read())
            .map_err(|err| persistence_failure(&id, ChangeKind::Added, err))?;

        let delivered = self.added.publish(&view);
        tracing::debug!(entity_id = %id, kind = ChangeKind::Added.as_str(), delivered, "entity stored");
        Ok(())
    }

    /// Merges the entity built from `view` into the stored entity with the
    /// same id and publishes the merged view on the updated channel.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] if the id is not stored.
    /// - [`StoreError::Conversion`] if the converter rejects the view.
    /// - [`StoreError::Persistence`] if the persister fails; the merge
    ///   stays applied.
    /// - [`StoreError::Closed`] after [`EntityStore::close`].
    pub fn update(&self, view: V) -> Result<(), StoreError> {
        let id = view.id().clone();
        self.ensure_open()?;
        let _gate = self.gates.acquire(&id);
        self.ensure_open()?;

        let Some(slot) = self.slot(&id) else {
            tracing::warn!(entity_id = %id, "update rejected: entity not found");
            return Err(StoreError::NotFound(id));
        };

        let incoming = self.build(&view)?;
        let mut entity = slot.write();
        entity.merge_from(incoming);
        let entity = RwLockWriteGuard::downgrade(entity);

        self.persister
            .update(&entity)
            .map_err(|err| persistence_failure(&id, ChangeKind::Updated, err))?;

        let merged = self.converter.to_view(&entity);
        drop(entity);

        let delivered = self.updated.publish(&merged);
        tracing::debug!(entity_id = %id, kind = ChangeKind::Updated.as_str(), delivered, "entity stored");
        Ok(())
    }

    /// Removes the entity with `id` and publishes its last view on the
    /// removed channel.
    ///
    /// Removing an absent id is not an error: nothing happens and
    /// `Ok(false)` is returned.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Persistence`] if the persister fails; the entity
    ///   is already gone from the map.
    /// - [`StoreError::Closed`] after [`EntityStore::close`].
    pub fn remove(&self, id: &EntityId) -> Result<bool, StoreError> {
        self.ensure_open()?;
        let _gate = self.gates.acquire(id);
        self.ensure_open()?;

        let Some((_, slot)) = self.entities.remove(id) else {
            tracing::debug!(entity_id = %id, "remove ignored: entity not found");
            return Ok(false);
        };
        let last = self.converter.to_view(&slot.read());

        self.persister
            .remove(id)
            .map_err(|err| persistence_failure(id, ChangeKind::Removed, err))?;

        let delivered = self.removed.publish(&last);
        tracing::debug!(entity_id = %id, kind = ChangeKind::Removed.as_str(), delivered, "entity removed");
        Ok(true)
    }

    /// Subscribes to views of newly added entities.
    #[must_use]
    pub fn observe_added(&self) -> Subscription<V> {
        self.added.subscribe()
    }

    /// Subscribes to merged views of updated entities.
    #[must_use]
    pub fn observe_updated(&self) -> Subscription<V> {
        self.updated.subscribe()
    }

    /// Subscribes to the last views of removed entities.
    #[must_use]
    pub fn observe_removed(&self) -> Subscription<V> {
        self.removed.subscribe()
    }

    /// Subscribes to the channel for `kind`.
    #[must_use]
    pub fn observe(&self, kind: ChangeKind) -> Subscription<V> {
        self.notifier(kind).subscribe()
    }

    fn slot(&self, id: &EntityId) -> Option<Arc<RwLock<E>>> {
        self.entities.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Builds an entity from `view`, checking the converter kept the id.
    fn build(&self, view: &V) -> Result<E, StoreError> {
        let entity = self.converter.from_view(view).map_err(|err| {
            tracing::warn!(entity_id = %view.id(), error = %err, "view conversion failed");
            StoreError::Conversion(err)
        })?;
        if entity.id() != view.id() {
            return Err(StoreError::Conversion(anyhow::anyhow!(
                "converter produced entity {} for view {}",
                entity.id(),
                view.id()
            )));
        }
        Ok(entity)
    }
}

fn persistence_failure(id: &EntityId, kind: ChangeKind, err: anyhow::Error) -> StoreError {
    tracing::error!(entity_id = %id, kind = kind.as_str(), error = %err, "persister failed; store and backend may diverge");
    StoreError::Persistence(err)
}

impl<E, V, C, P> EntityStore<E, V, C, P> {
    /// Number of stored entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if no entity is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Number of live subscribers on the channel for `kind`.
    #[must_use]
    pub fn subscriber_count(&self, kind: ChangeKind) -> usize {
        self.notifier(kind).subscriber_count()
    }

    /// Number of gates currently allocated.
    #[must_use]
    pub fn gate_count(&self) -> usize {
        self.gates.gate_count()
    }

    /// Completes every change channel and drops every gate.
    ///
    /// Returns `true` on the first call and `false` afterwards; calling
    /// it again is harmless.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        for kind in ChangeKind::ALL {
            self.notifier(kind).close();
        }
        self.gates.clear();
        tracing::info!(entities = self.entities.len(), "entity store closed");
        true
    }

    /// Returns `true` once [`EntityStore::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    fn notifier(&self, kind: ChangeKind) -> &ChangeNotifier<V> {
        match kind {
            ChangeKind::Added => &self.added,
            ChangeKind::Updated => &self.updated,
            ChangeKind::Removed => &self.removed,
        }
    }
}

impl<E, V, C, P> Drop for EntityStore<E, V, C, P> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<E, V, C, P> fmt::Debug for EntityStore<E, V, C, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityStore")
            .field("entities", &self.entities.len())
            .field("gates", &self.gates)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
