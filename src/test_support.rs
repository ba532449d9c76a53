//! Fixtures shared by the unit tests.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::StoreConfig;
use crate::domain::{Converter, Entity, EntityId, View};
use crate::persistence::{InMemoryPersister, Persister};
use crate::service::EntityStore;

/// Entity whose merge replaces the body, bumps the revision and unions
/// the tags, so lost updates show up as missing tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub id: EntityId,
    pub body: String,
    pub revision: u32,
    pub tags: BTreeSet<String>,
}

impl Note {
    pub fn new(id: &str, body: &str, revision: u32) -> Self {
        Self {
            id: EntityId::new(id),
            body: body.to_string(),
            revision,
            tags: BTreeSet::new(),
        }
    }
}

impl Entity for Note {
    fn id(&self) -> &EntityId {
        &self.id
    }

    fn merge_from(&mut self, other: Self) {
        self.body = other.body;
        self.revision = self.revision.saturating_add(1);
        self.tags.extend(other.tags);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteView {
    pub id: EntityId,
    pub body: String,
    pub revision: u32,
    pub tags: Vec<String>,
}

impl NoteView {
    pub fn new(id: &str, body: &str) -> Self {
        Self {
            id: EntityId::new(id),
            body: body.to_string(),
            revision: 0,
            tags: Vec::new(),
        }
    }

    pub fn tagged(id: &str, body: &str, tag: &str) -> Self {
        Self {
            tags: vec![tag.to_string()],
            ..Self::new(id, body)
        }
    }
}

impl View for NoteView {
    fn id(&self) -> &EntityId {
        &self.id
    }
}

/// Rejects views with an empty body.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoteConverter;

impl Converter<Note, NoteView> for NoteConverter {
    fn to_view(&self, entity: &Note) -> NoteView {
        NoteView {
            id: entity.id.clone(),
            body: entity.body.clone(),
            revision: entity.revision,
            tags: entity.tags.iter().cloned().collect(),
        }
    }

    fn from_view(&self, view: &NoteView) -> anyhow::Result<Note> {
        if view.body.is_empty() {
            anyhow::bail!("note {} has an empty body", view.id);
        }
        Ok(Note {
            id: view.id.clone(),
            body: view.body.clone(),
            revision: view.revision,
            tags: view.tags.iter().cloned().collect(),
        })
    }
}

/// [`InMemoryPersister`] with switchable failures.
///
/// `update` counts itself in `updates_entered` and then waits on
/// `stall_update`, so a test holding that lock keeps the caller's gate
/// taken.
#[derive(Debug, Default)]
pub struct FlakyPersister {
    pub inner: InMemoryPersister<Note>,
    pub fail_add: AtomicBool,
    pub fail_update: AtomicBool,
    pub fail_remove: AtomicBool,
    pub stall_update: Mutex<()>,
    pub updates_entered: AtomicUsize,
}

impl FlakyPersister {
    fn check(flag: &AtomicBool, op: &str) -> anyhow::Result<()> {
        if flag.load(Ordering::SeqCst) {
            anyhow::bail!("backend unavailable during {op}");
        }
        Ok(())
    }
}

impl Persister<Note> for FlakyPersister {
    fn add(&self, entity: &Note) -> anyhow::Result<()> {
        Self::check(&self.fail_add, "add")?;
        self.inner.add(entity)
    }

    fn update(&self, entity: &Note) -> anyhow::Result<()> {
        self.updates_entered.fetch_add(1, Ordering::SeqCst);
        drop(self.stall_update.lock());
        Self::check(&self.fail_update, "update")?;
        self.inner.update(entity)
    }

    fn remove(&self, id: &EntityId) -> anyhow::Result<()> {
        Self::check(&self.fail_remove, "remove")?;
        self.inner.remove(id)
    }
}

pub type NoteStore = EntityStore<Note, NoteView, NoteConverter, Arc<FlakyPersister>>;

pub fn note_store(config: StoreConfig) -> (NoteStore, Arc<FlakyPersister>) {
    let persister = Arc::new(FlakyPersister::default());
    let store = EntityStore::new(config, NoteConverter, Arc::clone(&persister));
    (store, persister)
}
