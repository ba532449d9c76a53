//! keyed-store demo entry point.
//!
//! Embeds an [`EntityStore`] of tasks, attaches a logging observer to each
//! change channel and drives the store from several blocking worker
//! threads.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use keyed_store::config::parse_env;
use keyed_store::persistence::InMemoryPersister;
use keyed_store::{
    ChangeKind, Converter, Entity, EntityId, EntityStore, StoreConfig, StoreError, Subscription,
    View,
};

/// Demo entity: a to-do item.
#[derive(Debug, Clone)]
struct Task {
    id: EntityId,
    title: String,
    done: bool,
    updated_at: DateTime<Utc>,
}

impl Entity for Task {
    fn id(&self) -> &EntityId {
        &self.id
    }

    fn merge_from(&mut self, other: Self) {
        self.title = other.title;
        self.done = other.done;
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TaskView {
    id: EntityId,
    title: String,
    done: bool,
    updated_at: Option<DateTime<Utc>>,
}

impl View for TaskView {
    fn id(&self) -> &EntityId {
        &self.id
    }
}

struct TaskConverter;

impl Converter<Task, TaskView> for TaskConverter {
    fn to_view(&self, entity: &Task) -> TaskView {
        TaskView {
            id: entity.id.clone(),
            title: entity.title.clone(),
            done: entity.done,
            updated_at: Some(entity.updated_at),
        }
    }

    fn from_view(&self, view: &TaskView) -> anyhow::Result<Task> {
        anyhow::ensure!(!view.title.trim().is_empty(), "task title must not be empty");
        Ok(Task {
            id: view.id.clone(),
            title: view.title.clone(),
            done: view.done,
            updated_at: view.updated_at.unwrap_or_else(Utc::now),
        })
    }
}

type TaskStore = EntityStore<Task, TaskView, TaskConverter, Arc<InMemoryPersister<Task>>>;

/// Logs every view arriving on `subscription` until the channel completes.
async fn log_changes(mut subscription: Subscription<TaskView>) -> usize {
    let kind = subscription.kind();
    let mut seen = 0usize;
    while let Some(view) = subscription.next().await {
        seen = seen.saturating_add(1);
        let json = serde_json::to_string(&view).unwrap_or_default();
        tracing::info!(kind = kind.as_str(), entity_id = %view.id, %json, "change observed");
    }
    tracing::info!(kind = kind.as_str(), seen, "change stream completed");
    seen
}

/// Creates, edits and completes `count` tasks, then deletes every other one.
fn run_worker(store: &TaskStore, worker: usize, count: usize) -> Result<(), StoreError> {
    for n in 0..count {
        let id = store.next_id();
        let view = TaskView {
            id: id.clone(),
            title: format!("worker {worker} task {n}"),
            done: false,
            updated_at: None,
        };
        store.add(view.clone())?;
        store.update(TaskView {
            done: true,
            ..view
        })?;
        if n % 2 == 0 {
            store.remove(&id)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_format: String = parse_env("STORE_LOG_FORMAT", "text".to_string());
    if log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    // Load configuration
    let config = StoreConfig::from_env()?;
    let workers: usize = parse_env("STORE_DEMO_WORKERS", 4);
    tracing::info!(
        gate_policy = config.gate_policy.as_str(),
        subscriber_capacity = ?config.subscriber_capacity,
        workers,
        "starting keyed-store demo"
    );

    let persister = Arc::new(InMemoryPersister::new());
    let store: Arc<TaskStore> = Arc::new(EntityStore::new(
        config,
        TaskConverter,
        Arc::clone(&persister),
    ));

    let mut observers = Vec::with_capacity(ChangeKind::ALL.len());
    for kind in ChangeKind::ALL {
        observers.push(tokio::spawn(log_changes(store.observe(kind))));
    }

    // The store blocks the calling thread, so drive it off the async runtime.
    let mut handles = Vec::with_capacity(workers);
    for worker in 0..workers {
        let store = Arc::clone(&store);
        handles.push(tokio::task::spawn_blocking(move || {
            run_worker(&store, worker, 5)
        }));
    }
    for handle in handles {
        handle.await??;
    }

    let remaining = store.all()?;
    tracing::info!(
        stored = remaining.len(),
        persisted = persister.len(),
        log = persister.log().len(),
        gates = store.gate_count(),
        "workers finished"
    );

    store.close();
    for observer in observers {
        observer.await?;
    }

    Ok(())
}
