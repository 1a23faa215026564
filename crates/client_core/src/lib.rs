use std::{future::Future, sync::Arc};

use shared::{
    domain::{Item, ItemId},
    error::RemoteFailure,
    protocol::ItemBody,
};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

pub mod collection;
pub mod gateway;
pub mod projector;

pub use collection::{Collection, ItemSnapshot, ProvisionalKey};
pub use gateway::{
    HttpRemoteStore, RemoteResult, RemoteStore, StoreUrlError, UnavailableRemoteStore,
};
pub use projector::{project, FilterCriterion, UnknownFilter};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Remote(#[from] RemoteFailure),
    #[error("task text must not be empty")]
    EmptyTask,
    #[error("no item with id {0}")]
    UnknownItem(ItemId),
    #[error("item {0} is not yet confirmed by the store")]
    Unconfirmed(ItemId),
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Add,
    Remove,
    Update,
    SetCompletion,
}

/// Notifications for a presentation layer. `id` is the identifier the mutation
/// was applied under, which for adds is the provisional one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Applied {
        kind: MutationKind,
        id: ItemId,
    },
    Committed {
        kind: MutationKind,
        id: ItemId,
    },
    RolledBack {
        kind: MutationKind,
        id: ItemId,
        message: String,
    },
    Refreshed {
        count: usize,
    },
    RefreshFailed {
        message: String,
    },
}

/// What a mutation keeps between applying locally and settling.
trait PendingMutation {
    fn target(&self) -> ItemId;
}

struct PendingAdd {
    key: ProvisionalKey,
    applied: Item,
}

impl PendingMutation for PendingAdd {
    fn target(&self) -> ItemId {
        self.applied.id
    }
}

impl PendingMutation for ItemSnapshot {
    fn target(&self) -> ItemId {
        self.item.id
    }
}

struct PendingEdit {
    prior: ItemSnapshot,
    applied: Item,
}

impl PendingMutation for PendingEdit {
    fn target(&self) -> ItemId {
        self.applied.id
    }
}

#[derive(Default)]
struct EngineState {
    collection: Collection,
    last_error: Option<String>,
}

/// Owner of the local collection. Mutations apply immediately, then settle
/// against the remote store: committed on success, rolled back on failure.
///
/// Several mutations may be waiting on the store at once. Each one settles
/// only the item it touched, so a rollback never undoes another mutation's
/// local change.
pub struct Engine {
    store: Arc<dyn RemoteStore>,
    state: Mutex<EngineState>,
    events: broadcast::Sender<EngineEvent>,
}

impl Engine {
    pub fn new(store: Arc<dyn RemoteStore>) -> Arc<Self> {
        Self::with_items(store, Vec::new())
    }

    pub fn with_items(store: Arc<dyn RemoteStore>, items: Vec<Item>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            store,
            state: Mutex::new(EngineState {
                collection: Collection::new(items),
                last_error: None,
            }),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub async fn items(&self) -> Vec<Item> {
        self.state.lock().await.collection.items().to_vec()
    }

    pub async fn get(&self, id: ItemId) -> Option<Item> {
        self.state.lock().await.collection.get(id).cloned()
    }

    pub async fn view(&self, criterion: FilterCriterion) -> Vec<Item> {
        let guard = self.state.lock().await;
        project(guard.collection.items(), criterion)
    }

    pub async fn last_error(&self) -> Option<String> {
        self.state.lock().await.last_error.clone()
    }

    pub async fn clear_error(&self) {
        self.state.lock().await.last_error = None;
    }

    /// Replaces the collection with the store's list. Adds still in flight
    /// settle against the refreshed collection without duplicating items.
    pub async fn refresh(&self) -> Result<usize, EngineError> {
        match self.store.list().await {
            Ok(items) => {
                let count = {
                    let mut guard = self.state.lock().await;
                    guard.collection.reset(items);
                    guard.collection.len()
                };
                info!(count, "collection refreshed from store");
                let _ = self.events.send(EngineEvent::Refreshed { count });
                Ok(count)
            }
            Err(failure) => {
                self.state.lock().await.last_error = Some(failure.message.clone());
                warn!(error = %failure, "collection refresh failed");
                let _ = self.events.send(EngineEvent::RefreshFailed {
                    message: failure.message.clone(),
                });
                Err(EngineError::Remote(failure))
            }
        }
    }

    /// Appends a provisional item, then swaps it for the store's copy.
    pub async fn add(&self, task: &str) -> Result<Item, EngineError> {
        let task = non_empty_task(task)?;
        self.with_optimistic_apply(
            MutationKind::Add,
            |collection| {
                let (key, applied) = collection.insert_provisional(task).ok_or(
                    EngineError::InvalidState("cannot compute provisional identifier"),
                )?;
                Ok(PendingAdd { key, applied })
            },
            |pending| self.store.create(ItemBody::from(&pending.applied)),
            |collection, pending, confirmed: Item| {
                collection.confirm(pending.key, confirmed.clone());
                confirmed
            },
            |collection, pending| {
                collection.discard(pending.key);
            },
        )
        .await
    }

    pub async fn remove(&self, id: ItemId) -> Result<(), EngineError> {
        self.with_optimistic_apply(
            MutationKind::Remove,
            |collection| {
                confirmed_target(collection, id)?;
                collection.take(id).ok_or(EngineError::UnknownItem(id))
            },
            |snapshot| self.store.delete(snapshot.item.id),
            |_, _, ()| (),
            |collection, snapshot| collection.restore(snapshot),
        )
        .await
    }

    /// Edits the task text. Any text edit clears completion.
    pub async fn update(&self, id: ItemId, task: &str) -> Result<Item, EngineError> {
        let task = non_empty_task(task)?;
        self.edit(MutationKind::Update, id, move |item| item.retitled(task))
            .await
    }

    pub async fn set_completion(&self, id: ItemId, completed: bool) -> Result<Item, EngineError> {
        self.edit(MutationKind::SetCompletion, id, move |item| {
            item.clone().with_completed(completed)
        })
        .await
    }

    async fn edit(
        &self,
        kind: MutationKind,
        id: ItemId,
        change: impl FnOnce(&Item) -> Item,
    ) -> Result<Item, EngineError> {
        self.with_optimistic_apply(
            kind,
            |collection| {
                let current = confirmed_target(collection, id)?;
                let applied = change(current);
                let prior = collection
                    .replace(applied.clone())
                    .ok_or(EngineError::UnknownItem(id))?;
                Ok(PendingEdit { prior, applied })
            },
            |pending| {
                self.store
                    .update(pending.applied.id, ItemBody::from(&pending.applied))
            },
            |collection, pending, confirmed: Item| {
                // The request targeted `pending.applied.id`; never let the
                // response land on a different item.
                if confirmed.id != pending.applied.id {
                    warn!(
                        requested = %pending.applied.id,
                        returned = %confirmed.id,
                        "store answered an update with a different id"
                    );
                }
                let confirmed = Item {
                    id: pending.applied.id,
                    ..confirmed
                };
                collection.merge(confirmed.clone());
                confirmed
            },
            |collection, pending| collection.restore(pending.prior),
        )
        .await
    }

    /// Apply locally, await the store, then commit or compensate.
    ///
    /// `mutate_local` runs under the state lock and may refuse the mutation, in
    /// which case nothing is sent. The lock is released while the remote call
    /// is outstanding.
    async fn with_optimistic_apply<P, T, R, Fut>(
        &self,
        kind: MutationKind,
        mutate_local: impl FnOnce(&mut Collection) -> Result<P, EngineError>,
        remote_call: impl FnOnce(&P) -> Fut,
        on_commit: impl FnOnce(&mut Collection, P, T) -> R,
        on_rollback: impl FnOnce(&mut Collection, P),
    ) -> Result<R, EngineError>
    where
        P: PendingMutation,
        Fut: Future<Output = RemoteResult<T>>,
    {
        let (pending, call) = {
            let mut guard = self.state.lock().await;
            let pending = mutate_local(&mut guard.collection)?;
            let call = remote_call(&pending);
            (pending, call)
        };
        let id = pending.target();
        debug!(?kind, %id, "applied locally");
        let _ = self.events.send(EngineEvent::Applied { kind, id });

        match call.await {
            Ok(response) => {
                let committed = {
                    let mut guard = self.state.lock().await;
                    on_commit(&mut guard.collection, pending, response)
                };
                info!(?kind, %id, "mutation committed");
                let _ = self.events.send(EngineEvent::Committed { kind, id });
                Ok(committed)
            }
            Err(failure) => {
                {
                    let mut guard = self.state.lock().await;
                    on_rollback(&mut guard.collection, pending);
                    guard.last_error = Some(failure.message.clone());
                }
                warn!(?kind, %id, error = %failure, "mutation rolled back");
                let _ = self.events.send(EngineEvent::RolledBack {
                    kind,
                    id,
                    message: failure.message.clone(),
                });
                Err(EngineError::Remote(failure))
            }
        }
    }
}

fn non_empty_task(task: &str) -> Result<String, EngineError> {
    if task.trim().is_empty() {
        return Err(EngineError::EmptyTask);
    }
    Ok(task.to_string())
}

fn confirmed_target(collection: &Collection, id: ItemId) -> Result<&Item, EngineError> {
    let item = collection.get(id).ok_or(EngineError::UnknownItem(id))?;
    if collection.is_provisional(id) {
        return Err(EngineError::Unconfirmed(id));
    }
    Ok(item)
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
