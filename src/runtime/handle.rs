use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot};
use tracing::warn;

use crate::{
    collection::{CollectionDraft, CollectionPatch, CollectionRecord},
    core::store::{CollectionStore, StoreError},
    persist::{LoadOutcome, PersistError, StateSink, load_or_empty},
    query,
    types::{CollectionId, Revision},
};

use super::events::CollectionEvent;

/// Failure of a runtime call.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The store rejected the call and nothing changed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The change was applied in memory but could not be saved.
    #[error(transparent)]
    Persist(#[from] PersistError),
    /// The runtime has shut down.
    #[error("collection runtime is not running")]
    ChannelClosed,
}

/// Runtime tuning knobs.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Save the whole state after every state-changing call.
    pub save_on_mutation: bool,
    /// Bound of the command queue feeding the writer task.
    pub command_queue_bound: usize,
    /// Per-subscriber buffer of the event channel.
    pub event_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            save_on_mutation: true,
            command_queue_bound: 256,
            event_capacity: 1024,
        }
    }
}

/// Result of the most recent save attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveStatus {
    /// The runtime has no sink; state lives in memory only.
    Detached,
    /// No save has been attempted yet.
    NeverSaved,
    /// The last save succeeded.
    Saved {
        /// Store revision that was written.
        revision: Revision,
    },
    /// The last save failed.
    Failed {
        /// Store revision that could not be written.
        revision: Revision,
        /// Rendered persistence error.
        message: String,
    },
}

/// Cloneable handle to the collection runtime, injected into every consumer.
#[derive(Clone)]
pub struct CollectionsHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<CollectionEvent>,
}

enum Command {
    Add {
        draft: CollectionDraft,
        resp: oneshot::Sender<Result<CollectionId, RuntimeError>>,
    },
    Delete {
        id: CollectionId,
        resp: oneshot::Sender<Result<bool, RuntimeError>>,
    },
    DeleteAt {
        offsets: Vec<usize>,
        resp: oneshot::Sender<Result<Vec<CollectionId>, RuntimeError>>,
    },
    Move {
        offsets: Vec<usize>,
        destination: usize,
        resp: oneshot::Sender<Result<bool, RuntimeError>>,
    },
    ToggleFavorite {
        id: CollectionId,
        resp: oneshot::Sender<Result<Option<bool>, RuntimeError>>,
    },
    SetFavorite {
        id: CollectionId,
        is_favorite: bool,
        resp: oneshot::Sender<Result<bool, RuntimeError>>,
    },
    Update {
        id: CollectionId,
        patch: CollectionPatch,
        resp: oneshot::Sender<Result<bool, RuntimeError>>,
    },
    Get {
        id: CollectionId,
        resp: oneshot::Sender<Option<CollectionRecord>>,
    },
    List {
        resp: oneshot::Sender<Vec<CollectionRecord>>,
    },
    Search {
        query: String,
        resp: oneshot::Sender<Vec<CollectionRecord>>,
    },
    Favorites {
        resp: oneshot::Sender<Vec<CollectionRecord>>,
    },
    Save {
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
    Status {
        resp: oneshot::Sender<SaveStatus>,
    },
    Shutdown {
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
}

/// Spawns the writer task owning `store`.
///
/// With a sink, every state-changing call is followed by a whole-state save
/// (unless disabled in `config`) and `shutdown` writes any unsaved changes.
pub fn spawn_collections(
    store: CollectionStore,
    sink: Option<Box<dyn StateSink>>,
    config: RuntimeConfig,
) -> CollectionsHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(config.command_queue_bound.max(1));
    let (events_tx, _) = broadcast::channel::<CollectionEvent>(config.event_capacity.max(1));

    let mut writer = Writer {
        status: if sink.is_some() {
            SaveStatus::NeverSaved
        } else {
            SaveStatus::Detached
        },
        store,
        sink: sink.map(|s| Arc::new(Mutex::new(s))),
        events_tx: events_tx.clone(),
        config,
        dirty: false,
    };

    tokio::spawn(async move {
        while let Some(cmd) = cmd_rx.recv().await {
            if writer.handle_command(cmd).await {
                return;
            }
        }
        // Every handle was dropped without shutdown.
        if writer.dirty && writer.save().await.is_err() {
            warn!("runtime stopped with unsaved collections");
        }
    });

    CollectionsHandle { cmd_tx, events_tx }
}

/// Loads the store from `sink` (empty on any load failure) and spawns the runtime.
pub fn open_collections(
    sink: Box<dyn StateSink>,
    config: RuntimeConfig,
) -> (CollectionsHandle, LoadOutcome) {
    let (store, outcome) = load_or_empty(&*sink);
    (spawn_collections(store, Some(sink), config), outcome)
}

impl CollectionsHandle {
    /// Subscribes to change and save events.
    pub fn subscribe(&self) -> broadcast::Receiver<CollectionEvent> {
        self.events_tx.subscribe()
    }

    /// Appends a new collection.
    pub async fn add(&self, draft: CollectionDraft) -> Result<CollectionId, RuntimeError> {
        self.request(|resp| Command::Add { draft, resp }).await?
    }

    /// Deletes by id. `Ok(false)` when the id is unknown.
    pub async fn delete(&self, id: CollectionId) -> Result<bool, RuntimeError> {
        self.request(|resp| Command::Delete { id, resp }).await?
    }

    /// Deletes by display positions and returns the removed ids.
    pub async fn delete_at(&self, offsets: impl Into<Vec<usize>>) -> Result<Vec<CollectionId>, RuntimeError> {
        let offsets = offsets.into();
        self.request(|resp| Command::DeleteAt { offsets, resp }).await?
    }

    /// Moves positions `offsets` before `destination`.
    /// See [`CollectionStore::move_to`] for offset semantics.
    pub async fn move_to(&self, offsets: impl Into<Vec<usize>>, destination: usize) -> Result<bool, RuntimeError> {
        let offsets = offsets.into();
        self.request(|resp| Command::Move {
            offsets,
            destination,
            resp,
        })
        .await?
    }

    /// Flips the favorite flag. `Ok(None)` when the id is unknown.
    pub async fn toggle_favorite(&self, id: CollectionId) -> Result<Option<bool>, RuntimeError> {
        self.request(|resp| Command::ToggleFavorite { id, resp }).await?
    }

    /// Sets the favorite flag. `Ok(false)` when the id is unknown.
    pub async fn set_favorite(&self, id: CollectionId, is_favorite: bool) -> Result<bool, RuntimeError> {
        self.request(|resp| Command::SetFavorite {
            id,
            is_favorite,
            resp,
        })
        .await?
    }

    /// Patches name, note, and/or images. `Ok(false)` when the id is unknown.
    pub async fn update(&self, id: CollectionId, patch: CollectionPatch) -> Result<bool, RuntimeError> {
        self.request(|resp| Command::Update { id, patch, resp }).await?
    }

    /// Fetches one collection.
    pub async fn get(&self, id: CollectionId) -> Result<Option<CollectionRecord>, RuntimeError> {
        self.request(|resp| Command::Get { id, resp }).await
    }

    /// All collections in display order.
    pub async fn list(&self) -> Result<Vec<CollectionRecord>, RuntimeError> {
        self.request(|resp| Command::List { resp }).await
    }

    /// Collections whose name contains `query`, ignoring case.
    pub async fn search(&self, query: impl Into<String>) -> Result<Vec<CollectionRecord>, RuntimeError> {
        let query = query.into();
        self.request(|resp| Command::Search { query, resp }).await
    }

    /// Favorite collections in display order.
    pub async fn favorites(&self) -> Result<Vec<CollectionRecord>, RuntimeError> {
        self.request(|resp| Command::Favorites { resp }).await
    }

    /// Writes the whole state now.
    pub async fn save(&self) -> Result<(), RuntimeError> {
        self.request(|resp| Command::Save { resp }).await?
    }

    /// Outcome of the most recent save attempt.
    pub async fn last_save_status(&self) -> Result<SaveStatus, RuntimeError> {
        self.request(|resp| Command::Status { resp }).await
    }

    /// Saves pending changes and stops the writer task.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.request(|resp| Command::Shutdown { resp }).await?
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }
}

struct Writer {
    store: CollectionStore,
    sink: Option<Arc<Mutex<Box<dyn StateSink>>>>,
    events_tx: broadcast::Sender<CollectionEvent>,
    config: RuntimeConfig,
    status: SaveStatus,
    dirty: bool,
}

impl Writer {
    async fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Add { draft, resp } => {
                let res = match self.store.add(draft) {
                    Ok(id) => {
                        self.emit(CollectionEvent::Added { id });
                        self.after_mutation().await.map(|_| id)
                    }
                    Err(err) => Err(err.into()),
                };
                let _ = resp.send(res);
            }
            Command::Delete { id, resp } => {
                let res = match self.store.delete(id) {
                    Some(_) => {
                        self.emit(CollectionEvent::Deleted { ids: vec![id] });
                        self.after_mutation().await.map(|_| true)
                    }
                    None => Ok(false),
                };
                let _ = resp.send(res);
            }
            Command::DeleteAt { offsets, resp } => {
                let res = match self.store.delete_at(&offsets) {
                    Ok(removed) if removed.is_empty() => Ok(Vec::new()),
                    Ok(removed) => {
                        let ids: Vec<_> = removed.iter().map(|r| r.id).collect();
                        self.emit(CollectionEvent::Deleted { ids: ids.clone() });
                        self.after_mutation().await.map(|_| ids)
                    }
                    Err(err) => Err(err.into()),
                };
                let _ = resp.send(res);
            }
            Command::Move {
                offsets,
                destination,
                resp,
            } => {
                let res = match self.store.move_to(&offsets, destination) {
                    Ok(true) => {
                        self.emit(CollectionEvent::Moved);
                        self.after_mutation().await.map(|_| true)
                    }
                    Ok(false) => Ok(false),
                    Err(err) => Err(err.into()),
                };
                let _ = resp.send(res);
            }
            Command::ToggleFavorite { id, resp } => {
                let res = match self.store.toggle_favorite(id) {
                    Some(is_favorite) => {
                        self.emit(CollectionEvent::FavoriteToggled { id, is_favorite });
                        self.after_mutation().await.map(|_| Some(is_favorite))
                    }
                    None => Ok(None),
                };
                let _ = resp.send(res);
            }
            Command::SetFavorite {
                id,
                is_favorite,
                resp,
            } => {
                let before = self.store.revision();
                let found = self.store.set_favorite(id, is_favorite);
                let res = if self.store.revision() != before {
                    self.emit(CollectionEvent::FavoriteToggled { id, is_favorite });
                    self.after_mutation().await.map(|_| found)
                } else {
                    Ok(found)
                };
                let _ = resp.send(res);
            }
            Command::Update { id, patch, resp } => {
                let before = self.store.revision();
                let found = self.store.update(id, patch);
                let res = if self.store.revision() != before {
                    self.emit(CollectionEvent::Updated { id });
                    self.after_mutation().await.map(|_| found)
                } else {
                    Ok(found)
                };
                let _ = resp.send(res);
            }
            Command::Get { id, resp } => {
                let _ = resp.send(self.store.get_cloned(id));
            }
            Command::List { resp } => {
                let _ = resp.send(self.store.collections().to_vec());
            }
            Command::Search { query: needle, resp } => {
                let found = query::filter_by_name(self.store.collections(), &needle)
                    .into_iter()
                    .cloned()
                    .collect();
                let _ = resp.send(found);
            }
            Command::Favorites { resp } => {
                let found = query::favorites(self.store.collections())
                    .into_iter()
                    .cloned()
                    .collect();
                let _ = resp.send(found);
            }
            Command::Save { resp } => {
                let _ = resp.send(self.save().await);
            }
            Command::Status { resp } => {
                let _ = resp.send(self.status.clone());
            }
            Command::Shutdown { resp } => {
                let out = if self.dirty { self.save().await } else { Ok(()) };
                let _ = resp.send(out);
                return true;
            }
        }

        false
    }

    fn emit(&self, event: CollectionEvent) {
        let _ = self.events_tx.send(event);
    }

    async fn after_mutation(&mut self) -> Result<(), RuntimeError> {
        if self.sink.is_none() {
            return Ok(());
        }
        self.dirty = true;
        if !self.config.save_on_mutation {
            return Ok(());
        }
        self.save().await
    }

    async fn save(&mut self) -> Result<(), RuntimeError> {
        let Some(sink) = self.sink.as_ref() else {
            return Ok(());
        };

        let snapshot = self.store.export_snapshot();
        let revision = self.store.revision();
        let sink_ref = Arc::clone(sink);
        let res = tokio::task::spawn_blocking(move || {
            let mut sink = sink_ref.blocking_lock();
            sink.save(&snapshot)
        })
        .await
        .map_err(|e| PersistError::Message(format!("join error: {e}")))
        .and_then(|inner| inner);

        match res {
            Ok(()) => {
                self.dirty = false;
                self.status = SaveStatus::Saved { revision };
                self.emit(CollectionEvent::Saved { revision });
                Ok(())
            }
            Err(err) => {
                let message = err.to_string();
                warn!("saving collections at revision {revision} failed: {message}");
                self.status = SaveStatus::Failed {
                    revision,
                    message: message.clone(),
                };
                self.emit(CollectionEvent::SaveFailed { revision, message });
                Err(err.into())
            }
        }
    }
}
