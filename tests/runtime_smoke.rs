use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use tempfile::TempDir;

use collection_store::{
    collection::{CollectionDraft, CollectionPatch, ImageBlob},
    core::store::{CollectionStore, StoreError, StoreSnapshot},
    persist::{
        LoadOutcome, PersistError, PersistResult, StateSink, file::FileStateSink,
    },
    runtime::{
        events::CollectionEvent,
        handle::{RuntimeConfig, RuntimeError, SaveStatus, open_collections, spawn_collections},
    },
};

#[derive(Clone, Default)]
struct MemorySink {
    saved: Arc<Mutex<Vec<StoreSnapshot>>>,
    fail: Arc<Mutex<bool>>,
}

impl StateSink for MemorySink {
    fn load(&self) -> PersistResult<Option<StoreSnapshot>> {
        Ok(self.saved.lock().expect("lock").last().cloned())
    }

    fn save(&mut self, snapshot: &StoreSnapshot) -> PersistResult<()> {
        if *self.fail.lock().expect("lock") {
            return Err(PersistError::Message("disk full".to_string()));
        }
        self.saved.lock().expect("lock").push(snapshot.clone());
        Ok(())
    }
}

async fn next_events(
    sub: &mut tokio::sync::broadcast::Receiver<CollectionEvent>,
    n: usize,
) -> Vec<CollectionEvent> {
    let mut seen = Vec::new();
    for _ in 0..n {
        let evt = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .expect("event")
            .expect("recv");
        seen.push(evt);
    }
    seen
}

#[tokio::test]
async fn runtime_mutations_query_and_events_ordered() {
    let handle = spawn_collections(CollectionStore::new(), None, RuntimeConfig::default());
    let mut sub = handle.subscribe();

    let id = handle.add(CollectionDraft::named("Winter")).await.expect("add");
    assert_eq!(handle.toggle_favorite(id).await.expect("toggle"), Some(true));
    handle
        .update(
            id,
            CollectionPatch {
                note: Some("cold".to_string()),
                ..CollectionPatch::default()
            },
        )
        .await
        .expect("update");

    let rec = handle.get(id).await.expect("get").expect("record");
    assert_eq!(rec.note, "cold");
    assert!(rec.is_favorite);

    assert_eq!(
        next_events(&mut sub, 3).await,
        vec![
            CollectionEvent::Added { id },
            CollectionEvent::FavoriteToggled {
                id,
                is_favorite: true
            },
            CollectionEvent::Updated { id },
        ]
    );
    assert_eq!(
        handle.last_save_status().await.expect("status"),
        SaveStatus::Detached
    );

    handle.shutdown().await.expect("shutdown");
    assert!(matches!(
        handle.list().await,
        Err(RuntimeError::ChannelClosed)
    ));
}

#[tokio::test]
async fn every_mutation_is_saved_and_no_ops_are_not() {
    let sink = MemorySink::default();
    let saved = Arc::clone(&sink.saved);
    let handle = spawn_collections(CollectionStore::new(), Some(Box::new(sink)), RuntimeConfig::default());
    let mut sub = handle.subscribe();

    let a = handle.add(CollectionDraft::named("A")).await.expect("add");
    let b = handle.add(CollectionDraft::named("B")).await.expect("add");
    assert_eq!(saved.lock().expect("lock").len(), 2);

    assert!(!handle.delete(999).await.expect("delete unknown"));
    assert_eq!(handle.toggle_favorite(999).await.expect("toggle unknown"), None);
    assert!(!handle.move_to(vec![0], 0).await.expect("noop move"));
    assert_eq!(saved.lock().expect("lock").len(), 2);

    assert!(handle.move_to(vec![0], 2).await.expect("move"));
    let last = saved.lock().expect("lock").last().cloned().expect("snapshot");
    let order: Vec<_> = last.collections.iter().map(|r| r.id).collect();
    assert_eq!(order, vec![b, a]);

    assert!(handle.set_favorite(b, true).await.expect("set favorite"));
    assert!(handle.set_favorite(b, true).await.expect("same favorite"));
    assert!(!handle.set_favorite(999, true).await.expect("set unknown"));
    assert_eq!(saved.lock().expect("lock").len(), 4);

    assert_eq!(handle.delete_at(vec![1, 1]).await.expect("delete_at"), vec![a]);
    assert!(handle.delete_at(Vec::new()).await.expect("empty delete_at").is_empty());
    assert_eq!(saved.lock().expect("lock").len(), 5);

    assert!(handle.delete(b).await.expect("delete"));
    assert_eq!(saved.lock().expect("lock").len(), 6);
    assert!(saved.lock().expect("lock").last().expect("snapshot").collections.is_empty());

    let events = next_events(&mut sub, 12).await;
    assert_eq!(events[0], CollectionEvent::Added { id: a });
    assert_eq!(events[2], CollectionEvent::Added { id: b });
    assert_eq!(events[4], CollectionEvent::Moved);
    assert_eq!(
        events[6],
        CollectionEvent::FavoriteToggled {
            id: b,
            is_favorite: true
        }
    );
    assert_eq!(events[8], CollectionEvent::Deleted { ids: vec![a] });
    assert_eq!(events[10], CollectionEvent::Deleted { ids: vec![b] });
    for (n, evt) in events.iter().enumerate().filter(|(n, _)| n % 2 == 1) {
        assert_eq!(*evt, CollectionEvent::Saved { revision: (n as u64 + 1) / 2 });
    }
    assert!(matches!(
        handle.last_save_status().await.expect("status"),
        SaveStatus::Saved { revision: 6 }
    ));

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn save_failure_is_surfaced_without_losing_memory_state() {
    let sink = MemorySink::default();
    let fail = Arc::clone(&sink.fail);
    let handle = spawn_collections(CollectionStore::new(), Some(Box::new(sink)), RuntimeConfig::default());
    let mut sub = handle.subscribe();

    *fail.lock().expect("lock") = true;
    let res = handle.add(CollectionDraft::named("Unsaved")).await;
    assert!(matches!(res, Err(RuntimeError::Persist(_))));

    let events = next_events(&mut sub, 2).await;
    assert!(matches!(events[0], CollectionEvent::Added { .. }));
    assert!(matches!(events[1], CollectionEvent::SaveFailed { .. }));

    assert_eq!(handle.list().await.expect("list").len(), 1);
    assert!(matches!(
        handle.last_save_status().await.expect("status"),
        SaveStatus::Failed { .. }
    ));

    *fail.lock().expect("lock") = false;
    handle.save().await.expect("retry save");
    assert!(matches!(
        handle.last_save_status().await.expect("status"),
        SaveStatus::Saved { revision: 1 }
    ));

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn store_errors_pass_through() {
    let handle = spawn_collections(CollectionStore::new(), None, RuntimeConfig::default());
    handle.add(CollectionDraft::named("Only")).await.expect("add");

    let err = handle.move_to(vec![4], 0).await.expect_err("bad offset");
    assert!(matches!(
        err,
        RuntimeError::Store(StoreError::OffsetOutOfRange { offset: 4, len: 1 })
    ));
    let err = handle.delete_at(vec![1]).await.expect_err("bad offset");
    assert!(matches!(err, RuntimeError::Store(_)));

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn deferred_saves_flush_on_shutdown() {
    let tmp = TempDir::new().expect("tmp");
    let cfg = RuntimeConfig {
        save_on_mutation: false,
        ..RuntimeConfig::default()
    };

    let (handle, outcome) = open_collections(Box::new(FileStateSink::open(tmp.path())), cfg);
    assert!(matches!(outcome, LoadOutcome::Fresh));
    let id = handle
        .add(CollectionDraft {
            name: "Garden".to_string(),
            note: String::new(),
            images: vec![ImageBlob::new(vec![1, 2]), ImageBlob::new(vec![3])],
        })
        .await
        .expect("add");
    assert!(!FileStateSink::open(tmp.path()).path().exists());
    handle.shutdown().await.expect("shutdown");

    let (handle, outcome) =
        open_collections(Box::new(FileStateSink::open(tmp.path())), RuntimeConfig::default());
    assert!(matches!(outcome, LoadOutcome::Loaded { count: 1 }));
    assert_eq!(
        handle.favorites().await.expect("favorites").len(),
        0
    );
    let found = handle.search("GARD").await.expect("search");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, id);
    assert_eq!(found[0].images.len(), 2);

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn dropping_every_handle_flushes_unsaved_changes() {
    let tmp = TempDir::new().expect("tmp");
    let cfg = RuntimeConfig {
        save_on_mutation: false,
        ..RuntimeConfig::default()
    };

    let (handle, _) = open_collections(Box::new(FileStateSink::open(tmp.path())), cfg);
    let id = handle.add(CollectionDraft::named("Garden")).await.expect("add");
    let path = FileStateSink::open(tmp.path()).path();
    assert!(!path.exists());
    drop(handle);

    tokio::time::timeout(Duration::from_secs(2), async {
        while !path.exists() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("flushed after drop");

    let (handle, outcome) =
        open_collections(Box::new(FileStateSink::open(tmp.path())), RuntimeConfig::default());
    assert!(matches!(outcome, LoadOutcome::Loaded { count: 1 }));
    assert_eq!(handle.get(id).await.expect("get").expect("record").name, "Garden");
    handle.shutdown().await.expect("shutdown");
}
