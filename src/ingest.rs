//! Concurrent photo loading with selection-order results.
//!
//! Each selected item loads on its own task and only ever writes its own
//! slot. Results are merged in selection order once every load settles, so
//! completion order never leaks into the image sequence. Nothing here touches
//! the store: callers hand the merged images to an update when the user saves.

use std::{future::Future, sync::Arc};

use thiserror::Error;
use tokio::task::JoinSet;
use tracing::warn;

use crate::collection::ImageBlob;

/// Failure to load one selected photo.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    /// The source produced no bytes.
    #[error("photo source returned an empty payload")]
    Empty,
    /// The source reported a failure.
    #[error("photo source failed: {0}")]
    Source(String),
    /// The load task died before producing a result.
    #[error("photo load aborted")]
    Aborted,
}

/// External provider of encoded image bytes, e.g. a platform photo picker.
pub trait PhotoSource: Send + Sync + 'static {
    /// Handle for one user-selected item.
    type Item: Send + 'static;

    /// Loads the encoded bytes for `item`.
    fn load(&self, item: Self::Item) -> impl Future<Output = Result<ImageBlob, IngestError>> + Send;
}

/// Outcome of a finished [`IngestBatch`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IngestReport {
    /// Loaded images in selection order, failures skipped.
    pub images: Vec<ImageBlob>,
    /// Selection index and error of every failed item.
    pub failed: Vec<(usize, IngestError)>,
}

type Slot = Option<Result<ImageBlob, IngestError>>;

/// In-flight loads for one selection.
///
/// Dropping the batch aborts every pending load and discards its result.
pub struct IngestBatch {
    tasks: JoinSet<(usize, Result<ImageBlob, IngestError>)>,
    slots: Vec<Slot>,
}

impl IngestBatch {
    /// Spawns one load per item. Must be called within a tokio runtime.
    pub fn start<S: PhotoSource>(source: Arc<S>, items: impl IntoIterator<Item = S::Item>) -> Self {
        let mut tasks = JoinSet::new();
        let mut count = 0usize;
        for (idx, item) in items.into_iter().enumerate() {
            let source = Arc::clone(&source);
            tasks.spawn(async move {
                let res = source.load(item).await.and_then(|blob| {
                    if blob.is_empty() {
                        Err(IngestError::Empty)
                    } else {
                        Ok(blob)
                    }
                });
                (idx, res)
            });
            count += 1;
        }

        Self {
            tasks,
            slots: vec![None; count],
        }
    }

    /// Number of selected items.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when nothing was selected.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Loads that have not settled yet.
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Waits for every load and merges results in selection order.
    pub async fn finish(mut self) -> IngestReport {
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((idx, res)) => self.slots[idx] = Some(res),
                Err(err) => warn!("photo load task failed: {err}"),
            }
        }

        let mut report = IngestReport::default();
        for (idx, slot) in std::mem::take(&mut self.slots).into_iter().enumerate() {
            match slot.unwrap_or(Err(IngestError::Aborted)) {
                Ok(blob) => report.images.push(blob),
                Err(err) => report.failed.push((idx, err)),
            }
        }
        report
    }
}

/// Loads `items` from `source` and returns the merged report.
pub async fn ingest<S: PhotoSource>(source: Arc<S>, items: impl IntoIterator<Item = S::Item>) -> IngestReport {
    IngestBatch::start(source, items).finish().await
}
