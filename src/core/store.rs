use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    collection::{CollectionDraft, CollectionPatch, CollectionRecord},
    types::{CollectionId, Revision},
};

use super::indices::{PositionIndex, rebuild_positions};

/// Rejected store call. The store is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Two records in a snapshot share an id.
    #[error("duplicate collection id {0}")]
    DuplicateId(CollectionId),
    /// A source offset does not address a record.
    #[error("offset {offset} out of range for {len} collections")]
    OffsetOutOfRange {
        /// Offending offset.
        offset: usize,
        /// Number of records at call time.
        len: usize,
    },
    /// Every collection id has been handed out.
    #[error("collection ids exhausted")]
    IdsExhausted,
    /// A move destination lies past the end of the list.
    #[error("destination {destination} out of range for {len} collections")]
    DestinationOutOfRange {
        /// Offending destination.
        destination: usize,
        /// Number of records at call time.
        len: usize,
    },
}

/// Whole-state image of the store, as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Next id to hand out.
    pub next_id: CollectionId,
    /// Records in display order.
    pub collections: Vec<CollectionRecord>,
}

/// Ordered in-memory collection list with id lookup.
#[derive(Debug, Default)]
pub struct CollectionStore {
    records: Vec<CollectionRecord>,
    pos: PositionIndex,
    next_id: CollectionId,
    revision: Revision,
}

impl CollectionStore {
    /// Creates an empty store whose first id is 1.
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    /// Rebuilds a store from a snapshot, rejecting duplicate or exhausted ids.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Result<Self, StoreError> {
        let mut store = Self {
            records: snapshot.collections,
            next_id: snapshot.next_id.max(1),
            ..Self::default()
        };

        if let Some(id) = rebuild_positions(&mut store.pos, &store.records) {
            return Err(StoreError::DuplicateId(id));
        }

        let max_id = store.records.iter().map(|r| r.id).max().unwrap_or(0);
        let after_max = max_id.checked_add(1).ok_or(StoreError::IdsExhausted)?;
        store.next_id = store.next_id.max(after_max);
        Ok(store)
    }

    /// Clones the full state in display order.
    pub fn export_snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            next_id: self.next_id,
            collections: self.records.clone(),
        }
    }

    /// Appends a new non-favorite record and returns its id.
    ///
    /// Names are not checked: empty and duplicate names are accepted.
    pub fn add(&mut self, draft: CollectionDraft) -> Result<CollectionId, StoreError> {
        let id = self.next_id;
        self.next_id = id.checked_add(1).ok_or(StoreError::IdsExhausted)?;

        self.pos.insert(id, self.records.len());
        self.records.push(CollectionRecord {
            id,
            name: draft.name,
            note: draft.note,
            images: draft.images,
            is_favorite: false,
        });
        self.revision += 1;
        Ok(id)
    }

    /// Removes the record with `id`. Returns `None` when it is absent.
    pub fn delete(&mut self, id: CollectionId) -> Option<CollectionRecord> {
        let idx = self.position(id)?;
        let removed = self.records.remove(idx);
        self.reindex();
        self.revision += 1;
        Some(removed)
    }

    /// Removes the records at `offsets`. Repeated offsets count once.
    ///
    /// Returns the removed records in their former display order.
    pub fn delete_at(&mut self, offsets: &[usize]) -> Result<Vec<CollectionRecord>, StoreError> {
        let sources = self.checked_offsets(offsets)?;
        if sources.is_empty() {
            return Ok(Vec::new());
        }

        let mut removed: Vec<_> = sources
            .iter()
            .rev()
            .map(|&idx| self.records.remove(idx))
            .collect();
        removed.reverse();
        self.reindex();
        self.revision += 1;
        Ok(removed)
    }

    /// Moves the records at `offsets` so they sit before the record that was
    /// at `destination` before the move.
    ///
    /// `destination` is measured in the list as it was before removal, and
    /// `destination == len` moves to the end. Moved records keep their
    /// relative order. With `[A, B, C]`, moving `{0}` to `3` gives
    /// `[B, C, A]` and moving `{0}` to `2` gives `[B, A, C]`.
    ///
    /// Returns whether the order changed.
    pub fn move_to(&mut self, offsets: &[usize], destination: usize) -> Result<bool, StoreError> {
        let len = self.records.len();
        let sources = self.checked_offsets(offsets)?;
        if destination > len {
            return Err(StoreError::DestinationOutOfRange { destination, len });
        }
        if sources.is_empty() {
            return Ok(false);
        }

        let before: Vec<CollectionId> = self.ordered_ids();
        let shift = sources.iter().filter(|&&idx| idx < destination).count();

        let mut moved: Vec<_> = sources
            .iter()
            .rev()
            .map(|&idx| self.records.remove(idx))
            .collect();
        moved.reverse();

        let at = destination - shift;
        self.records.splice(at..at, moved);

        if self.records.iter().map(|r| r.id).eq(before.iter().copied()) {
            return Ok(false);
        }
        self.reindex();
        self.revision += 1;
        Ok(true)
    }

    /// Flips the favorite flag. Returns the new value, or `None` when absent.
    pub fn toggle_favorite(&mut self, id: CollectionId) -> Option<bool> {
        let rec = self.get_mut(id)?;
        rec.is_favorite = !rec.is_favorite;
        let now = rec.is_favorite;
        self.revision += 1;
        Some(now)
    }

    /// Sets the favorite flag. Returns false when `id` is absent.
    pub fn set_favorite(&mut self, id: CollectionId, is_favorite: bool) -> bool {
        let Some(rec) = self.get_mut(id) else {
            return false;
        };
        if rec.is_favorite != is_favorite {
            rec.is_favorite = is_favorite;
            self.revision += 1;
        }
        true
    }

    /// Applies `patch` to the record with `id`. Returns false when absent.
    pub fn update(&mut self, id: CollectionId, patch: CollectionPatch) -> bool {
        let empty = patch.is_empty();
        let Some(rec) = self.get_mut(id) else {
            return false;
        };
        if !empty {
            patch.apply_to(rec);
            self.revision += 1;
        }
        true
    }

    /// Looks up a record by id.
    pub fn get(&self, id: CollectionId) -> Option<&CollectionRecord> {
        self.position(id).map(|idx| &self.records[idx])
    }

    /// Cloning variant of [`Self::get`].
    pub fn get_cloned(&self, id: CollectionId) -> Option<CollectionRecord> {
        self.get(id).cloned()
    }

    /// Current display position of `id`.
    pub fn position(&self, id: CollectionId) -> Option<usize> {
        self.pos.get(&id).copied()
    }

    /// All records in display order.
    pub fn collections(&self) -> &[CollectionRecord] {
        &self.records
    }

    /// All ids in display order.
    pub fn ordered_ids(&self) -> Vec<CollectionId> {
        self.records.iter().map(|r| r.id).collect()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Count of state-changing calls since construction.
    pub fn revision(&self) -> Revision {
        self.revision
    }

    fn get_mut(&mut self, id: CollectionId) -> Option<&mut CollectionRecord> {
        let idx = self.position(id)?;
        self.records.get_mut(idx)
    }

    fn checked_offsets(&self, offsets: &[usize]) -> Result<Vec<usize>, StoreError> {
        let len = self.records.len();
        let sources: BTreeSet<usize> = offsets.iter().copied().collect();
        if let Some(&offset) = sources.iter().find(|&&o| o >= len) {
            return Err(StoreError::OffsetOutOfRange { offset, len });
        }
        Ok(sources.into_iter().collect())
    }

    fn reindex(&mut self) {
        let duplicate = rebuild_positions(&mut self.pos, &self.records);
        debug_assert!(duplicate.is_none(), "duplicate id {duplicate:?} in store");
    }
}
