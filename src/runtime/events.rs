//! Runtime event stream payloads.

use crate::types::{CollectionId, Revision};

/// Events emitted from the single-writer runtime loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionEvent {
    /// A new collection was appended.
    Added {
        /// New collection id.
        id: CollectionId,
    },
    /// Collections were removed.
    Deleted {
        /// Removed ids in former display order.
        ids: Vec<CollectionId>,
    },
    /// Display order changed.
    Moved,
    /// A favorite flag changed.
    FavoriteToggled {
        /// Collection id.
        id: CollectionId,
        /// New flag value.
        is_favorite: bool,
    },
    /// Name, note, or images of a collection changed.
    Updated {
        /// Collection id.
        id: CollectionId,
    },
    /// State up to this revision is on disk.
    Saved {
        /// Store revision that was written.
        revision: Revision,
    },
    /// Writing this revision failed; the in-memory state is ahead of disk.
    SaveFailed {
        /// Store revision that could not be written.
        revision: Revision,
        /// Rendered persistence error.
        message: String,
    },
}
