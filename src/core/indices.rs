use hashbrown::HashMap;

use crate::{collection::CollectionRecord, types::CollectionId};

/// Maps a collection id to its current position in the ordered list.
pub type PositionIndex = HashMap<CollectionId, usize>;

/// Rebuilds `index` from `records`, returning the first id seen twice.
pub fn rebuild_positions(
    index: &mut PositionIndex,
    records: &[CollectionRecord],
) -> Option<CollectionId> {
    index.clear();
    let mut duplicate = None;
    for (idx, rec) in records.iter().enumerate() {
        if index.insert(rec.id, idx).is_some() && duplicate.is_none() {
            duplicate = Some(rec.id);
        }
    }
    duplicate
}
