//! Consumer-side views over the ordered collection list.

use crate::collection::CollectionRecord;

/// True when `query` is empty or a case-insensitive substring of the name.
pub fn matches_name(rec: &CollectionRecord, query: &str) -> bool {
    query.is_empty() || rec.name.to_lowercase().contains(&query.to_lowercase())
}

/// Records whose name matches `query`, in display order.
pub fn filter_by_name<'a>(records: &'a [CollectionRecord], query: &str) -> Vec<&'a CollectionRecord> {
    records.iter().filter(|rec| matches_name(rec, query)).collect()
}

/// Favorite records, in display order.
pub fn favorites(records: &[CollectionRecord]) -> Vec<&CollectionRecord> {
    records.iter().filter(|rec| rec.is_favorite).collect()
}
