//! Shared primitive IDs.

/// Store-unique collection identifier. Never reused within a store's lifetime.
pub type CollectionId = u64;
/// Monotonic count of state-changing store calls.
pub type Revision = u64;
