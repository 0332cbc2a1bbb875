//! In-memory authoritative store and index helpers.

/// Id-to-position index helpers.
pub mod indices;
/// Authoritative ordered collection store.
pub mod store;
