//! Ordered personal photo collections with whole-state local persistence.
//!
//! # Examples
//!
//! In-memory usage with [`core::store::CollectionStore`]:
//! ```
//! use collection_store::{collection::CollectionDraft, core::store::CollectionStore};
//!
//! let mut store = CollectionStore::new();
//! let id = store.add(CollectionDraft::named("Winter")).expect("fresh store");
//! assert_eq!(store.toggle_favorite(id), Some(true));
//! assert_eq!(store.collections()[0].name, "Winter");
//! ```
//!
//! Runtime usage with a JSON file sink:
//! ```no_run
//! use collection_store::{
//!     collection::CollectionDraft,
//!     persist::file::FileStateSink,
//!     runtime::handle::{open_collections, RuntimeConfig},
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let sink = FileStateSink::in_data_dir("fusion-collective").expect("data dir");
//! let (handle, _outcome) = open_collections(Box::new(sink), RuntimeConfig::default());
//! let id = handle.add(CollectionDraft::named("Winter")).await.expect("add");
//! handle.toggle_favorite(id).await.expect("toggle");
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```
#![deny(missing_docs)]

/// Collection records, drafts, image payloads, and patches.
pub mod collection;
/// Core in-memory store and index helpers.
pub mod core;
/// Concurrent photo ingestion from an external source.
pub mod ingest;
/// Persistence abstraction with file and SQLite sinks.
pub mod persist;
/// Name search and favorites views.
pub mod query;
/// Single-writer runtime handle and events.
pub mod runtime;
/// Shared primitive types.
pub mod types;
