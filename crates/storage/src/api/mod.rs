//! Storage backend API.
//!
//! This module defines the traits and types for pluggable storage backends.
//! The slashing protection store only relies on what these traits promise,
//! so any engine giving the same guarantees can be plugged in.
//!
//! # Traits
//!
//! - [`StorageBackend`]: Main trait for storage implementations. Creates read views and write batches.
//! - [`StorageReadView`]: Read-only snapshot access via `get` and `prefix_iterator`.
//! - [`StorageWriteBatch`]: Batched writes applied atomically on `commit`, discarded on drop.
//!
//! # Tables
//!
//! Storage is organized into [`Table`]s, each storing a different type of data.
//! All keys and values are byte slices (`&[u8]` / `Vec<u8>`).

mod tables;
mod traits;

#[cfg(any(feature = "rocksdb", test))]
pub use tables::ALL_TABLES;
pub use tables::Table;
pub use traits::{Error, PrefixResult, StorageBackend, StorageReadView, StorageWriteBatch};
