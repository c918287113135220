// src/lib.rs

//! Local chunk store: content-addressed chunks kept in a set of mutually
//! consistent indexes over one ordered key-value engine.
//!
//! `LocalStore::set` moves a chunk between lifecycle states (accessed,
//! synced, removed, pinned, unpinned) with one atomic batch per call.

pub mod chunk;
pub mod common;
pub mod error;
pub mod item;
pub mod localstore;
pub mod store;

pub use chunk::Chunk;
pub use common::{Address, BIN_COUNT, MAX_PO, StoreConfig, Timestamp};
pub use error::{Result, StoreError};
pub use item::{ChunkState, Item, ModeSet};
pub use localstore::{BinSequencer, GcReport, IndexKind, LocalStore, PullItem};
pub use store::{Batch, InMemoryEngine, KvEngine};
