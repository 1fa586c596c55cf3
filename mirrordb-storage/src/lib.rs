//! MirrorDB Storage - Write-Through Mirror Cache
//!
//! Keeps an in-memory mirror consistent with an asynchronous, single-writer
//! key-value store and applies lifecycle events from the table layer to both.
//!
//! # Architecture
//!
//! ```text
//! EventRouter ──► handlers ──► MirrorCache (sync)
//!                     │
//!                     └──────► WriteQueue ──► StorageAdapter (async)
//! ```
//!
//! [`MirrorStore::open`] hydrates the mirror from the adapter before it
//! returns, so every read served afterwards reflects the stored state.

pub mod adapter;
mod handlers;
pub mod hydrate;
pub mod mirror;
pub mod store;
pub mod writer;

pub use adapter::{
    InMemoryAdapter, KeyStream, LmdbAdapter, LmdbAdapterError, LmdbConfig, SchemaInit,
    SchemaUpgrade, StorageAdapter,
};
pub use hydrate::{hydrate, HydrationReport};
pub use mirror::{MirrorCache, Snapshot, Watermark};
pub use store::{Durability, MirrorStore, RenameNotifiable};
pub use writer::{WriteOp, WriteQueue};
