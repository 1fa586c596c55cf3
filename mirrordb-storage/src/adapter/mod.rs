//! Backing store adapters.
//!
//! [`StorageAdapter`] is the only boundary between the mirror and a
//! persistence engine. Two implementations ship with the crate:
//!
//! - [`LmdbAdapter`]: durable, backed by LMDB through heed
//! - [`InMemoryAdapter`]: volatile, for tests and ephemeral stores

pub mod lmdb;
pub mod memory;
pub mod traits;

pub use lmdb::{LmdbAdapter, LmdbAdapterError, LmdbConfig};
pub use memory::InMemoryAdapter;
pub use traits::{KeyStream, SchemaInit, SchemaUpgrade, StorageAdapter};
