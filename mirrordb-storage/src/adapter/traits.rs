//! Backing store adapter trait.
//!
//! The mirror never talks to a persistence engine directly. Everything it
//! needs from durable storage is captured by [`StorageAdapter`]: open the
//! single container, enumerate its keys, and get/put/delete/clear records.

use std::fmt;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use mirrordb_core::{Record, StoreResult};

/// Lazy, finite, non-restartable sequence of stored keys.
pub type KeyStream<'a> = BoxStream<'a, StoreResult<String>>;

/// Version transition reported to a [`SchemaInit`] hook.
///
/// `old_version` is 0 when the container did not exist before.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaUpgrade {
    pub old_version: u32,
    pub new_version: u32,
}

impl SchemaUpgrade {
    /// Whether the container was created by this open.
    pub fn is_fresh(&self) -> bool {
        self.old_version == 0
    }
}

impl fmt::Display for SchemaUpgrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{} -> v{}", self.old_version, self.new_version)
    }
}

/// Caller-supplied schema bootstrap, invoked at most once per version upgrade.
pub type SchemaInit = Box<dyn FnOnce(SchemaUpgrade) + Send>;

/// Asynchronous key-value backend holding exactly one record type.
///
/// # Contract
///
/// - `open` creates the container under a fixed logical name exactly once and
///   fails with `StoreError::AdapterUnavailable` if it cannot.
/// - Every other operation completes independently; operations on different
///   keys may complete in any order, but each one is applied atomically.
/// - `scan` yields every stored key once, in unspecified order.
/// - Per-operation failures are reported as `StoreError::OperationFailed`.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Open or create the container at `version`.
    async fn open(&self, version: u32, on_schema_init: Option<SchemaInit>) -> StoreResult<()>;

    /// Open a read cursor over every stored key.
    fn scan(&self) -> KeyStream<'_>;

    /// Fetch the full record stored under `key`.
    async fn get(&self, key: &str) -> StoreResult<Option<Record>>;

    /// Store `record`, replacing any previous record with the same key.
    async fn put(&self, record: Record) -> StoreResult<()>;

    /// Delete the record under `key`. Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Delete every record.
    async fn clear(&self) -> StoreResult<()>;
}
