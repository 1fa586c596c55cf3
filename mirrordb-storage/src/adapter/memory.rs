//! Volatile in-memory adapter.
//!
//! Useful for tests and for stores that only need the event/mirror machinery
//! without durability across restarts.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use mirrordb_core::{Record, StoreError, StoreResult, Value};

use super::traits::{KeyStream, SchemaInit, SchemaUpgrade, StorageAdapter};

/// In-memory [`StorageAdapter`].
///
/// Uses tokio::sync::RwLock for safe async access.
#[derive(Debug, Default)]
pub struct InMemoryAdapter {
    records: tokio::sync::RwLock<BTreeMap<String, Value>>,
    version: AtomicU32,
}

impl InMemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an adapter pre-populated with `records`.
    pub fn with_records<I, K>(records: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let records = records.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self {
            records: tokio::sync::RwLock::new(records),
            version: AtomicU32::new(0),
        }
    }

    /// Value currently stored under `key`.
    pub async fn stored(&self, key: &str) -> Option<Value> {
        self.records.read().await.get(key).cloned()
    }

    /// Copy of every stored record.
    pub async fn contents(&self) -> BTreeMap<String, Value> {
        self.records.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Schema version recorded by the last successful open (0 if never opened).
    pub fn version(&self) -> u32 {
        self.version.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageAdapter for InMemoryAdapter {
    async fn open(&self, version: u32, on_schema_init: Option<SchemaInit>) -> StoreResult<()> {
        let stored = self.version.load(Ordering::SeqCst);
        if version < stored {
            return Err(StoreError::unavailable(format!(
                "requested version {} is older than stored version {}",
                version, stored
            )));
        }
        if version > stored {
            self.version.store(version, Ordering::SeqCst);
            if let Some(init) = on_schema_init {
                init(SchemaUpgrade {
                    old_version: stored,
                    new_version: version,
                });
            }
        }
        Ok(())
    }

    fn scan(&self) -> KeyStream<'_> {
        stream::once(async move {
            self.records
                .read()
                .await
                .keys()
                .cloned()
                .collect::<Vec<_>>()
        })
        .flat_map(|keys| stream::iter(keys.into_iter().map(Ok)))
        .boxed()
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Record>> {
        Ok(self
            .records
            .read()
            .await
            .get(key)
            .map(|value| Record::new(key, value.clone())))
    }

    async fn put(&self, record: Record) -> StoreResult<()> {
        self.records.write().await.insert(record.key, record.value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.records.write().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> StoreResult<()> {
        self.records.write().await.clear();
        Ok(())
    }
}
