//! The public facade.
//!
//! A [`MirrorStore`] owns the mirror, the write queue and the handler table
//! registered on its [`EventRouter`]. Reads are served synchronously from the
//! mirror; writes go through the queue.
//!
//! # Ordering
//!
//! - `set_item` updates the mirror at once, then queues the durable put.
//! - `remove_item` and `clear` queue the durable operation first and touch
//!   the mirror only when the backing store acknowledges it.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use mirrordb_core::{
    serialized_len, Completion, Record, StoreConfig, StoreError, StoreResult, Value,
};
use mirrordb_events::{EventKey, EventKind, EventRouter, LifecycleEvent};

use crate::adapter::{SchemaInit, StorageAdapter};
use crate::hydrate::{hydrate, HydrationReport};
use crate::mirror::{MirrorCache, Snapshot};
use crate::writer::{WriteOp, WriteQueue};

/// Whether writes reach a backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Durability {
    Durable,
    /// The adapter could not be opened; only the mirror is updated.
    CacheOnly,
}

/// A live database connection that must learn about a database rename.
pub trait RenameNotifiable: Send + Sync {
    fn rename(&self, new_name: &str);
}

pub(crate) struct StoreInner {
    pub(crate) config: StoreConfig,
    pub(crate) mirror: Arc<MirrorCache>,
    pub(crate) writes: WriteQueue,
    open_error: Option<StoreError>,
    hydration: HydrationReport,
    connections: RwLock<HashMap<String, Arc<dyn RenameNotifiable>>>,
}

impl StoreInner {
    // Every submission happens inside a mirror critical section, so the
    // queue sees durable writes in the order the mirror applied them.

    pub(crate) fn set_item(&self, name: impl Into<String>, value: Value) -> Completion {
        self.mirror.set_with(name, value, |key, value| {
            self.writes.submit(WriteOp::Put(Record::new(key, value.clone())))
        })
    }

    /// Enqueue the mirror's current value for `key`.
    pub(crate) fn persist(&self, key: &str) -> Option<Completion> {
        self.mirror.inspect(key, |value| {
            value.map(|value| self.writes.submit(WriteOp::Put(Record::new(key, value.clone()))))
        })
    }

    pub(crate) fn remove_item(&self, name: &str) -> Completion {
        self.mirror.with_watermark(|watermark| {
            self.writes.submit(WriteOp::Delete {
                key: name.to_string(),
                watermark,
            })
        })
    }

    pub(crate) fn clear(&self) -> Completion {
        self.mirror
            .with_watermark(|watermark| self.writes.submit(WriteOp::Clear { watermark }))
    }

    pub(crate) fn connection(&self, name: &str) -> Option<Arc<dyn RenameNotifiable>> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub(crate) fn move_connection(&self, old: &str, new: &str) {
        let mut connections = self.connections.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(conn) = connections.remove(old) {
            connections.insert(new.to_string(), conn);
        }
    }
}

/// Write-through cache over a [`StorageAdapter`].
///
/// Cloning is cheap; clones share the same mirror and writer.
#[derive(Clone)]
pub struct MirrorStore {
    inner: Arc<StoreInner>,
    router: Arc<EventRouter>,
}

impl MirrorStore {
    /// Open the adapter, hydrate the mirror and subscribe to `router`.
    ///
    /// Returns only once hydration is complete. If the adapter cannot be
    /// opened the store still opens, in [`Durability::CacheOnly`] mode.
    pub async fn open(
        config: StoreConfig,
        adapter: Arc<dyn StorageAdapter>,
        router: Arc<EventRouter>,
    ) -> StoreResult<Self> {
        Self::open_inner(config, adapter, router, None).await
    }

    /// Like [`MirrorStore::open`], invoking `on_schema_init` when the
    /// container is created or upgraded.
    pub async fn open_with_schema(
        config: StoreConfig,
        adapter: Arc<dyn StorageAdapter>,
        router: Arc<EventRouter>,
        on_schema_init: SchemaInit,
    ) -> StoreResult<Self> {
        Self::open_inner(config, adapter, router, Some(on_schema_init)).await
    }

    async fn open_inner(
        config: StoreConfig,
        adapter: Arc<dyn StorageAdapter>,
        router: Arc<EventRouter>,
        on_schema_init: Option<SchemaInit>,
    ) -> StoreResult<Self> {
        config.validate()?;
        let mirror = Arc::new(MirrorCache::new());
        let version = config.effective_version();

        let (writes, open_error, hydration) = match adapter.open(version, on_schema_init).await {
            Ok(()) => {
                let report = hydrate(adapter.as_ref(), &mirror).await?;
                (WriteQueue::spawn(adapter, Arc::clone(&mirror)), None, report)
            }
            Err(e) => {
                let e = if e.is_unavailable() { e } else { StoreError::unavailable(e) };
                tracing::error!(store = %config.name, error = %e, "adapter unavailable, running cache-only");
                (
                    WriteQueue::cache_only(e.clone()),
                    Some(e),
                    HydrationReport::default(),
                )
            }
        };

        let inner = Arc::new(StoreInner {
            config,
            mirror,
            writes,
            open_error,
            hydration,
            connections: RwLock::new(HashMap::new()),
        });

        for kind in EventKind::ALL {
            let store = Arc::downgrade(&inner);
            router.subscribe(EventKey::for_store(&inner.config.name, kind), move |event| {
                match store.upgrade() {
                    Some(store) => store.handle(event),
                    None => Completion::ready(),
                }
            });
        }

        tracing::info!(
            store = %inner.config.name,
            version,
            entries = inner.mirror.len(),
            durable = inner.writes.is_durable(),
            "store opened"
        );
        Ok(Self { inner, router })
    }

    /// Store `value` under `name`. Visible to reads immediately.
    pub fn set_item(&self, name: impl Into<String>, value: Value) -> Completion {
        self.inner.set_item(name, value)
    }

    pub fn get_item(&self, name: &str) -> Option<Value> {
        self.inner.mirror.get(name)
    }

    /// Copy of every cached entry.
    pub fn snapshot(&self) -> Snapshot {
        self.inner.mirror.snapshot()
    }

    /// Delete `name`. The mirror keeps the value until the store acknowledges.
    pub fn remove_item(&self, name: &str) -> Completion {
        self.inner.remove_item(name)
    }

    /// Delete everything. The mirror is emptied when the store acknowledges.
    pub fn clear(&self) -> Completion {
        self.inner.clear()
    }

    /// Byte length of the JSON serialization of the value under `name`.
    pub fn usage(&self, name: &str) -> usize {
        self.inner.mirror.inspect(name, serialized_len)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.inner.mirror.has(name)
    }

    /// Resolves once every write submitted so far has been acknowledged.
    pub fn flush(&self) -> Completion {
        self.inner.writes.barrier()
    }

    pub fn durability(&self) -> Durability {
        if self.inner.writes.is_durable() {
            Durability::Durable
        } else {
            Durability::CacheOnly
        }
    }

    /// Why the adapter failed to open, in cache-only mode.
    pub fn open_error(&self) -> Option<&StoreError> {
        self.inner.open_error.as_ref()
    }

    pub fn hydration(&self) -> HydrationReport {
        self.inner.hydration
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    pub fn mirror(&self) -> &MirrorCache {
        &self.inner.mirror
    }

    /// Register the connection notified when database `name` is renamed.
    ///
    /// Returns the connection previously registered under `name`.
    pub fn register_connection(
        &self,
        name: impl Into<String>,
        connection: Arc<dyn RenameNotifiable>,
    ) -> Option<Arc<dyn RenameNotifiable>> {
        self.inner
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), connection)
    }

    pub fn unregister_connection(&self, name: &str) -> Option<Arc<dyn RenameNotifiable>> {
        self.inner
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    /// Publish `event` on this store's router under the namespace its kind
    /// is subscribed with.
    pub fn publish(&self, event: LifecycleEvent) -> Option<Completion> {
        let namespace = event.kind().namespace(self.name()).to_string();
        self.router.publish(&namespace, event)
    }
}

impl fmt::Debug for MirrorStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MirrorStore")
            .field("name", &self.inner.config.name)
            .field("entries", &self.inner.mirror.len())
            .field("durability", &self.durability())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::InMemoryAdapter;
    use mirrordb_core::ConfigError;
    use serde_json::json;

    async fn open_store(adapter: Arc<InMemoryAdapter>) -> MirrorStore {
        MirrorStore::open(StoreConfig::new("library"), adapter, Arc::new(EventRouter::new()))
            .await
            .expect("open should succeed")
    }

    #[tokio::test]
    async fn test_open_registers_every_event() {
        let store = open_store(Arc::new(InMemoryAdapter::new())).await;
        let router = store.router();
        assert_eq!(router.len(), EventKind::ALL.len());
        assert!(router.is_subscribed(&EventKey::new("library", EventKind::Insert)));
        assert!(router.is_subscribed(&EventKey::new("_mirrordb_", EventKind::AlterTable)));
        assert!(router.is_subscribed(&EventKey::new("_mirrordb_", EventKind::ResolveSchema)));
        assert_eq!(store.durability(), Durability::Durable);
        assert!(store.open_error().is_none());
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_config() {
        let err = MirrorStore::open(
            StoreConfig::new(""),
            Arc::new(InMemoryAdapter::new()),
            Arc::new(EventRouter::new()),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StoreError::Config(ConfigError::MissingRequired { .. })));
    }

    #[tokio::test]
    async fn test_set_remove_round_trip() {
        let adapter = Arc::new(InMemoryAdapter::new());
        let store = open_store(adapter.clone()).await;

        let pending = store.set_item("k", json!({"a": 1}));
        assert_eq!(store.get_item("k"), Some(json!({"a": 1})));
        pending.await.expect("set should succeed");
        assert_eq!(adapter.stored("k").await, Some(json!({"a": 1})));

        store.remove_item("k").await.expect("remove should succeed");
        assert!(!store.exists("k"));
        assert!(adapter.stored("k").await.is_none());
    }

    #[tokio::test]
    async fn test_usage() {
        let store = open_store(Arc::new(InMemoryAdapter::new())).await;
        drop(store.set_item("empty", json!({})));
        drop(store.set_item("text", json!("abc")));
        assert_eq!(store.usage("empty"), 2);
        assert_eq!(store.usage("text"), 5);
        assert_eq!(store.usage("missing"), 2);
    }

    #[tokio::test]
    async fn test_handlers_stop_after_drop() {
        let router = Arc::new(EventRouter::new());
        let store = MirrorStore::open(
            StoreConfig::new("library"),
            Arc::new(InMemoryAdapter::new()),
            Arc::clone(&router),
        )
        .await
        .expect("open should succeed");
        drop(store);

        let completion = router
            .publish(
                "library",
                LifecycleEvent::CreateTable {
                    table: "books".to_string(),
                    definition: json!({}),
                },
            )
            .expect("handler stays registered");
        assert!(completion.is_empty());
        assert!(completion.await.is_ok());
    }
}
