//! MirrorDB Test Utilities
//!
//! Shared test infrastructure for the MirrorDB workspace:
//! - Controllable adapters (manual acknowledgement, failure injection)
//! - Proptest generators for keys, JSON values and stored record sets
//! - Fixtures for table and database records
//! - Tracing setup for tests

pub use mirrordb_core::{
    data_key, Completion, OperationKind, Record, StoreConfig, StoreError, StoreResult, Value,
};
pub use mirrordb_events::{EventRouter, LifecycleEvent};
pub use mirrordb_storage::{InMemoryAdapter, MirrorStore, RenameNotifiable, StorageAdapter};

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use mirrordb_storage::{KeyStream, SchemaInit};
use tokio::sync::Semaphore;

// ============================================================================
// MOCK ADAPTERS
// ============================================================================

/// Adapter whose operations can be held until the test releases them.
///
/// Wraps an [`InMemoryAdapter`]. While a kind is held, every operation of
/// that kind blocks before touching the inner adapter; [`GatedAdapter::release`]
/// lets exactly one through.
#[derive(Debug, Default)]
pub struct GatedAdapter {
    inner: InMemoryAdapter,
    gates: Mutex<HashMap<OperationKind, Arc<Semaphore>>>,
    pending: AtomicUsize,
}

impl GatedAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records<I, K>(records: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            inner: InMemoryAdapter::with_records(records),
            ..Self::default()
        }
    }

    /// The wrapped adapter, for inspecting what actually got stored.
    pub fn inner(&self) -> &InMemoryAdapter {
        &self.inner
    }

    /// Block every subsequent operation of `kind`.
    pub fn hold(&self, kind: OperationKind) {
        self.gates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, Arc::new(Semaphore::new(0)));
    }

    /// Let one held operation of `kind` proceed.
    pub fn release(&self, kind: OperationKind) {
        if let Some(gate) = self.gate(kind) {
            gate.add_permits(1);
        }
    }

    /// Stop holding `kind` and let every blocked operation proceed.
    pub fn unhold(&self, kind: OperationKind) {
        let gate = self
            .gates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&kind);
        if let Some(gate) = gate {
            gate.close();
        }
    }

    /// Number of operations currently blocked.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Yield until at least `count` operations are blocked.
    pub async fn until_pending(&self, count: usize) {
        while self.pending() < count {
            tokio::task::yield_now().await;
        }
    }

    fn gate(&self, kind: OperationKind) -> Option<Arc<Semaphore>> {
        self.gates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
    }

    async fn pass(&self, kind: OperationKind) {
        let Some(gate) = self.gate(kind) else {
            return;
        };
        self.pending.fetch_add(1, Ordering::SeqCst);
        // A closed gate means the kind was unheld.
        if let Ok(permit) = gate.acquire().await {
            permit.forget();
        }
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl StorageAdapter for GatedAdapter {
    async fn open(&self, version: u32, on_schema_init: Option<SchemaInit>) -> StoreResult<()> {
        self.pass(OperationKind::Open).await;
        self.inner.open(version, on_schema_init).await
    }

    fn scan(&self) -> KeyStream<'_> {
        stream::once(self.pass(OperationKind::Scan))
            .flat_map(move |()| self.inner.scan())
            .boxed()
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Record>> {
        self.pass(OperationKind::Get).await;
        self.inner.get(key).await
    }

    async fn put(&self, record: Record) -> StoreResult<()> {
        self.pass(OperationKind::Put).await;
        self.inner.put(record).await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.pass(OperationKind::Delete).await;
        self.inner.delete(key).await
    }

    async fn clear(&self) -> StoreResult<()> {
        self.pass(OperationKind::Clear).await;
        self.inner.clear().await
    }
}

/// Adapter that fails on demand.
#[derive(Debug, Default)]
pub struct FailingAdapter {
    inner: InMemoryAdapter,
    unopenable: bool,
    failing: Mutex<HashSet<OperationKind>>,
}

impl FailingAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records<I, K>(records: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            inner: InMemoryAdapter::with_records(records),
            ..Self::default()
        }
    }

    /// An adapter whose `open` always fails.
    pub fn unopenable() -> Self {
        Self {
            unopenable: true,
            ..Self::default()
        }
    }

    pub fn inner(&self) -> &InMemoryAdapter {
        &self.inner
    }

    /// Make every subsequent operation of `kind` fail.
    pub fn fail(&self, kind: OperationKind) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind);
    }

    pub fn recover(&self, kind: OperationKind) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&kind);
    }

    fn check(&self, kind: OperationKind, key: Option<&str>) -> StoreResult<()> {
        let failing = self
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&kind);
        if failing {
            Err(StoreError::operation_failed(kind, key, "injected failure"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StorageAdapter for FailingAdapter {
    async fn open(&self, version: u32, on_schema_init: Option<SchemaInit>) -> StoreResult<()> {
        if self.unopenable {
            return Err(StoreError::unavailable("injected open failure"));
        }
        self.check(OperationKind::Open, None)?;
        self.inner.open(version, on_schema_init).await
    }

    fn scan(&self) -> KeyStream<'_> {
        match self.check(OperationKind::Scan, None) {
            Ok(()) => self.inner.scan(),
            Err(e) => stream::once(async move { Err(e) }).boxed(),
        }
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Record>> {
        self.check(OperationKind::Get, Some(key))?;
        self.inner.get(key).await
    }

    async fn put(&self, record: Record) -> StoreResult<()> {
        self.check(OperationKind::Put, Some(&record.key))?;
        self.inner.put(record).await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.check(OperationKind::Delete, Some(key))?;
        self.inner.delete(key).await
    }

    async fn clear(&self) -> StoreResult<()> {
        self.check(OperationKind::Clear, None)?;
        self.inner.clear().await
    }
}

/// [`RenameNotifiable`] that records every name it was renamed to.
#[derive(Debug, Default)]
pub struct RecordingConnection {
    renames: Mutex<Vec<String>>,
}

impl RecordingConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn renames(&self) -> Vec<String> {
        self.renames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl RenameNotifiable for RecordingConnection {
    fn rename(&self, new_name: &str) {
        self.renames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(new_name.to_string());
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating test data.

    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    /// Store keys: short identifiers, optionally with the data suffix.
    pub fn arb_key() -> impl Strategy<Value = String> {
        ("[a-z][a-z0-9_]{0,11}", any::<bool>()).prop_map(|(name, data)| {
            if data {
                data_key(&name)
            } else {
                name
            }
        })
    }

    /// Arbitrary JSON values up to a small depth.
    pub fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-zA-Z0-9 ]{0,16}".prop_map(Value::from),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|map| Value::Object(map.into_iter().collect())),
            ]
        })
    }

    /// A set of stored records.
    pub fn arb_records() -> impl Strategy<Value = BTreeMap<String, Value>> {
        prop::collection::btree_map(arb_key(), arb_json(), 0..16)
    }

    /// Rows for an insert event.
    pub fn arb_rows() -> impl Strategy<Value = Vec<Value>> {
        prop::collection::vec(any::<u32>().prop_map(|id| serde_json::json!({ "id": id })), 0..8)
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built records and store setups.

    use super::*;
    use serde_json::json;

    /// Table definition as written by the table layer.
    pub fn table_definition(database: &str, table: &str) -> Value {
        json!({
            "TBL_NAME": table,
            "DB_NAME": database,
            "lastInsertId": 0,
            "lastModified": 0,
            "columns": {},
        })
    }

    /// Database record listing `tables`.
    pub fn database_record(database: &str, tables: &[&str]) -> Value {
        let tables: serde_json::Map<String, Value> = tables
            .iter()
            .map(|table| (table.to_string(), table_definition(database, table)))
            .collect();
        json!({ "tables": tables })
    }

    /// Open a store named `name` over `adapter` with a fresh router.
    pub async fn open_store(name: &str, adapter: Arc<dyn StorageAdapter>) -> StoreResult<MirrorStore> {
        MirrorStore::open(StoreConfig::new(name), adapter, Arc::new(EventRouter::new())).await
    }

    /// Publish `CreateTable` for `table` with a default definition.
    pub fn create_table(store: &MirrorStore, table: &str) -> Completion {
        store
            .publish(LifecycleEvent::CreateTable {
                table: table.to_string(),
                definition: table_definition(store.name(), table),
            })
            .unwrap_or_default()
    }
}

// ============================================================================
// TRACING
// ============================================================================

/// Install a fmt subscriber writing through the test harness.
///
/// Respects `RUST_LOG`; safe to call from every test.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("mirrordb_storage=debug,mirrordb_events=debug,warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_gated_adapter_holds_until_released() {
        let adapter = Arc::new(GatedAdapter::new());
        adapter.hold(OperationKind::Put);

        let task = {
            let adapter = Arc::clone(&adapter);
            tokio::spawn(async move { adapter.put(Record::new("k", json!(1))).await })
        };
        adapter.until_pending(1).await;
        assert!(adapter.inner().stored("k").await.is_none());

        adapter.release(OperationKind::Put);
        task.await.expect("task should join").expect("put should succeed");
        assert_eq!(adapter.inner().stored("k").await, Some(json!(1)));
        assert_eq!(adapter.pending(), 0);
    }

    #[tokio::test]
    async fn test_failing_adapter_injects_errors() {
        let adapter = FailingAdapter::new();
        adapter.fail(OperationKind::Delete);
        let err = adapter.delete("k").await.unwrap_err();
        assert_eq!(
            err,
            StoreError::operation_failed(OperationKind::Delete, Some("k"), "injected failure")
        );

        adapter.recover(OperationKind::Delete);
        assert!(adapter.delete("k").await.is_ok());
        assert!(FailingAdapter::unopenable().open(1, None).await.unwrap_err().is_unavailable());
    }

    #[test]
    fn test_database_record_fixture() {
        let record = fixtures::database_record("shop", &["orders"]);
        assert_eq!(record["tables"]["orders"]["DB_NAME"], json!("shop"));
        assert_eq!(record["tables"]["orders"]["TBL_NAME"], json!("orders"));
    }
}
