//! Cold-start hydration through `MirrorStore::open`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use mirrordb_core::{OperationKind, StoreConfig, StoreError, Value};
use mirrordb_events::EventRouter;
use mirrordb_storage::{
    hydrate, Durability, HydrationReport, InMemoryAdapter, LmdbAdapter, LmdbConfig, MirrorCache,
    MirrorStore, SchemaUpgrade, StorageAdapter,
};
use mirrordb_test_utils::fixtures::open_store;
use mirrordb_test_utils::generators::arb_records;
use mirrordb_test_utils::{init_tracing, FailingAdapter, GatedAdapter};
use proptest::prelude::*;
use serde_json::json;
use tempfile::TempDir;

#[tokio::test]
async fn test_open_waits_for_every_fetch() {
    init_tracing();
    let adapter = Arc::new(GatedAdapter::with_records([
        ("books", json!({"TBL_NAME": "books"})),
        ("books:data", json!([{"id": 1}])),
    ]));
    adapter.hold(OperationKind::Get);

    let opening = tokio::spawn({
        let adapter = adapter.clone();
        async move { open_store("library", adapter).await }
    });

    adapter.until_pending(2).await;
    assert!(!opening.is_finished());
    adapter.unhold(OperationKind::Get);

    let store = opening
        .await
        .expect("task should join")
        .expect("open should succeed");
    assert_eq!(store.hydration().loaded, 2);
    assert_eq!(store.get_item("books:data"), Some(json!([{"id": 1}])));
}

#[tokio::test]
async fn test_key_deleted_between_scan_and_fetch_is_skipped() {
    let adapter = Arc::new(GatedAdapter::with_records([("a", json!(1)), ("b", json!(2))]));
    let mirror = MirrorCache::new();
    adapter.hold(OperationKind::Get);

    let (report, ()) = tokio::join!(hydrate(adapter.as_ref(), &mirror), async {
        adapter.until_pending(2).await;
        adapter.inner().delete("b").await.expect("delete should succeed");
        adapter.unhold(OperationKind::Get);
    });

    let report = report.expect("hydrate should succeed");
    assert_eq!(report, HydrationReport { loaded: 1, skipped: 1 });
    assert_eq!(mirror.get("a"), Some(json!(1)));
    assert!(!mirror.has("b"));
}

#[tokio::test]
async fn test_failed_fetch_fails_open() {
    init_tracing();
    let adapter = Arc::new(FailingAdapter::with_records([("a", json!(1)), ("b", json!(2))]));
    adapter.fail(OperationKind::Get);

    let err = open_store("library", adapter.clone()).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::OperationFailed {
            op: OperationKind::Get,
            ..
        }
    ));
}

#[tokio::test]
async fn test_failed_scan_fails_open() {
    let adapter = Arc::new(FailingAdapter::with_records([("a", json!(1))]));
    adapter.fail(OperationKind::Scan);

    let err = open_store("library", adapter.clone()).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::OperationFailed {
            op: OperationKind::Scan,
            ..
        }
    ));
}

#[tokio::test]
async fn test_schema_hook_runs_on_fresh_container() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    let store = MirrorStore::open_with_schema(
        StoreConfig::new("library").with_version(3),
        Arc::new(InMemoryAdapter::new()),
        Arc::new(EventRouter::new()),
        Box::new(move |upgrade: SchemaUpgrade| sink.lock().unwrap().push(upgrade)),
    )
    .await
    .expect("open should succeed");

    assert_eq!(store.durability(), Durability::Durable);
    assert_eq!(
        seen.lock().unwrap().as_slice(),
        &[SchemaUpgrade {
            old_version: 0,
            new_version: 3
        }]
    );
}

#[tokio::test]
async fn test_lmdb_store_rehydrates_written_records() {
    init_tracing();
    let temp_dir = TempDir::new().expect("TempDir creation should succeed");
    let adapter = Arc::new(LmdbAdapter::new(LmdbConfig::new(temp_dir.path())));

    let store = open_store("library", adapter.clone())
        .await
        .expect("open should succeed");
    drop(store.set_item("books", json!({"TBL_NAME": "books"})));
    drop(store.set_item("books:data", json!([{"id": 1}])));
    drop(store.set_item("scratch", json!(true)));
    drop(store.remove_item("scratch"));
    store.flush().await.expect("flush should succeed");
    let written = store.snapshot();
    drop(store);

    let reopened = open_store("library", adapter.clone())
        .await
        .expect("reopen should succeed");
    assert_eq!(reopened.snapshot(), written);
    assert_eq!(reopened.hydration().loaded, 2);
    assert!(!reopened.exists("scratch"));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// After opening over any stored record set, the mirror holds exactly
    /// those records.
    #[test]
    fn prop_hydration_mirrors_store(records in arb_records()) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime should build");

        let snapshot = rt.block_on(async {
            let adapter = Arc::new(InMemoryAdapter::with_records(records.clone()));
            let store = open_store("library", adapter).await.expect("open should succeed");
            for (key, value) in &records {
                assert_eq!(store.get_item(key).as_ref(), Some(value));
            }
            store.snapshot()
        });

        let expected: BTreeMap<String, Value> = records;
        prop_assert_eq!(snapshot.into_inner(), expected);
    }
}
