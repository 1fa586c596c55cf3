//! Write-through ordering between the mirror and the backing store.

use std::sync::Arc;

use mirrordb_core::{OperationKind, StoreError, StoreResult};
use mirrordb_storage::{Durability, MirrorStore};
use mirrordb_test_utils::fixtures::open_store;
use mirrordb_test_utils::{init_tracing, FailingAdapter, GatedAdapter, InMemoryAdapter};
use serde_json::json;

async fn gated_store(adapter: &Arc<GatedAdapter>) -> MirrorStore {
    init_tracing();
    open_store("library", adapter.clone())
        .await
        .expect("open should succeed")
}

#[tokio::test]
async fn test_set_is_visible_before_ack() {
    let adapter = Arc::new(GatedAdapter::new());
    let store = gated_store(&adapter).await;
    adapter.hold(OperationKind::Put);

    let pending = store.set_item("k", json!({"title": "Dune"}));
    assert_eq!(store.get_item("k"), Some(json!({"title": "Dune"})));
    assert!(store.exists("k"));

    adapter.until_pending(1).await;
    assert!(adapter.inner().stored("k").await.is_none());

    adapter.release(OperationKind::Put);
    pending.await.expect("put should succeed");
    assert_eq!(adapter.inner().stored("k").await, Some(json!({"title": "Dune"})));
}

#[tokio::test]
async fn test_remove_is_visible_only_after_ack() {
    let adapter = Arc::new(GatedAdapter::with_records([("k", json!(1))]));
    let store = gated_store(&adapter).await;
    adapter.hold(OperationKind::Delete);

    let pending = store.remove_item("k");
    adapter.until_pending(1).await;
    assert_eq!(store.get_item("k"), Some(json!(1)));

    adapter.release(OperationKind::Delete);
    pending.await.expect("delete should succeed");
    assert_eq!(store.get_item("k"), None);
    assert!(adapter.inner().stored("k").await.is_none());
}

#[tokio::test]
async fn test_clear_empties_mirror_at_ack() {
    let adapter = Arc::new(GatedAdapter::with_records([("a", json!(1)), ("b", json!(2))]));
    let store = gated_store(&adapter).await;
    adapter.hold(OperationKind::Clear);

    let pending = store.clear();
    adapter.until_pending(1).await;
    assert!(store.exists("a"));
    assert_eq!(store.snapshot().len(), 2);

    adapter.release(OperationKind::Clear);
    pending.await.expect("clear should succeed");
    assert!(!store.exists("a"));
    assert!(store.snapshot().is_empty());
}

#[tokio::test]
async fn test_set_after_pending_remove_survives_eviction() {
    let adapter = Arc::new(GatedAdapter::with_records([("k", json!("old"))]));
    let store = gated_store(&adapter).await;
    adapter.hold(OperationKind::Delete);

    let removed = store.remove_item("k");
    adapter.until_pending(1).await;
    let written = store.set_item("k", json!("new"));

    adapter.release(OperationKind::Delete);
    removed.await.expect("delete should succeed");
    written.await.expect("put should succeed");

    assert_eq!(store.get_item("k"), Some(json!("new")));
    assert_eq!(adapter.inner().stored("k").await, Some(json!("new")));
}

#[tokio::test]
async fn test_same_key_writes_keep_submission_order() {
    let adapter = Arc::new(GatedAdapter::new());
    let store = gated_store(&adapter).await;

    for i in 0..10 {
        drop(store.set_item("counter", json!(i)));
    }
    store.flush().await.expect("flush should succeed");
    assert_eq!(adapter.inner().stored("counter").await, Some(json!(9)));
}

#[tokio::test]
async fn test_usage_counts_serialized_bytes() {
    let adapter = Arc::new(GatedAdapter::new());
    let store = gated_store(&adapter).await;

    drop(store.set_item("empty", json!({})));
    drop(store.set_item("row", json!({"id": 1})));
    assert_eq!(store.usage("empty"), 2);
    assert_eq!(store.usage("row"), r#"{"id":1}"#.len());
    assert_eq!(store.usage("absent"), 2);
}

#[tokio::test]
async fn test_failed_delete_keeps_mirror_entry() {
    let adapter = Arc::new(FailingAdapter::with_records([("k", json!(1))]));
    let store = open_store("library", adapter.clone())
        .await
        .expect("open should succeed");
    adapter.fail(OperationKind::Delete);

    let err = store.remove_item("k").await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::OperationFailed {
            op: OperationKind::Delete,
            ..
        }
    ));
    assert_eq!(store.get_item("k"), Some(json!(1)));
}

#[tokio::test]
async fn test_failed_put_does_not_roll_back_mirror() {
    let adapter = Arc::new(FailingAdapter::new());
    let store = open_store("library", adapter.clone())
        .await
        .expect("open should succeed");
    adapter.fail(OperationKind::Put);

    let result: StoreResult<()> = store.set_item("k", json!(2)).await;
    assert!(result.is_err());
    assert_eq!(store.get_item("k"), Some(json!(2)));
    assert!(adapter.inner().stored("k").await.is_none());
}

#[tokio::test]
async fn test_unopenable_adapter_runs_cache_only() {
    let adapter = Arc::new(FailingAdapter::unopenable());
    let store = open_store("library", adapter.clone())
        .await
        .expect("open should degrade, not fail");

    assert_eq!(store.durability(), Durability::CacheOnly);
    assert!(store.open_error().is_some_and(StoreError::is_unavailable));
    assert!(store.snapshot().is_empty());

    let err = store.set_item("k", json!(1)).await.unwrap_err();
    assert!(err.is_unavailable());
    assert_eq!(store.get_item("k"), Some(json!(1)));

    // Without an acknowledgement the mirror keeps the entries.
    assert!(store.remove_item("k").await.unwrap_err().is_unavailable());
    assert_eq!(store.get_item("k"), Some(json!(1)));

    drop(store.set_item("a", json!(1)));
    assert!(store.clear().await.unwrap_err().is_unavailable());
    assert_eq!(store.snapshot().len(), 2);
    assert!(store.flush().await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_leave_mirror_and_store_equal() {
    let adapter = Arc::new(InMemoryAdapter::new());
    let store = open_store("library", adapter.clone())
        .await
        .expect("open should succeed");

    for _round in 0..20 {
        std::thread::scope(|scope| {
            for writer in 0..8 {
                let store = store.clone();
                scope.spawn(move || {
                    for i in 0..50 {
                        drop(store.set_item("k", json!({"writer": writer, "i": i})));
                        if i % 7 == 0 {
                            drop(store.remove_item("k"));
                        }
                    }
                });
            }
        });
        store.flush().await.expect("flush should succeed");
        assert_eq!(store.get_item("k"), adapter.stored("k").await);
    }
}

mod prop_tests {
    use super::*;
    use mirrordb_test_utils::generators::{arb_json, arb_key};
    use proptest::prelude::*;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime should build")
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// A value written through the facade reads back unchanged and
        /// reaches the backing store once flushed.
        #[test]
        fn prop_set_then_get(key in arb_key(), value in arb_json()) {
            let rt = runtime();
            let (read, stored) = rt.block_on(async {
                let adapter = Arc::new(InMemoryAdapter::new());
                let store = open_store("library", adapter.clone())
                    .await
                    .expect("open should succeed");
                let pending = store.set_item(key.clone(), value.clone());
                let read = store.get_item(&key);
                pending.await.expect("put should succeed");
                (read, adapter.stored(&key).await)
            });
            prop_assert_eq!(read.as_ref(), Some(&value));
            prop_assert_eq!(stored.as_ref(), Some(&value));
        }

        /// usage always equals the byte length of the serialized value.
        #[test]
        fn prop_usage_matches_serialization(key in arb_key(), value in arb_json()) {
            let rt = runtime();
            let usage = rt.block_on(async {
                let store = open_store("library", Arc::new(InMemoryAdapter::new()))
                    .await
                    .expect("open should succeed");
                drop(store.set_item(key.clone(), value.clone()));
                store.usage(&key)
            });
            let expected = serde_json::to_string(&value).expect("value serializes").len();
            prop_assert_eq!(usage, expected);
        }
    }
}
