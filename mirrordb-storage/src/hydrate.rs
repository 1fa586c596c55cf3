//! Cold-start hydration.
//!
//! Drains every record of the backing store into the mirror. The key cursor
//! and the per-key fetches it triggers run concurrently; hydration finishes
//! only once the cursor is exhausted and every fetch has resolved.

use futures_util::stream::{FuturesUnordered, StreamExt};
use mirrordb_core::{Record, StoreError, StoreResult};

use crate::adapter::StorageAdapter;
use crate::mirror::MirrorCache;

/// Outcome of a successful hydration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HydrationReport {
    /// Records copied into the mirror.
    pub loaded: usize,
    /// Keys listed by the cursor whose record was gone at fetch time.
    pub skipped: usize,
}

async fn fetch(adapter: &dyn StorageAdapter, key: String) -> (String, StoreResult<Option<Record>>) {
    let result = adapter.get(&key).await;
    (key, result)
}

/// Load every stored record into `mirror`.
///
/// Running it again re-applies the stored values; it never removes entries.
pub async fn hydrate(adapter: &dyn StorageAdapter, mirror: &MirrorCache) -> StoreResult<HydrationReport> {
    let mut cursor = adapter.scan();
    let mut fetches = FuturesUnordered::new();
    let mut cursor_done = false;
    let mut report = HydrationReport::default();
    let mut failure: Option<StoreError> = None;

    loop {
        tokio::select! {
            next = cursor.next(), if !cursor_done && failure.is_none() => match next {
                Some(Ok(key)) => fetches.push(fetch(adapter, key)),
                Some(Err(e)) => failure = Some(e),
                None => cursor_done = true,
            },
            Some((key, result)) = fetches.next(), if !fetches.is_empty() => {
                if failure.is_some() {
                    continue;
                }
                match result {
                    Ok(Some(record)) => {
                        tracing::trace!(key = %key, "hydrated record");
                        mirror.set(record.key, record.value);
                        report.loaded += 1;
                    }
                    Ok(None) => {
                        tracing::debug!(key = %key, "record vanished before fetch");
                        report.skipped += 1;
                    }
                    Err(e) => failure = Some(e),
                }
            },
            else => break,
        }
    }

    if let Some(e) = failure {
        tracing::error!(error = %e, loaded = report.loaded, "hydration aborted");
        return Err(e);
    }

    tracing::info!(loaded = report.loaded, skipped = report.skipped, "hydration complete");
    Ok(report)
}
