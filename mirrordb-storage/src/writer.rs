//! Single-writer queue between the mirror and the backing store.
//!
//! Every durable operation is sent to one background task over an unbounded
//! channel and executed in submission order, so same-key writes are never
//! reordered. Evictions gated on an acknowledgement are applied to the
//! mirror by the writer itself, before the acknowledgement is delivered.

use std::sync::Arc;

use mirrordb_core::{AckSender, Completion, Record, StoreError, StoreResult};
use tokio::sync::mpsc;

use crate::adapter::StorageAdapter;
use crate::mirror::{MirrorCache, Watermark};

/// A durable operation.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Put(Record),
    /// Delete `key`, then evict it from the mirror unless re-written after
    /// `watermark`.
    Delete { key: String, watermark: Watermark },
    /// Clear the store, then evict every mirror entry up to `watermark`.
    Clear { watermark: Watermark },
    /// Resolves once every earlier operation has been acknowledged.
    Barrier,
}

impl WriteOp {
    fn label(&self) -> &'static str {
        match self {
            WriteOp::Put(_) => "put",
            WriteOp::Delete { .. } => "delete",
            WriteOp::Clear { .. } => "clear",
            WriteOp::Barrier => "barrier",
        }
    }
}

#[derive(Debug)]
struct WriteRequest {
    op: WriteOp,
    ack: AckSender,
}

enum Mode {
    Durable(mpsc::UnboundedSender<WriteRequest>),
    /// The adapter never opened. Every operation fails with the stored error
    /// and the mirror is left untouched.
    CacheOnly(StoreError),
}

/// Handle for submitting durable operations.
pub struct WriteQueue {
    mode: Mode,
}

impl WriteQueue {
    /// Start the writer task for `adapter`. Must be called inside a tokio
    /// runtime. The task exits once the queue is dropped.
    pub fn spawn(adapter: Arc<dyn StorageAdapter>, mirror: Arc<MirrorCache>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(adapter, mirror, rx));
        Self {
            mode: Mode::Durable(tx),
        }
    }

    /// A queue with no backing store.
    pub fn cache_only(reason: StoreError) -> Self {
        Self {
            mode: Mode::CacheOnly(reason),
        }
    }

    pub fn is_durable(&self) -> bool {
        matches!(self.mode, Mode::Durable(_))
    }

    /// Queue `op`. Never blocks; the returned completion resolves with the
    /// adapter's acknowledgement.
    pub fn submit(&self, op: WriteOp) -> Completion {
        match &self.mode {
            Mode::Durable(tx) => {
                let (ack, completion) = Completion::channel();
                let label = op.label();
                if tx.send(WriteRequest { op, ack }).is_err() {
                    tracing::warn!(op = label, "write queue closed, dropping operation");
                    return Completion::failed(StoreError::WriterClosed);
                }
                completion
            }
            Mode::CacheOnly(_) if matches!(op, WriteOp::Barrier) => Completion::ready(),
            // Nothing is acknowledged, so nothing is evicted.
            Mode::CacheOnly(reason) => Completion::failed(reason.clone()),
        }
    }

    /// Completion that resolves after every operation submitted so far.
    pub fn barrier(&self) -> Completion {
        self.submit(WriteOp::Barrier)
    }
}

impl std::fmt::Debug for WriteQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match &self.mode {
            Mode::Durable(_) => "durable",
            Mode::CacheOnly(_) => "cache-only",
        };
        f.debug_struct("WriteQueue").field("mode", &mode).finish()
    }
}

async fn run_writer(
    adapter: Arc<dyn StorageAdapter>,
    mirror: Arc<MirrorCache>,
    mut rx: mpsc::UnboundedReceiver<WriteRequest>,
) {
    tracing::debug!("writer started");
    while let Some(WriteRequest { op, ack }) = rx.recv().await {
        let outcome = apply(adapter.as_ref(), &mirror, op).await;
        ack.send(outcome);
    }
    tracing::debug!("writer stopped");
}

async fn apply(adapter: &dyn StorageAdapter, mirror: &MirrorCache, op: WriteOp) -> StoreResult<()> {
    match op {
        WriteOp::Put(record) => {
            let key = record.key.clone();
            adapter.put(record).await.inspect_err(|e| {
                tracing::warn!(key = %key, error = %e, "durable put failed");
            })
        }
        WriteOp::Delete { key, watermark } => {
            adapter.delete(&key).await.inspect_err(|e| {
                tracing::warn!(key = %key, error = %e, "durable delete failed, mirror entry kept");
            })?;
            let evicted = mirror.evict_if_unchanged(&key, watermark);
            tracing::trace!(key = %key, evicted, "delete acknowledged");
            Ok(())
        }
        WriteOp::Clear { watermark } => {
            adapter.clear().await.inspect_err(|e| {
                tracing::warn!(error = %e, "durable clear failed, mirror kept");
            })?;
            let evicted = mirror.evict_through(watermark);
            tracing::debug!(evicted, "clear acknowledged");
            Ok(())
        }
        WriteOp::Barrier => Ok(()),
    }
}
