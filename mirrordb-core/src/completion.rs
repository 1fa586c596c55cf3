//! Acknowledgement futures for durable operations.
//!
//! Every durable write returns a [`Completion`]. Dropping it is the
//! fire-and-forget path; awaiting it resolves once the backing store has
//! acknowledged every operation it tracks. A `Completion` can track several
//! operations, which is how event handlers report the writes they issued.

use std::future::IntoFuture;

use futures_util::future::BoxFuture;
use tokio::sync::oneshot;

use crate::{StoreError, StoreResult};

/// Outcome of one durable operation.
pub type Ack = StoreResult<()>;

/// Sending half of a single acknowledgement.
#[derive(Debug)]
pub struct AckSender(oneshot::Sender<Ack>);

impl AckSender {
    /// Deliver the outcome. A dropped receiver is not an error.
    pub fn send(self, ack: Ack) {
        let _ = self.0.send(ack);
    }
}

/// Resolves when the tracked durable operations have been acknowledged.
#[derive(Debug, Default)]
pub struct Completion {
    pending: Vec<oneshot::Receiver<Ack>>,
    failed: Option<StoreError>,
}

impl Completion {
    /// A completion with nothing to wait for.
    pub fn ready() -> Self {
        Self::default()
    }

    /// A completion that already failed.
    pub fn failed(err: StoreError) -> Self {
        Self {
            pending: Vec::new(),
            failed: Some(err),
        }
    }

    /// Create a sender/completion pair tracking one operation.
    pub fn channel() -> (AckSender, Self) {
        let (tx, rx) = oneshot::channel();
        (
            AckSender(tx),
            Self {
                pending: vec![rx],
                failed: None,
            },
        )
    }

    /// Track the operations of `other` as well.
    pub fn join(mut self, other: Completion) -> Self {
        self.pending.extend(other.pending);
        if self.failed.is_none() {
            self.failed = other.failed;
        }
        self
    }

    /// Number of operations still awaiting acknowledgement.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True when no acknowledgement is outstanding.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Wait for every tracked acknowledgement.
    ///
    /// All operations are awaited even after a failure; the first error in
    /// submission order is returned.
    pub async fn wait(self) -> StoreResult<()> {
        let mut first_err = self.failed;
        for rx in self.pending {
            let outcome = rx.await.unwrap_or(Err(StoreError::WriterClosed));
            if let Err(e) = outcome {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl IntoFuture for Completion {
    type Output = StoreResult<()>;
    type IntoFuture = BoxFuture<'static, StoreResult<()>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}

impl FromIterator<Completion> for Completion {
    fn from_iter<I: IntoIterator<Item = Completion>>(iter: I) -> Self {
        iter.into_iter().fold(Completion::ready(), Completion::join)
    }
}
