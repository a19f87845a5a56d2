//! Change-log tailing with gap detection.
//!
//! A [`Watcher`] follows one collection's change log from a caller-supplied revision and yields
//! the new events in batches. Each batch is checked against the chain: the first event's
//! `prev_revision` must be the last revision the caller saw. When trimming has evicted events the
//! caller never received, the watcher fails with [`WatchError::ResyncRequired`] and stays failed;
//! the caller has to read a fresh snapshot and start a new watcher from its revision.
//!
//! The watcher is a small state machine:
//!
//! ```text
//! Polling --gap--> Failed
//! Polling --collection dropped--> Failed(Closed)
//! Polling --cancel--> Canceled
//! ```
//!
//! Waiting for new entries is the only suspension point. It ends on a commit notification, after
//! the block timeout, or on cancellation; a timeout simply polls again. A watcher does not keep
//! its collection alive: once the last handle to the collection is dropped (for example when the
//! owning store shuts down), the watcher fails with [`WatchError::Closed`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, watch, Notify};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, trace, warn};

use crate::storage::{ChangeEvent, Collection, Revision};

/// Default time a poll waits for new entries before polling again.
pub const DEFAULT_WATCH_BLOCK: Duration = Duration::from_millis(2500);

/// Batches buffered between a streaming watcher task and its consumer.
const STREAM_BUFFER: usize = 16;

/// Watch-related errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WatchError {
    #[error("Change log gap: expected prevRevision {expected}, found {found}; resync required")]
    ResyncRequired { expected: Revision, found: Revision },

    #[error("Collection closed")]
    Closed,
}

pub type WatchResult<T> = Result<T, WatchError>;

/// Where a watcher is in its lifecycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WatchState {
    Polling,
    Failed(WatchError),
    Canceled,
}

#[derive(Debug, Default)]
struct CancelInner {
    canceled: AtomicBool,
    notify: Notify,
}

/// Cloneable handle that stops a watcher, waking it if it is blocked.
#[derive(Clone, Debug, Default)]
pub struct WatchCancel {
    inner: Arc<CancelInner>,
}

impl WatchCancel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.canceled.store(true, Ordering::SeqCst);
        // notify_one keeps a permit, so a watcher that is about to wait still wakes.
        self.inner.notify.notify_one();
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.canceled.load(Ordering::SeqCst)
    }

    async fn notified(&self) {
        self.inner.notify.notified().await
    }
}

/// A resumable, gap-detecting subscription to one collection's change log.
pub struct Watcher {
    collection: Weak<Collection>,
    name: String,
    last_revision: Revision,
    block: Duration,
    head: watch::Receiver<Revision>,
    cancel: WatchCancel,
    state: WatchState,
}

impl Watcher {
    /// Starts following `collection` after `last_revision`.
    pub fn new(collection: &Arc<Collection>, last_revision: Revision, block: Duration) -> Self {
        let head = collection.subscribe();
        debug!(
            collection = collection.name(),
            %last_revision,
            block_ms = block.as_millis() as u64,
            "Watcher created"
        );

        Self {
            collection: Arc::downgrade(collection),
            name: collection.name().to_string(),
            last_revision,
            block,
            head,
            cancel: WatchCancel::new(),
            state: WatchState::Polling,
        }
    }

    /// The revision of the last event delivered, or the starting revision.
    pub fn last_revision(&self) -> Revision {
        self.last_revision
    }

    pub fn state(&self) -> &WatchState {
        &self.state
    }

    pub fn cancel_handle(&self) -> WatchCancel {
        self.cancel.clone()
    }

    /// Waits for the next batch of events.
    ///
    /// Returns `Ok(None)` once canceled. A gap moves the watcher to `Failed`, and every later
    /// call returns the same error.
    pub async fn next_batch(&mut self) -> WatchResult<Option<Vec<ChangeEvent>>> {
        loop {
            match &self.state {
                WatchState::Polling => {}
                WatchState::Failed(err) => return Err(err.clone()),
                WatchState::Canceled => return Ok(None),
            }

            if self.cancel.is_canceled() {
                debug!(collection = %self.name, "Watcher canceled");
                self.state = WatchState::Canceled;
                return Ok(None);
            }

            // Mark the current head as seen before reading so a commit racing with the read
            // still wakes the wait below.
            self.head.borrow_and_update();

            match self.poll()? {
                Some(batch) => return Ok(Some(batch)),
                None => self.wait().await?,
            }
        }
    }

    /// Reads entries after `last_revision` and checks them against the chain.
    fn poll(&mut self) -> WatchResult<Option<Vec<ChangeEvent>>> {
        let collection = match self.collection.upgrade() {
            Some(collection) => collection,
            None => return Err(self.close()),
        };
        let (batch, head) = {
            let state = collection.snapshot();
            (state.changes_after(self.last_revision), state.revision())
        };

        let found = match batch.first() {
            Some(first) => first.prev_revision(),
            // Nothing retained after our position although the head moved past it: every
            // event in between was trimmed.
            None if head > self.last_revision => head,
            None => return Ok(None),
        };

        if found != self.last_revision {
            let err = WatchError::ResyncRequired {
                expected: self.last_revision,
                found,
            };
            warn!(collection = %self.name, "{}", err);
            self.state = WatchState::Failed(err.clone());
            return Err(err);
        }

        if let Some(last) = batch.last() {
            self.last_revision = last.revision();
        }
        trace!(
            collection = %self.name,
            events = batch.len(),
            last_revision = %self.last_revision,
            "Delivering batch"
        );
        Ok(Some(batch))
    }

    async fn wait(&mut self) -> WatchResult<()> {
        let head = &mut self.head;
        let cancel = &self.cancel;

        let closed = tokio::select! {
            changed = head.changed() => changed.is_err(),
            _ = tokio::time::sleep(self.block) => {
                trace!(collection = %self.name, "Watch poll timed out");
                false
            }
            _ = cancel.notified() => false,
        };

        if closed {
            return Err(self.close());
        }
        Ok(())
    }

    fn close(&mut self) -> WatchError {
        debug!(collection = %self.name, "Collection dropped, closing watcher");
        self.state = WatchState::Failed(WatchError::Closed);
        WatchError::Closed
    }

    /// Drives the watcher on a spawned task and yields its batches as a stream.
    ///
    /// The stream ends after cancellation or after yielding an error. Dropping the stream
    /// cancels the watcher.
    pub fn into_stream(mut self) -> ReceiverStream<WatchResult<Vec<ChangeEvent>>> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);

        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    _ = tx.closed() => {
                        self.cancel.cancel();
                        break;
                    }
                    next = self.next_batch() => next,
                };

                let item = match next {
                    Ok(Some(batch)) => Ok(batch),
                    Ok(None) => break,
                    Err(err) => Err(err),
                };
                let terminal = item.is_err();

                if tx.send(item).await.is_err() {
                    self.cancel.cancel();
                    break;
                }
                if terminal {
                    break;
                }
            }
        });

        ReceiverStream::new(rx)
    }
}
