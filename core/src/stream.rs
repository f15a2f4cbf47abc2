use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use dashmap::DashSet;
use tokio::sync::watch;

use crate::{
    clock::{Clock, Timestamp, WallClock},
    cursor::{Cursor, CursorControl, CursorId},
    log::{Log, SeqNum},
    subscriber::Subscriber,
    subscription::Subscription,
};

/// Handle to an in-process append-only stream of `T` records.
///
/// Handles are cheap to clone and share one log. Publishing never waits on
/// subscribers; each subscription runs on its own task and catches up from
/// sequence number 0 at its own pace. When the last handle is dropped,
/// detached cursors observe the closed publisher side and exit.
pub struct Stream<T> {
    inner: Arc<StreamInner<T>>,
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

pub(crate) struct StreamInner<T> {
    pub(crate) log: Log<T>,
    pub(crate) cursors: DashSet<CursorId>,
    name: Arc<str>,
    size_tx: watch::Sender<u64>,
    next_cursor_id: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl<T: Send + Sync + 'static> Stream<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_clock(name, WallClock)
    }

    /// Creates a stream that stamps entries and anchors time windows with
    /// the given clock.
    pub fn with_clock(name: impl Into<String>, clock: impl Clock) -> Self {
        let (size_tx, _) = watch::channel(0);
        Self {
            inner: Arc::new(StreamInner {
                log: Log::new(),
                cursors: DashSet::new(),
                name: name.into().into(),
                size_tx,
                next_cursor_id: AtomicU64::new(0),
                clock: Arc::new(clock),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Number of records published so far.
    pub fn size(&self) -> u64 {
        self.inner.log.size()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.cursors.len()
    }

    /// The stream's clock reading.
    pub fn now(&self) -> Timestamp {
        self.inner.clock.now()
    }

    /// Appends a record and wakes every live cursor. Returns the assigned
    /// sequence number.
    pub fn publish(&self, record: T) -> SeqNum {
        let seq_num = self.inner.log.append(record, self.inner.clock.now());
        // Publishes may race; keep the watermark monotonic so a lagging
        // writer cannot regress it.
        self.inner
            .size_tx
            .send_modify(|size| *size = (*size).max(seq_num + 1));
        seq_num
    }

    /// [`publish`](Self::publish) for anything convertible into a record.
    pub fn emplace(&self, record: impl Into<T>) -> SeqNum {
        self.publish(record.into())
    }

    /// Starts a cursor feeding `subscriber` from sequence number 0.
    ///
    /// Must be called within a tokio runtime. The returned scope is
    /// joinable and must be closed with `join` or `detach`; `join` hands the
    /// subscriber back, so state the caller threaded through it survives the
    /// subscription.
    pub fn subscribe<S>(&self, subscriber: S) -> Subscription<S>
    where
        S: Subscriber<Record = T>,
    {
        let id = CursorId(self.inner.next_cursor_id.fetch_add(1, Ordering::Relaxed));
        self.inner.cursors.insert(id);
        let control = Arc::new(CursorControl::default());
        let cursor = Cursor {
            id,
            stream: Arc::downgrade(&self.inner),
            size_rx: self.inner.size_tx.subscribe(),
            control: control.clone(),
            subscriber,
            next_seq_num: 0,
        };
        tracing::debug!(stream = %self.inner.name, cursor = id.0, "cursor attached");
        Subscription::new(tokio::spawn(cursor.run()), control, self.inner.name.clone())
    }

    /// [`subscribe`](Self::subscribe) for subscribers held behind an owning
    /// box, e.g. listeners picked at runtime.
    pub fn subscribe_boxed(
        &self,
        subscriber: Box<dyn Subscriber<Record = T>>,
    ) -> Subscription<Box<dyn Subscriber<Record = T>>> {
        self.subscribe(subscriber)
    }
}
