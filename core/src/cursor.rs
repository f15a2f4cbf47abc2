use std::sync::{
    Arc, Weak,
    atomic::{AtomicBool, Ordering},
};

use tokio::sync::{Notify, watch};

use crate::{
    log::SeqNum,
    stream::StreamInner,
    subscriber::{Flow, Subscriber, Termination},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct CursorId(pub u64);

/// Control block shared between a subscription scope and its cursor.
#[derive(Debug, Default)]
pub(crate) struct CursorControl {
    stop_requested: AtomicBool,
    wake: Notify,
}

impl CursorControl {
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    /// Consumes a pending stop request, if any. A request the subscriber
    /// defers counts as handled; the scope must re-signal to ask again.
    fn take_stop_request(&self) -> bool {
        self.stop_requested.swap(false, Ordering::SeqCst)
    }

    async fn stopped(&self) {
        self.wake.notified().await;
    }
}

/// Per-subscription worker: pulls entries from the log in order and feeds
/// them to one subscriber.
pub(crate) struct Cursor<S: Subscriber> {
    pub id: CursorId,
    pub stream: Weak<StreamInner<S::Record>>,
    pub size_rx: watch::Receiver<u64>,
    pub control: Arc<CursorControl>,
    pub subscriber: S,
    pub next_seq_num: SeqNum,
}

impl<S: Subscriber> Cursor<S> {
    /// Runs until the subscriber self-stops, a stop request is accepted, or
    /// the publisher side goes away. Returns the subscriber so a joining
    /// scope can hand it back to the caller.
    pub async fn run(mut self) -> S {
        loop {
            if self.control.take_stop_request() {
                match self.subscriber.terminate().await {
                    Termination::Accept => break,
                    Termination::Defer => continue,
                }
            }
            let Some(stream) = self.stream.upgrade() else {
                break;
            };
            let total = stream.log.size();
            if self.next_seq_num < total {
                let entry = stream.log.read(self.next_seq_num);
                drop(stream);
                let flow = self
                    .subscriber
                    .entry(&entry.record, entry.seq_num, total)
                    .await;
                self.next_seq_num += 1;
                if flow == Flow::Stop {
                    break;
                }
            } else {
                drop(stream);
                let next = self.next_seq_num;
                tokio::select! {
                    changed = self.size_rx.wait_for(|size| *size > next) => {
                        if changed.is_err() {
                            // No publisher left; nothing further will arrive.
                            break;
                        }
                    }
                    _ = self.control.stopped() => {}
                }
            }
        }
        if let Some(stream) = self.stream.upgrade() {
            stream.cursors.remove(&self.id);
        }
        tracing::debug!(cursor = self.id.0, "cursor finished");
        self.subscriber
    }
}
