use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::{cursor::CursorControl, subscriber::Subscriber};

/// Move-only scope owning a running cursor.
///
/// A scope must be explicitly closed: [`join`](Self::join) signals the
/// cursor and waits for it to exit, [`detach`](Self::detach) lets it run
/// until the subscriber stops on its own. Dropping an open scope is a fatal
/// programmer error. Moving the scope transfers the cursor with it.
pub struct Subscription<S: Subscriber> {
    cursor: Option<CursorTask<S>>,
    stream: Arc<str>,
}

struct CursorTask<S> {
    handle: JoinHandle<S>,
    control: Arc<CursorControl>,
}

impl<S: Subscriber> Subscription<S> {
    pub(crate) fn new(
        handle: JoinHandle<S>,
        control: Arc<CursorControl>,
        stream: Arc<str>,
    ) -> Self {
        Self {
            cursor: Some(CursorTask { handle, control }),
            stream,
        }
    }

    /// Requests a stop and waits for the cursor to exit, returning the
    /// subscriber.
    ///
    /// The cursor runs the subscriber's terminate hook; a subscriber that
    /// defers keeps receiving entries until it stops on its own, so `join`
    /// returns only once the cursor is actually finished.
    pub async fn join(mut self) -> S {
        let CursorTask { handle, control } = self.cursor.take().expect("scope already closed");
        control.request_stop();
        handle.await.expect("cursor task panicked")
    }

    /// Renounces ownership: the cursor keeps running until its subscriber
    /// returns `Flow::Stop`, and the terminate hook is never invoked.
    pub fn detach(mut self) {
        // Dropping the join handle leaves the task running unobserved.
        drop(self.cursor.take());
    }
}

impl<S: Subscriber> Drop for Subscription<S> {
    fn drop(&mut self) {
        if self.cursor.is_some() && !std::thread::panicking() {
            panic!(
                "subscription on stream `{}` dropped without join() or detach()",
                self.stream
            );
        }
    }
}
