use async_trait::async_trait;

use crate::log::SeqNum;

/// Per-record decision returned by [`Subscriber::entry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep delivering.
    Continue,
    /// Stop after this record. The cursor exits without invoking
    /// [`Subscriber::terminate`]; the subscriber already knows.
    Stop,
}

/// Response to an external stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Stop now.
    Accept,
    /// Keep delivering; the cursor will only ask again on the next stop
    /// request.
    Defer,
}

/// A record handler attached to a stream by [`Stream::subscribe`].
///
/// `entry` is invoked once per record, in append order starting at sequence
/// number 0, always from the subscription's own task, so the subscriber
/// never observes concurrent access. `total` is the stream size observed
/// when the delivery began; it can be stale but is never ahead of the log.
///
/// `terminate` is the optional capability: the default accepts a stop
/// request immediately, so a subscriber that does not override it simply
/// stops when its scope is joined.
///
/// [`Stream::subscribe`]: crate::stream::Stream::subscribe
#[async_trait]
pub trait Subscriber: Send + 'static {
    type Record: Send + Sync + 'static;

    async fn entry(&mut self, record: &Self::Record, seq_num: SeqNum, total: u64) -> Flow;

    async fn terminate(&mut self) -> Termination {
        Termination::Accept
    }
}

#[async_trait]
impl<S> Subscriber for Box<S>
where
    S: Subscriber + ?Sized,
{
    type Record = S::Record;

    async fn entry(&mut self, record: &Self::Record, seq_num: SeqNum, total: u64) -> Flow {
        (**self).entry(record, seq_num, total).await
    }

    async fn terminate(&mut self) -> Termination {
        (**self).terminate().await
    }
}
