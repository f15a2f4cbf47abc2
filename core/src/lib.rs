//! In-process append-only event streams with per-subscriber cursors.
//!
//! A [`Stream`] is an ordered, process-lifetime log of one record type.
//! Producers [`publish`](Stream::publish) into it; any number of consumers
//! attach via [`subscribe`](Stream::subscribe), each getting its own cursor
//! task that replays the log from sequence number 0 and then follows the
//! tail. The returned [`Subscription`] scope must be explicitly closed:
//! either joined (stop is requested and the subscriber handed back) or
//! detached (the cursor runs until its subscriber stops on its own).
//!
//! [`kv::KvStore`] shows how materialized views layer on top: a privileged
//! internal cursor folds the stream into an in-memory map with eventual
//! consistency.

pub mod clock;
pub mod kv;
pub mod log;
pub mod stream;
pub mod subscriber;
pub mod subscription;

mod cursor;

pub use clock::{Clock, ManualClock, Timestamp, Timestamped, WallClock};
pub use log::{LogEntry, SeqNum};
pub use stream::Stream;
pub use subscriber::{Flow, Subscriber, Termination};
pub use subscription::Subscription;
