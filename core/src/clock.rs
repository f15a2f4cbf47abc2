use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::SystemTime,
};

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// Source of "now" for append stamping and time-window filtering.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Timestamp;
}

/// System time in milliseconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct WallClock;

impl Clock for WallClock {
    fn now(&self) -> Timestamp {
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .expect("21st century")
            .as_millis()
            .try_into()
            .expect("milliseconds since Unix epoch fit into a u64")
    }
}

/// Clock that only moves when told to. For tests.
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Arc<AtomicU64>);

impl ManualClock {
    pub fn at(now: Timestamp) -> Self {
        Self(Arc::new(AtomicU64::new(now)))
    }

    pub fn set(&self, now: Timestamp) {
        self.0.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: u64) {
        self.0.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.0.load(Ordering::SeqCst)
    }
}

/// Records that carry a logical timestamp expose it for trailing-window
/// reads.
pub trait Timestamped {
    fn timestamp(&self) -> Timestamp;
}
