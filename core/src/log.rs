use std::sync::Arc;

use parking_lot::RwLock;

use crate::clock::Timestamp;

/// Dense 0-based position of a record within its stream.
pub type SeqNum = u64;

/// A record together with the metadata assigned at append time.
#[derive(Debug)]
pub struct LogEntry<T> {
    pub record: T,
    pub seq_num: SeqNum,
    pub appended_at: Timestamp,
}

/// Append-only in-memory buffer of entries.
///
/// Entries are never rewritten or deleted; they live for the lifetime of the
/// owning stream. Appends serialize against each other and run concurrently
/// with reads.
pub(crate) struct Log<T> {
    entries: RwLock<Vec<Arc<LogEntry<T>>>>,
}

impl<T> Log<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Appends `record`, assigning the next sequence number. Once `append`
    /// returns, the entry is visible to any `read` at that sequence number.
    pub fn append(&self, record: T, appended_at: Timestamp) -> SeqNum {
        let mut entries = self.entries.write();
        let seq_num = entries.len() as SeqNum;
        entries.push(Arc::new(LogEntry {
            record,
            seq_num,
            appended_at,
        }));
        seq_num
    }

    pub fn size(&self) -> u64 {
        self.entries.read().len() as u64
    }

    /// Reads the entry at `seq_num`.
    ///
    /// # Panics
    ///
    /// Requires `seq_num < self.size()`; reading past the end is a
    /// programmer error.
    pub fn read(&self, seq_num: SeqNum) -> Arc<LogEntry<T>> {
        let entries = self.entries.read();
        match entries.get(seq_num as usize) {
            Some(entry) => entry.clone(),
            None => panic!("read at {seq_num} past log end {}", entries.len()),
        }
    }
}
