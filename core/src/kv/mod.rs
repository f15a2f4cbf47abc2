//! Materialized key-value view over a stream of key-bearing records.
//!
//! Writes append to the underlying stream; an internal materializer cursor
//! folds them into an in-memory map that lookups read. The view is
//! eventually consistent: a lookup racing the materializer may miss a
//! just-published record, but once [`KvStore::caught_up`] returns true every
//! prior write is visible.

mod materializer;

use std::{collections::HashMap, fmt::Debug, hash::Hash, sync::Arc};

use materializer::Materializer;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{oneshot, watch};

use crate::{
    log::SeqNum, stream::Stream, subscriber::Subscriber, subscription::Subscription,
};

/// A record usable as a key-value entry.
pub trait KeyedRecord: Clone + Send + Sync + 'static {
    type Key: Clone + Eq + Hash + Debug + Send + Sync + 'static;

    fn key(&self) -> &Self::Key;
    fn set_key(&mut self, key: Self::Key);
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("key `{key:?}` not found")]
pub struct KeyNotFoundError<K: Debug> {
    pub key: K,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("key `{key:?}` already exists")]
pub struct KeyAlreadyExistsError<K: Debug> {
    pub key: K,
}

type AddAck<K> = oneshot::Sender<Result<(), KeyAlreadyExistsError<K>>>;

pub(crate) struct ViewState<E: KeyedRecord> {
    map: RwLock<HashMap<E::Key, E>>,
    pending_adds: Mutex<HashMap<SeqNum, AddAck<E::Key>>>,
}

/// Eventually-consistent key-value API layered on one stream.
pub struct KvStore<E: KeyedRecord> {
    stream: Stream<E>,
    state: Arc<ViewState<E>>,
    seen_rx: watch::Receiver<u64>,
}

impl<E: KeyedRecord> KvStore<E> {
    /// Creates the store and starts its materializer. Must be called within
    /// a tokio runtime.
    pub fn new(name: impl Into<String>) -> Self {
        let stream = Stream::new(name);
        let state = Arc::new(ViewState {
            map: RwLock::new(HashMap::new()),
            pending_adds: Mutex::new(HashMap::new()),
        });
        let (seen_tx, seen_rx) = watch::channel(0);
        stream
            .subscribe(Materializer {
                state: state.clone(),
                seen_tx,
            })
            .detach();
        Self {
            stream,
            state,
            seen_rx,
        }
    }

    /// Synchronous lookup against the materialized map.
    pub fn get(&self, key: &E::Key) -> Result<E, KeyNotFoundError<E::Key>> {
        self.state
            .map
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| KeyNotFoundError { key: key.clone() })
    }

    /// Non-blocking lookup; resolves from whatever state the materializer
    /// has reached by the time the future runs.
    pub async fn get_async(&self, key: E::Key) -> Result<E, KeyNotFoundError<E::Key>> {
        self.get(&key)
    }

    /// Callback form of [`get_async`](Self::get_async): exactly one of the
    /// two callbacks runs, exactly once.
    pub fn get_with(
        &self,
        key: E::Key,
        on_found: impl FnOnce(E) + Send + 'static,
        on_missing: impl FnOnce(E::Key) + Send + 'static,
    ) {
        let state = self.state.clone();
        tokio::spawn(async move {
            let found = state.map.read().get(&key).cloned();
            match found {
                Some(entry) => on_found(entry),
                None => on_missing(key),
            }
        });
    }

    /// Appends `entry` to the stream and resolves once the materializer has
    /// applied it. Fails if the key is already present at apply time; the
    /// losing write leaves the map untouched.
    pub async fn add(&self, entry: E) -> Result<(), KeyAlreadyExistsError<E::Key>> {
        self.submit(entry)
            .await
            .expect("materializer dropped a pending add")
    }

    /// Callback form of [`add`](Self::add): exactly one of the two callbacks
    /// runs, exactly once.
    pub fn add_with(
        &self,
        entry: E,
        on_added: impl FnOnce() + Send + 'static,
        on_exists: impl FnOnce(KeyAlreadyExistsError<E::Key>) + Send + 'static,
    ) {
        let ack = self.submit(entry);
        tokio::spawn(async move {
            match ack.await {
                Ok(Ok(())) => on_added(),
                Ok(Err(err)) => on_exists(err),
                // Store dropped before the record was applied; no one left
                // to notify.
                Err(_) => {}
            }
        });
    }

    fn submit(&self, entry: E) -> oneshot::Receiver<Result<(), KeyAlreadyExistsError<E::Key>>> {
        let (ack_tx, ack_rx) = oneshot::channel();
        // Hold the pending table across publish so the materializer cannot
        // apply the record before its ack is registered.
        let mut pending = self.state.pending_adds.lock();
        let seq_num = self.stream.publish(entry);
        pending.insert(seq_num, ack_tx);
        ack_rx
    }

    /// Direct access to the underlying stream, bypassing uniqueness
    /// checking. For tests and bootstrapping; unchecked records are applied
    /// last-seen-wins.
    pub fn unsafe_stream(&self) -> &Stream<E> {
        &self.stream
    }

    /// True iff the materializer has applied every record published so far.
    pub fn caught_up(&self) -> bool {
        *self.seen_rx.borrow() == self.stream.size()
    }

    /// Count of records the materializer has applied.
    pub fn entries_seen(&self) -> u64 {
        *self.seen_rx.borrow()
    }

    /// Waits until everything published before the call has been applied.
    pub async fn wait_caught_up(&self) {
        let target = self.stream.size();
        let mut seen_rx = self.seen_rx.clone();
        seen_rx
            .wait_for(|seen| *seen >= target)
            .await
            .expect("materializer alive while the store exists");
    }

    /// Attaches an external subscriber to the underlying stream.
    pub fn subscribe<S>(&self, subscriber: S) -> Subscription<S>
    where
        S: Subscriber<Record = E>,
    {
        self.stream.subscribe(subscriber)
    }
}
