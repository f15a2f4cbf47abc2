mod common;

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use common::eventually;
use runnel_core::{
    Flow, SeqNum, Subscriber,
    kv::{KeyAlreadyExistsError, KeyNotFoundError, KeyedRecord, KvStore},
};
use tokio::sync::oneshot;

#[derive(Debug, Clone, PartialEq)]
struct Rate {
    key: u32,
    value: f64,
}

impl Rate {
    fn new(key: u32, value: f64) -> Self {
        Self { key, value }
    }
}

impl From<(u32, f64)> for Rate {
    fn from((key, value): (u32, f64)) -> Self {
        Self::new(key, value)
    }
}

impl KeyedRecord for Rate {
    type Key = u32;

    fn key(&self) -> &u32 {
        &self.key
    }

    fn set_key(&mut self, key: u32) {
        self.key = key;
    }
}

/// Aggregates `key=value` pairs the way they came off the stream.
#[derive(Debug, Default)]
struct TapeData {
    seen: AtomicU64,
    results: Mutex<String>,
}

struct Tape {
    data: Arc<TapeData>,
    max_to_process: u64,
}

#[async_trait]
impl Subscriber for Tape {
    type Record = Rate;

    async fn entry(&mut self, record: &Rate, _seq_num: SeqNum, _total: u64) -> Flow {
        {
            let mut results = self.data.results.lock().unwrap();
            if !results.is_empty() {
                results.push(',');
            }
            results.push_str(&format!("{}={:.2}", record.key, record.value));
        }
        let seen = self.data.seen.fetch_add(1, Ordering::SeqCst) + 1;
        if seen < self.max_to_process {
            Flow::Continue
        } else {
            Flow::Stop
        }
    }
}

#[tokio::test]
async fn materialized_view_over_unchecked_and_checked_writes() {
    let api = KvStore::<Rate>::new("rates");

    // The only sanctioned bypass of uniqueness checking.
    api.unsafe_stream().emplace((2, 0.5));
    api.wait_caught_up().await;

    assert_eq!(api.get_async(2).await.unwrap().value, 0.5);
    assert_eq!(api.get(&2).unwrap(), Rate::new(2, 0.5));

    // Callback form: exactly one side runs.
    let (found_tx, found_rx) = oneshot::channel();
    api.get_with(
        2,
        move |entry| found_tx.send(entry).unwrap(),
        move |key| panic!("key {key} reported missing"),
    );
    assert_eq!(found_rx.await.unwrap().value, 0.5);

    api.unsafe_stream().emplace((3, 0.33));
    api.unsafe_stream().emplace((4, 0.25));
    eventually("materializer catch-up", || api.entries_seen() >= 3).await;

    assert_eq!(api.get_async(3).await.unwrap().value, 0.33);
    assert_eq!(api.get(&4).unwrap().value, 0.25);

    assert_eq!(
        api.get_async(5).await.unwrap_err(),
        KeyNotFoundError { key: 5 }
    );
    assert_eq!(api.get(&6).unwrap_err(), KeyNotFoundError { key: 6 });
    let (missing_tx, missing_rx) = oneshot::channel();
    api.get_with(
        7,
        move |entry| panic!("unexpected entry {entry:?}"),
        move |key| missing_tx.send(key).unwrap(),
    );
    assert_eq!(missing_rx.await.unwrap(), 7);

    // Checked writes through the API proper.
    api.add(Rate::new(5, 0.20)).await.unwrap();
    api.add(Rate::new(6, 0.17)).await.unwrap();
    let (added_tx, added_rx) = oneshot::channel();
    api.add_with(
        Rate::new(7, 0.76),
        move || added_tx.send(()).unwrap(),
        move |err| panic!("{err}"),
    );
    added_rx.await.unwrap();

    // Duplicates are rejected when the materializer applies them...
    assert_eq!(
        api.add(Rate::new(5, 1.1)).await.unwrap_err(),
        KeyAlreadyExistsError { key: 5 }
    );
    assert_eq!(
        api.add(Rate::new(6, 0.28)).await.unwrap_err(),
        KeyAlreadyExistsError { key: 6 }
    );
    let (exists_tx, exists_rx) = oneshot::channel();
    api.add_with(
        Rate::new(7, 0.0),
        move || panic!("duplicate add accepted"),
        move |err| exists_tx.send(err).unwrap(),
    );
    assert_eq!(exists_rx.await.unwrap(), KeyAlreadyExistsError { key: 7 });

    // ...and a losing write leaves the map untouched.
    assert_eq!(api.get_async(5).await.unwrap().value, 0.20);
    assert_eq!(api.get(&6).unwrap().value, 0.17);
    assert!(api.get(&8).is_err());
    assert!(api.get(&9).is_err());

    // Every update went through the stream, not just the map: the first six
    // records are exactly the accepted writes in publish order.
    let data = Arc::new(TapeData::default());
    let scope = api.subscribe(Tape {
        data: data.clone(),
        max_to_process: 6,
    });
    eventually("six aggregated records", || {
        data.seen.load(Ordering::SeqCst) == 6
    })
    .await;
    scope.join().await;
    assert_eq!(data.seen.load(Ordering::SeqCst), 6);
    assert_eq!(
        data.results.lock().unwrap().clone(),
        "2=0.50,3=0.33,4=0.25,5=0.20,6=0.17,7=0.76"
    );

    // Entries can be rekeyed before reinsertion.
    let mut relabeled = api.get(&2).unwrap();
    relabeled.set_key(8);
    api.add(relabeled).await.unwrap();
    assert_eq!(api.get(&8).unwrap().value, 0.5);
}

#[tokio::test]
async fn concurrent_adds_of_one_key_admit_exactly_one() {
    let api = Arc::new(KvStore::<Rate>::new("race"));
    let adds: Vec<_> = (0..8)
        .map(|i| {
            let api = api.clone();
            tokio::spawn(async move { api.add(Rate::new(1, i as f64)).await })
        })
        .collect();

    let mut accepted = 0;
    for add in adds {
        if add.await.unwrap().is_ok() {
            accepted += 1;
        }
    }
    assert_eq!(accepted, 1);
    // Every ack resolved, so the materializer has applied all eight.
    assert!(api.caught_up());
    assert_eq!(api.entries_seen(), 8);
}

#[tokio::test]
async fn caught_up_tracks_materializer_progress() {
    let api = KvStore::<Rate>::new("lag");
    assert!(api.caught_up());
    assert_eq!(api.entries_seen(), 0);

    api.unsafe_stream().emplace((1, 1.0));
    api.wait_caught_up().await;
    assert!(api.caught_up());
    assert_eq!(api.entries_seen(), 1);
    assert_eq!(api.get(&1).unwrap().value, 1.0);
}
