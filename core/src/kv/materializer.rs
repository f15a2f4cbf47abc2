use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use super::{KeyAlreadyExistsError, KeyedRecord, ViewState};
use crate::{
    log::SeqNum,
    subscriber::{Flow, Subscriber},
};

/// Internal cursor folding stream records into the materialized map.
///
/// Runs detached for the lifetime of the store and exits when the publisher
/// side goes away.
pub(super) struct Materializer<E: KeyedRecord> {
    pub state: Arc<ViewState<E>>,
    pub seen_tx: watch::Sender<u64>,
}

#[async_trait]
impl<E: KeyedRecord> Subscriber for Materializer<E> {
    type Record = E;

    async fn entry(&mut self, record: &E, seq_num: SeqNum, _total: u64) -> Flow {
        let ack = self.state.pending_adds.lock().remove(&seq_num);
        let key = record.key();
        let applied = {
            let mut map = self.state.map.write();
            if ack.is_some() && map.contains_key(key) {
                Err(KeyAlreadyExistsError { key: key.clone() })
            } else {
                // Unchecked writes take the slot as-is; last seen wins.
                map.insert(key.clone(), record.clone());
                Ok(())
            }
        };
        if applied.is_err() {
            tracing::debug!(?key, seq_num, "add rejected: key already exists");
        }
        // Advance the watermark after the map mutation but before the ack,
        // so a resolved add implies both visibility and progress.
        self.seen_tx.send_replace(seq_num + 1);
        if let Some(ack_tx) = ack {
            let _ = ack_tx.send(applied);
        }
        Flow::Continue
    }
}
